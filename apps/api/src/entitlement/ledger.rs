//! Usage Ledger — the durable store of per-user cycle counters and the
//! cycle boundary, plus the append-only audit trail.
//!
//! The store trait has two implementations: `PgUsageStore` (production) and
//! `MemoryUsageStore` (test suite). Both must uphold the same contract:
//! `increment` is a single atomic read-modify-write, and `try_rollover` is a
//! compare-and-swap guarded by the previously observed reset timestamp.
//!
//! Cycle rollover policy: the new reset timestamp advances in whole-month
//! steps from the *prior scheduled reset*, repeated until strictly in the
//! future. A user who signs up on the 15th resets on the 15th forever, no
//! matter how late the lazy rollover fires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::entitlement::catalog::{DocumentCategory, PlanId};
use crate::errors::AppError;
use crate::models::usage::{UsageEventRow, UserUsageRow};

/// How many times a lost rollover CAS is retried before the request is
/// surfaced as a transient storage failure.
const MAX_ROLLOVER_ATTEMPTS: u32 = 3;

/// An audit record about to be appended.
pub struct NewUsageEvent<'a> {
    pub user_id: Uuid,
    pub category: DocumentCategory,
    pub resource_ref: &'a str,
    pub metadata: Value,
}

/// Storage contract for usage accounting. Counters may only be mutated
/// through these operations.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Fetches the user's usage row, creating it with zero counters and a
    /// reset one calendar month out if absent. The ledger is
    /// self-bootstrapping; there is no explicit registration step.
    async fn get_or_create(&self, user_id: Uuid, plan: PlanId) -> Result<UserUsageRow, AppError>;

    /// Compare-and-swap cycle reset: zeroes every counter and advances the
    /// reset timestamp, guarded by the reset value the caller observed.
    /// Returns `false` if another writer rolled the cycle over first.
    async fn try_rollover(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Atomically adds one to the category counter and returns the new
    /// value. Concurrent calls for the same user must never lose an update.
    async fn increment(&self, user_id: Uuid, category: DocumentCategory)
        -> Result<i64, AppError>;

    /// Assigns the stored plan (billing-provider callback). Upserts, since
    /// the callback can arrive before the user's first request.
    async fn set_plan(&self, user_id: Uuid, plan: PlanId) -> Result<(), AppError>;

    /// Appends an immutable audit record.
    async fn append_event(&self, event: NewUsageEvent<'_>) -> Result<(), AppError>;

    /// Most recent audit records for a user, newest first.
    async fn recent_events(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageEventRow>, AppError>;
}

/// The ledger proper: store access plus the lazy rollover that every read
/// goes through.
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Returns the user's usage row with the cycle guaranteed current,
    /// lazily creating the row and applying any overdue rollover first.
    pub async fn current(&self, user_id: Uuid, plan: PlanId) -> Result<UserUsageRow, AppError> {
        let mut row = self.store.get_or_create(user_id, plan).await?;

        for _ in 0..MAX_ROLLOVER_ATTEMPTS {
            let now = Utc::now();
            if row.cycle_resets_at > now {
                return Ok(row);
            }
            let next = next_reset_after(row.cycle_resets_at, now);
            if self
                .store
                .try_rollover(user_id, row.cycle_resets_at, next)
                .await?
            {
                tracing::info!(
                    "Cycle rollover for user {user_id}: counters zeroed, next reset {next}"
                );
                // Re-read rather than synthesizing the row: a concurrent
                // increment may already have landed on the fresh cycle.
                return self.store.get_or_create(user_id, plan).await;
            }
            // Lost the CAS; someone else reset the cycle. Re-read and
            // re-check, the row is normally current now.
            row = self.store.get_or_create(user_id, plan).await?;
        }

        Err(AppError::StorageContention(format!(
            "cycle rollover for user {user_id} lost its conditional update {MAX_ROLLOVER_ATTEMPTS} times"
        )))
    }

    /// Current cycle count for one category, rollover applied first.
    pub async fn current_count(
        &self,
        user_id: Uuid,
        plan: PlanId,
        category: DocumentCategory,
    ) -> Result<i64, AppError> {
        Ok(self.current(user_id, plan).await?.count(category))
    }

    /// Atomic counter bump. Called only after the gated resource was
    /// actually created — failed creations are never metered.
    pub async fn increment(
        &self,
        user_id: Uuid,
        category: DocumentCategory,
    ) -> Result<i64, AppError> {
        self.store.increment(user_id, category).await
    }

    pub async fn set_plan(&self, user_id: Uuid, plan: PlanId) -> Result<(), AppError> {
        self.store.set_plan(user_id, plan).await
    }

    pub async fn append_event(&self, event: NewUsageEvent<'_>) -> Result<(), AppError> {
        self.store.append_event(event).await
    }

    pub async fn recent_events(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageEventRow>, AppError> {
        self.store.recent_events(user_id, limit).await
    }
}

/// Reset timestamp for a freshly created usage row.
pub fn initial_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    add_one_month(now)
}

/// Next reset strictly after `now`, stepping whole months from the prior
/// scheduled reset. Stepping from the prior schedule (not from `now`) keeps
/// the cycle day stable for users inactive across several boundaries.
pub fn next_reset_after(prior: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut next = add_one_month(prior);
    while next <= now {
        next = add_one_month(next);
    }
    next
}

fn add_one_month(t: DateTime<Utc>) -> DateTime<Utc> {
    // checked_add_months only fails at the very edge of chrono's range
    t.checked_add_months(Months::new(1))
        .unwrap_or(t + Duration::days(31))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_next_reset_one_step_when_barely_overdue() {
        let prior = utc(2024, 3, 15, 9);
        let now = utc(2024, 3, 20, 0);
        assert_eq!(next_reset_after(prior, now), utc(2024, 4, 15, 9));
    }

    #[test]
    fn test_next_reset_at_exact_boundary_is_strictly_future() {
        let prior = utc(2024, 3, 15, 9);
        let next = next_reset_after(prior, prior);
        assert!(next > prior);
        assert_eq!(next, utc(2024, 4, 15, 9));
    }

    #[test]
    fn test_next_reset_40_days_late_takes_two_steps() {
        let prior = utc(2024, 3, 1, 12);
        let now = prior + Duration::days(40); // April 10th
        assert_eq!(next_reset_after(prior, now), utc(2024, 5, 1, 12));
    }

    #[test]
    fn test_next_reset_keeps_cycle_day_across_many_missed_cycles() {
        let prior = utc(2024, 1, 15, 6);
        let now = utc(2024, 4, 20, 0);
        // Anchored stepping: Feb 15, Mar 15, Apr 15 are all past — May 15 it is.
        assert_eq!(next_reset_after(prior, now), utc(2024, 5, 15, 6));
    }

    #[test]
    fn test_month_end_clamps_instead_of_overflowing() {
        let prior = utc(2024, 1, 31, 0);
        let now = utc(2024, 2, 1, 0);
        // 2024 is a leap year: Jan 31 + 1 month clamps to Feb 29.
        assert_eq!(next_reset_after(prior, now), utc(2024, 2, 29, 0));
    }

    #[test]
    fn test_initial_reset_is_one_month_out() {
        let now = utc(2024, 6, 10, 18);
        assert_eq!(initial_reset(now), utc(2024, 7, 10, 18));
    }
}
