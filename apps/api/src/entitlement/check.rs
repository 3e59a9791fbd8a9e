//! Entitlement Check — the single decision point consulted before a new
//! document is created.
//!
//! The check and the increment are deliberately two steps. Creation can fail
//! after an allow decision (the LLM call times out, the insert errors), and
//! incrementing first would charge the user for a document that never
//! existed. The cost of this ordering is a narrow race: two requests racing
//! for the last slot can both pass the check and overshoot the quota by one.
//! That trade-off is intentional (never under-count a failed attempt) and is
//! pinned down by the tests below.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::entitlement::catalog::{DocumentCategory, PlanCatalog, PlanId, Quota};
use crate::entitlement::ledger::{NewUsageEvent, UsageLedger};
use crate::errors::AppError;

/// Allow/deny plus the figures the client renders. Transient; never stored.
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementDecision {
    pub category: DocumentCategory,
    pub allowed: bool,
    pub current: i64,
    pub limit: Quota,
    pub remaining: Quota,
}

impl EntitlementDecision {
    /// The user-facing quota error for a deny decision. `None` when allowed
    /// (an unlimited quota never denies).
    pub fn denial(&self) -> Option<AppError> {
        match (self.allowed, self.limit) {
            (false, Quota::Limited(limit)) => Some(AppError::QuotaExceeded {
                category: self.category,
                current: self.current,
                limit,
            }),
            _ => None,
        }
    }
}

/// Pure allow/deny given a current count and a quota.
pub fn decide(category: DocumentCategory, current: i64, quota: Quota) -> EntitlementDecision {
    EntitlementDecision {
        category,
        allowed: quota.permits(current),
        current,
        limit: quota,
        remaining: quota.remaining(current),
    }
}

/// Resolves the quota, applies any due cycle rollover, and decides. Does not
/// reserve anything: the caller creates the resource first and only then
/// records the creation via [`record_creation`].
pub async fn check_and_reserve(
    catalog: &PlanCatalog,
    ledger: &UsageLedger,
    user_id: Uuid,
    plan: PlanId,
    category: DocumentCategory,
) -> Result<EntitlementDecision, AppError> {
    let quota = catalog.quota_for(plan, category);
    let current = ledger.current_count(user_id, plan, category).await?;
    Ok(decide(category, current, quota))
}

/// Records a successful creation: atomic counter bump, then the audit event.
/// The append is best-effort: quota accounting is authoritative, the audit
/// trail is not. An append failure is logged and never rolls back the
/// increment.
pub async fn record_creation(
    ledger: &UsageLedger,
    user_id: Uuid,
    category: DocumentCategory,
    resource_ref: &str,
    metadata: Value,
) -> Result<i64, AppError> {
    let new_count = ledger.increment(user_id, category).await?;
    if let Err(e) = ledger
        .append_event(NewUsageEvent {
            user_id,
            category,
            resource_ref,
            metadata,
        })
        .await
    {
        tracing::warn!("Audit append failed for user {user_id} ({category}): {e}");
    }
    Ok(new_count)
}

/// Per-category usage figures for the summary endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryUsage {
    pub current: i64,
    pub limit: Quota,
    pub remaining: Quota,
    pub unlimited: bool,
}

impl CategoryUsage {
    fn new(current: i64, quota: Quota) -> Self {
        Self {
            current,
            limit: quota,
            remaining: quota.remaining(current),
            unlimited: quota.is_unlimited(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub user_id: Uuid,
    pub plan: PlanId,
    pub per_category: BTreeMap<&'static str, CategoryUsage>,
    pub resets_at: DateTime<Utc>,
}

/// Full usage picture for a user, rollover applied first.
pub async fn usage_summary(
    catalog: &PlanCatalog,
    ledger: &UsageLedger,
    user_id: Uuid,
    plan: PlanId,
) -> Result<UsageSummary, AppError> {
    let row = ledger.current(user_id, plan).await?;
    let mut per_category = BTreeMap::new();
    for category in DocumentCategory::ALL {
        let quota = catalog.quota_for(plan, category);
        per_category.insert(
            category.as_str(),
            CategoryUsage::new(row.count(category), quota),
        );
    }
    Ok(UsageSummary {
        user_id,
        plan,
        per_category,
        resets_at: row.cycle_resets_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::ledger::UsageStore;
    use crate::entitlement::memory::MemoryUsageStore;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;

    fn fixture() -> (PlanCatalog, Arc<MemoryUsageStore>, UsageLedger) {
        let store = Arc::new(MemoryUsageStore::new());
        let ledger = UsageLedger::new(store.clone());
        (PlanCatalog::builtin(), store, ledger)
    }

    #[test]
    fn test_decide_denies_exactly_at_quota() {
        let d = decide(DocumentCategory::Cv, 3, Quota::Limited(3));
        assert!(!d.allowed);
        assert_eq!(d.remaining, Quota::Limited(0));
        assert!(d.denial().is_some());

        let d = decide(DocumentCategory::Cv, 2, Quota::Limited(3));
        assert!(d.allowed);
        assert_eq!(d.remaining, Quota::Limited(1));
        assert!(d.denial().is_none());
    }

    #[test]
    fn test_decide_unlimited_always_allows() {
        let d = decide(DocumentCategory::Letter, 1_000_000, Quota::Unlimited);
        assert!(d.allowed);
        assert_eq!(d.remaining, Quota::Unlimited);
        assert!(d.denial().is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_is_lazily_created_with_zero_counters() {
        let (catalog, _store, ledger) = fixture();
        let user = Uuid::new_v4();

        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Free, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(d.allowed);
        assert_eq!(d.current, 0);
        assert_eq!(d.limit, Quota::Limited(3));
    }

    #[tokio::test]
    async fn test_starter_scenario_14_of_15() {
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Starter).await.unwrap();
        store.set_count(user, DocumentCategory::Cv, 14).await;

        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Starter, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(d.allowed);
        assert_eq!(d.current, 14);
        assert_eq!(d.limit, Quota::Limited(15));
        assert_eq!(d.remaining, Quota::Limited(1));

        // Caller creates the document, then records it.
        let new_count = record_creation(&ledger, user, DocumentCategory::Cv, "doc-1", json!({}))
            .await
            .unwrap();
        assert_eq!(new_count, 15);

        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Starter, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(!d.allowed);
        assert_eq!(d.current, 15);
        assert_eq!(d.remaining, Quota::Limited(0));
    }

    #[tokio::test]
    async fn test_unlimited_check_never_touches_the_counter() {
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();

        for _ in 0..10 {
            let d = check_and_reserve(&catalog, &ledger, user, PlanId::Pro, DocumentCategory::Cv)
                .await
                .unwrap();
            assert!(d.allowed);
            assert_eq!(d.remaining, Quota::Unlimited);
        }
        assert_eq!(store.row(user).await.unwrap().cv_count, 0);

        // The counter still accumulates on creation, for reporting only.
        record_creation(&ledger, user, DocumentCategory::Cv, "doc-1", json!({}))
            .await
            .unwrap();
        assert_eq!(store.row(user).await.unwrap().cv_count, 1);
        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Pro, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(d.allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_lose_no_updates() {
        let (_catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Pro).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.increment(user, DocumentCategory::Cv).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.row(user).await.unwrap().cv_count, 50);
    }

    #[tokio::test]
    async fn test_last_slot_race_overshoots_by_at_most_one() {
        // Two requests race for the final slot. Both pass the check (each
        // reads 14 before either increments), both create, and the counter
        // lands one over quota. Accepted: the alternative would charge users
        // for creations that failed.
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Starter).await.unwrap();
        store.set_count(user, DocumentCategory::Cv, 14).await;

        let first =
            check_and_reserve(&catalog, &ledger, user, PlanId::Starter, DocumentCategory::Cv)
                .await
                .unwrap();
        let second =
            check_and_reserve(&catalog, &ledger, user, PlanId::Starter, DocumentCategory::Cv)
                .await
                .unwrap();
        assert!(first.allowed && second.allowed);

        record_creation(&ledger, user, DocumentCategory::Cv, "doc-a", json!({}))
            .await
            .unwrap();
        record_creation(&ledger, user, DocumentCategory::Cv, "doc-b", json!({}))
            .await
            .unwrap();
        assert_eq!(store.row(user).await.unwrap().cv_count, 16);

        // From here on the gate holds again.
        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Starter, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(!d.allowed);
        assert_eq!(d.remaining, Quota::Limited(0));
    }

    #[tokio::test]
    async fn test_abandoned_allow_decision_consumes_nothing() {
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();

        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Free, DocumentCategory::Letter)
            .await
            .unwrap();
        assert!(d.allowed);
        // Caller walks away before creating; no increment ever happens.
        assert_eq!(store.row(user).await.unwrap().letter_count, 0);
    }

    #[tokio::test]
    async fn test_overdue_cycle_rolls_over_before_the_decision() {
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Free).await.unwrap();
        store.set_count(user, DocumentCategory::Cv, 3).await;
        store
            .set_cycle_reset(user, Utc::now() - Duration::days(40))
            .await;

        let d = check_and_reserve(&catalog, &ledger, user, PlanId::Free, DocumentCategory::Cv)
            .await
            .unwrap();
        assert!(d.allowed, "fresh cycle must evaluate the zeroed count");
        assert_eq!(d.current, 0);

        let row = store.row(user).await.unwrap();
        assert_eq!(row.cv_count, 0);
        assert!(row.cycle_resets_at > Utc::now());
    }

    #[tokio::test]
    async fn test_rollover_is_idempotent() {
        let (_catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Free).await.unwrap();
        store.set_count(user, DocumentCategory::Letter, 2).await;
        store
            .set_cycle_reset(user, Utc::now() - Duration::days(1))
            .await;

        let first = ledger.current(user, PlanId::Free).await.unwrap();
        assert_eq!(first.letter_count, 0);
        assert!(first.cycle_resets_at > Utc::now());

        // Only one rollover was due; a second read is a no-op.
        let second = ledger.current(user, PlanId::Free).await.unwrap();
        assert_eq!(second.cycle_resets_at, first.cycle_resets_at);
        assert_eq!(second.letter_count, 0);
    }

    #[tokio::test]
    async fn test_stale_rollover_cas_is_rejected() {
        let (_catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        let row = ledger.current(user, PlanId::Free).await.unwrap();

        let stale = row.cycle_resets_at - Duration::days(30);
        let won = store
            .try_rollover(user, stale, Utc::now() + Duration::days(30))
            .await
            .unwrap();
        assert!(!won, "a CAS against a stale observed reset must lose");
    }

    #[tokio::test]
    async fn test_record_creation_appends_an_audit_event() {
        let (_catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Free).await.unwrap();

        record_creation(
            &ledger,
            user,
            DocumentCategory::Cv,
            "doc-42",
            json!({"title": "My CV"}),
        )
        .await
        .unwrap();

        let events = ledger.recent_events(user, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, "cv");
        assert_eq!(events[0].resource_ref, "doc-42");
        assert_eq!(events[0].metadata["title"], "My CV");
    }

    #[tokio::test]
    async fn test_usage_summary_shape() {
        let (catalog, store, ledger) = fixture();
        let user = Uuid::new_v4();
        ledger.current(user, PlanId::Starter).await.unwrap();
        store.set_count(user, DocumentCategory::Cv, 4).await;

        let summary = usage_summary(&catalog, &ledger, user, PlanId::Starter)
            .await
            .unwrap();
        let cv = &summary.per_category["cv"];
        assert_eq!(cv.current, 4);
        assert_eq!(cv.limit, Quota::Limited(15));
        assert_eq!(cv.remaining, Quota::Limited(11));
        assert!(!cv.unlimited);
        assert!(summary.per_category["letter"].current == 0);
        assert!(summary.resets_at > Utc::now());

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["per_category"]["cv"]["limit"], 15);

        let pro = usage_summary(&catalog, &ledger, user, PlanId::Pro)
            .await
            .unwrap();
        let json = serde_json::to_value(&pro).unwrap();
        assert_eq!(json["per_category"]["cv"]["limit"], "unlimited");
        assert_eq!(json["per_category"]["cv"]["remaining"], "unlimited");
    }
}
