#![allow(dead_code)]

//! In-memory `UsageStore` — the reference implementation of the store
//! contract, exercised heavily by the test suite (including the parallel
//! increment tests). Also handy for running the API without Postgres.
//!
//! Atomicity comes from holding the mutex across each whole operation, which
//! mirrors what a single SQL statement gives the Postgres store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::entitlement::catalog::{DocumentCategory, PlanId};
use crate::entitlement::ledger::{initial_reset, NewUsageEvent, UsageStore};
use crate::errors::AppError;
use crate::models::usage::{UsageEventRow, UserUsageRow};

#[derive(Default)]
pub struct MemoryUsageStore {
    records: Mutex<HashMap<Uuid, UserUsageRow>>,
    events: Mutex<Vec<UsageEventRow>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get_or_create(&self, user_id: Uuid, plan: PlanId) -> Result<UserUsageRow, AppError> {
        let mut records = self.records.lock().await;
        let row = records.entry(user_id).or_insert_with(|| UserUsageRow {
            user_id,
            plan: plan.as_str().to_string(),
            cv_count: 0,
            letter_count: 0,
            cycle_resets_at: initial_reset(Utc::now()),
            created_at: Utc::now(),
        });
        Ok(row.clone())
    }

    async fn try_rollover(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut records = self.records.lock().await;
        match records.get_mut(&user_id) {
            Some(row) if row.cycle_resets_at == observed_reset => {
                row.cv_count = 0;
                row.letter_count = 0;
                row.cycle_resets_at = next_reset;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment(
        &self,
        user_id: Uuid,
        category: DocumentCategory,
    ) -> Result<i64, AppError> {
        let mut records = self.records.lock().await;
        let row = records
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("No usage record for user {user_id}")))?;
        let counter = row.count_mut(category);
        *counter += 1;
        Ok(*counter)
    }

    async fn set_plan(&self, user_id: Uuid, plan: PlanId) -> Result<(), AppError> {
        let mut records = self.records.lock().await;
        let row = records.entry(user_id).or_insert_with(|| UserUsageRow {
            user_id,
            plan: plan.as_str().to_string(),
            cv_count: 0,
            letter_count: 0,
            cycle_resets_at: initial_reset(Utc::now()),
            created_at: Utc::now(),
        });
        row.plan = plan.as_str().to_string();
        Ok(())
    }

    async fn append_event(&self, event: NewUsageEvent<'_>) -> Result<(), AppError> {
        let mut events = self.events.lock().await;
        events.push(UsageEventRow {
            id: Uuid::new_v4(),
            user_id: event.user_id,
            category: event.category.as_str().to_string(),
            resource_ref: event.resource_ref.to_string(),
            metadata: event.metadata,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_events(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageEventRow>, AppError> {
        let events = self.events.lock().await;
        let mut matching: Vec<UsageEventRow> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

#[cfg(test)]
impl MemoryUsageStore {
    /// Test hook: force the cycle boundary into the past/future.
    pub async fn set_cycle_reset(&self, user_id: Uuid, resets_at: DateTime<Utc>) {
        let mut records = self.records.lock().await;
        if let Some(row) = records.get_mut(&user_id) {
            row.cycle_resets_at = resets_at;
        }
    }

    /// Test hook: seed a counter to a specific value.
    pub async fn set_count(&self, user_id: Uuid, category: DocumentCategory, count: i64) {
        let mut records = self.records.lock().await;
        if let Some(row) = records.get_mut(&user_id) {
            *row.count_mut(category) = count;
        }
    }

    pub async fn row(&self, user_id: Uuid) -> Option<UserUsageRow> {
        self.records.lock().await.get(&user_id).cloned()
    }

    pub async fn all_events(&self) -> Vec<UsageEventRow> {
        self.events.lock().await.clone()
    }
}
