use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::entitlement::catalog::DocumentCategory;

/// One row per user: the authoritative cycle counters and the cycle boundary.
/// Mutated exclusively through the usage store's atomic operations.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserUsageRow {
    pub user_id: Uuid,
    pub plan: String,
    pub cv_count: i64,
    pub letter_count: i64,
    pub cycle_resets_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserUsageRow {
    pub fn count(&self, category: DocumentCategory) -> i64 {
        match category {
            DocumentCategory::Cv => self.cv_count,
            DocumentCategory::Letter => self.letter_count,
        }
    }

    pub fn count_mut(&mut self, category: DocumentCategory) -> &mut i64 {
        match category {
            DocumentCategory::Cv => &mut self.cv_count,
            DocumentCategory::Letter => &mut self.letter_count,
        }
    }
}

/// Append-only audit record. Written once per successful creation or update
/// of a tracked document; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEventRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub resource_ref: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
