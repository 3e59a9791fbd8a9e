//! Postgres-backed `UsageStore`.
//!
//! Every counter mutation is a single SQL statement so atomicity holds
//! across concurrent request handlers and across multiple API instances.
//! No application-level read-modify-write touches the counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entitlement::catalog::{DocumentCategory, PlanId};
use crate::entitlement::ledger::{initial_reset, NewUsageEvent, UsageStore};
use crate::errors::AppError;
use crate::models::usage::{UsageEventRow, UserUsageRow};

pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Counter column per category. Categories are a closed enum, so the column
/// name can be interpolated without touching user input.
fn counter_column(category: DocumentCategory) -> &'static str {
    match category {
        DocumentCategory::Cv => "cv_count",
        DocumentCategory::Letter => "letter_count",
    }
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn get_or_create(&self, user_id: Uuid, plan: PlanId) -> Result<UserUsageRow, AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, plan, cv_count, letter_count, cycle_resets_at)
            VALUES ($1, $2, 0, 0, $3)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(initial_reset(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(
            sqlx::query_as::<_, UserUsageRow>("SELECT * FROM usage_records WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn try_rollover(
        &self,
        user_id: Uuid,
        observed_reset: DateTime<Utc>,
        next_reset: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Guarded by the observed reset value: of two racing rollovers
        // exactly one UPDATE matches, so a post-reset increment can never be
        // wiped out by a second reset.
        let result = sqlx::query(
            r#"
            UPDATE usage_records
            SET cv_count = 0, letter_count = 0, cycle_resets_at = $3
            WHERE user_id = $1 AND cycle_resets_at = $2
            "#,
        )
        .bind(user_id)
        .bind(observed_reset)
        .bind(next_reset)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment(
        &self,
        user_id: Uuid,
        category: DocumentCategory,
    ) -> Result<i64, AppError> {
        let column = counter_column(category);
        let sql = format!(
            "UPDATE usage_records SET {column} = {column} + 1 WHERE user_id = $1 RETURNING {column}"
        );
        Ok(sqlx::query_scalar::<_, i64>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_plan(&self, user_id: Uuid, plan: PlanId) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (user_id, plan, cv_count, letter_count, cycle_resets_at)
            VALUES ($1, $2, 0, 0, $3)
            ON CONFLICT (user_id) DO UPDATE SET plan = EXCLUDED.plan
            "#,
        )
        .bind(user_id)
        .bind(plan.as_str())
        .bind(initial_reset(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_event(&self, event: NewUsageEvent<'_>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_events (id, user_id, category, resource_ref, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.user_id)
        .bind(event.category.as_str())
        .bind(event.resource_ref)
        .bind(&event.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_events(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<UsageEventRow>, AppError> {
        Ok(sqlx::query_as::<_, UsageEventRow>(
            "SELECT * FROM usage_events WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}
