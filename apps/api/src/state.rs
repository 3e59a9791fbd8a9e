use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::entitlement::catalog::PlanCatalog;
use crate::entitlement::ledger::UsageLedger;
use crate::llm::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Immutable plan catalog, built once at startup.
    pub catalog: Arc<PlanCatalog>,
    /// Usage ledger over the Postgres-backed store. The only path to the
    /// per-user counters.
    pub ledger: UsageLedger,
}
