//! Axum route handlers for usage reporting and plan assignment.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::entitlement::catalog::PlanId;
use crate::entitlement::check::{usage_summary, UsageSummary};
use crate::entitlement::resolve_plan;
use crate::errors::AppError;
use crate::models::usage::UsageEventRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UsageQuery {
    pub user_id: Uuid,
    /// Plan claim forwarded by the gateway; stored plan is used if absent.
    pub plan: Option<String>,
}

/// GET /api/v1/usage
pub async fn handle_usage_summary(
    State(state): State<AppState>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<UsageSummary>, AppError> {
    let plan = resolve_plan(&state.ledger, params.user_id, params.plan.as_deref()).await?;
    let summary = usage_summary(&state.catalog, &state.ledger, params.user_id, plan).await?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub user_id: Uuid,
    pub limit: Option<i64>,
}

/// GET /api/v1/usage/events
pub async fn handle_usage_events(
    State(state): State<AppState>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<Vec<UsageEventRow>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let events = state.ledger.recent_events(params.user_id, limit).await?;
    Ok(Json(events))
}

#[derive(Deserialize)]
pub struct PlanAssignment {
    pub user_id: Uuid,
    pub plan: String,
}

/// POST /api/v1/billing/plan
/// Billing-provider callback. Takes effect on the user's next check.
pub async fn handle_assign_plan(
    State(state): State<AppState>,
    Json(req): Json<PlanAssignment>,
) -> Result<StatusCode, AppError> {
    let plan = PlanId::parse_or_default(&req.plan);
    state.ledger.set_plan(req.user_id, plan).await?;
    info!("Plan for user {} set to {plan}", req.user_id);
    Ok(StatusCode::NO_CONTENT)
}
