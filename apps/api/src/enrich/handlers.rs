//! Axum route handlers for LLM enrichment of existing documents.
//!
//! Neither operation is metered — quotas count document creations, and the
//! LLM call happens with no ledger transaction or lock held open (a slow
//! provider call must never serialize other users' requests).

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::documents::fetch_owned_document;
use crate::enrich::prompts::{ANALYSIS_PROMPT, ANALYSIS_SYSTEM, IMPROVE_PROMPT, IMPROVE_SYSTEM};
use crate::entitlement::catalog::{DocumentCategory, Feature};
use crate::entitlement::ledger::NewUsageEvent;
use crate::entitlement::resolve_plan;
use crate::errors::AppError;
use crate::models::document::DocumentRow;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub user_id: Uuid,
    pub instructions: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub document: DocumentRow,
}

/// POST /api/v1/documents/:id/enrich
pub async fn handle_enrich_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EnrichRequest>,
) -> Result<Json<EnrichResponse>, AppError> {
    let document = fetch_owned_document(&state.db, id, req.user_id).await?;
    let category = DocumentCategory::parse(&document.category)?;

    let prompt = IMPROVE_PROMPT
        .replace("{category}", category.as_str())
        .replace(
            "{content}",
            &serde_json::to_string(&document.content).unwrap_or_default(),
        )
        .replace("{instructions}", req.instructions.as_deref().unwrap_or(""));
    let improved: Value = state
        .llm
        .complete_json(IMPROVE_SYSTEM, &prompt)
        .await
        .map_err(|e| AppError::Llm(format!("Enrichment failed: {e}")))?;

    let updated = sqlx::query_as::<_, DocumentRow>(
        r#"
        UPDATE documents
        SET content = $3, updated_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.user_id)
    .bind(&improved)
    .fetch_one(&state.db)
    .await?;

    // Audit trail only; enrichment never moves a counter.
    if let Err(e) = state
        .ledger
        .append_event(NewUsageEvent {
            user_id: req.user_id,
            category,
            resource_ref: &id.to_string(),
            metadata: serde_json::json!({ "action": "enrich" }),
        })
        .await
    {
        tracing::warn!("Audit append failed for enrich of {id}: {e}");
    }

    Ok(Json(EnrichResponse { document: updated }))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    pub user_id: Uuid,
    pub plan: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summary: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub score: u32,
}

/// POST /api/v1/documents/:id/analysis
/// Gated by the `analysis` feature flag.
pub async fn handle_analyze_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnalysisRequest>,
) -> Result<Json<AnalysisReport>, AppError> {
    let plan = resolve_plan(&state.ledger, req.user_id, req.plan.as_deref()).await?;
    if !state.catalog.feature_enabled(plan, Feature::Analysis) {
        return Err(AppError::FeatureNotAvailable("analysis"));
    }

    let document = fetch_owned_document(&state.db, id, req.user_id).await?;
    let category = DocumentCategory::parse(&document.category)?;

    let prompt = ANALYSIS_PROMPT
        .replace("{category}", category.as_str())
        .replace(
            "{content}",
            &serde_json::to_string(&document.content).unwrap_or_default(),
        );
    let report: AnalysisReport = state
        .llm
        .complete_json(ANALYSIS_SYSTEM, &prompt)
        .await
        .map_err(|e| AppError::Llm(format!("Analysis failed: {e}")))?;

    Ok(Json(report))
}
