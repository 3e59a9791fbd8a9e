//! Axum route handlers for the Documents API.
//!
//! Creation follows the only-meter-success ordering: entitlement check,
//! insert, then counter increment plus audit append. A failed insert leaves
//! the counter untouched.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::documents::fetch_owned_document;
use crate::entitlement::catalog::DocumentCategory;
use crate::entitlement::check::{check_and_reserve, record_creation};
use crate::entitlement::ledger::NewUsageEvent;
use crate::entitlement::resolve_plan;
use crate::errors::AppError;
use crate::models::document::DocumentRow;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub user_id: Uuid,
    pub plan: Option<String>,
    pub category: String,
    pub title: String,
    pub content: Value,
}

#[derive(Debug, Serialize)]
pub struct CreateDocumentResponse {
    pub document: DocumentRow,
    /// Creations of this category so far in the current cycle.
    pub cycle_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Uuid,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub content: Value,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/documents
pub async fn handle_create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreateDocumentResponse>), AppError> {
    let category = DocumentCategory::parse(&req.category)?;
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("Title must not be empty".to_string()));
    }
    let plan = resolve_plan(&state.ledger, req.user_id, req.plan.as_deref()).await?;

    let decision =
        check_and_reserve(&state.catalog, &state.ledger, req.user_id, plan, category).await?;
    if let Some(denied) = decision.denial() {
        return Err(denied);
    }

    let document = insert_document(&state, req.user_id, category, &req.title, &req.content).await?;

    // Only meter success: the counter moves after the row exists.
    let cycle_count = record_creation(
        &state.ledger,
        req.user_id,
        category,
        &document.id.to_string(),
        json!({ "action": "create", "title": document.title }),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateDocumentResponse {
            document,
            cycle_count,
        }),
    ))
}

/// GET /api/v1/documents
pub async fn handle_list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<DocumentRow>>, AppError> {
    let documents = match &params.category {
        Some(raw) => {
            let category = DocumentCategory::parse(raw)?;
            sqlx::query_as::<_, DocumentRow>(
                "SELECT * FROM documents WHERE user_id = $1 AND category = $2 ORDER BY updated_at DESC",
            )
            .bind(params.user_id)
            .bind(category.as_str())
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, DocumentRow>(
                "SELECT * FROM documents WHERE user_id = $1 ORDER BY updated_at DESC",
            )
            .bind(params.user_id)
            .fetch_all(&state.db)
            .await?
        }
    };
    Ok(Json(documents))
}

/// GET /api/v1/documents/:id
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<DocumentRow>, AppError> {
    let document = fetch_owned_document(&state.db, id, params.user_id).await?;
    Ok(Json(document))
}

/// PUT /api/v1/documents/:id
/// Replaces the content. Appends an audit event; not metered.
pub async fn handle_update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentRow>, AppError> {
    let existing = fetch_owned_document(&state.db, id, req.user_id).await?;
    let category = DocumentCategory::parse(&existing.category)?;
    let title = req.title.as_deref().unwrap_or(&existing.title);

    let updated = sqlx::query_as::<_, DocumentRow>(
        r#"
        UPDATE documents
        SET title = $3, content = $4, updated_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.user_id)
    .bind(title)
    .bind(&req.content)
    .fetch_one(&state.db)
    .await?;

    if let Err(e) = state
        .ledger
        .append_event(NewUsageEvent {
            user_id: req.user_id,
            category,
            resource_ref: &id.to_string(),
            metadata: json!({ "action": "update" }),
        })
        .await
    {
        tracing::warn!("Audit append failed for update of {id}: {e}");
    }

    Ok(Json(updated))
}

/// DELETE /api/v1/documents/:id
/// Not metered: quotas count creations per cycle, not live documents.
pub async fn handle_delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<OwnerQuery>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(params.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Document {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn insert_document(
    state: &AppState,
    user_id: Uuid,
    category: DocumentCategory,
    title: &str,
    content: &Value,
) -> Result<DocumentRow, AppError> {
    Ok(sqlx::query_as::<_, DocumentRow>(
        r#"
        INSERT INTO documents (id, user_id, category, title, content)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(category.as_str())
    .bind(title)
    .bind(content)
    .fetch_one(&state.db)
    .await?)
}
