pub mod health;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::documents::handlers as documents;
use crate::documents::import;
use crate::documents::templates;
use crate::enrich::handlers as enrich;
use crate::entitlement::handlers as entitlement;
use crate::media;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Usage & billing
        .route("/api/v1/usage", get(entitlement::handle_usage_summary))
        .route("/api/v1/usage/events", get(entitlement::handle_usage_events))
        .route("/api/v1/billing/plan", post(entitlement::handle_assign_plan))
        // Documents
        .route("/api/v1/documents", post(documents::handle_create_document))
        .route("/api/v1/documents", get(documents::handle_list_documents))
        .route("/api/v1/documents/:id", get(documents::handle_get_document))
        .route(
            "/api/v1/documents/:id",
            put(documents::handle_update_document),
        )
        .route(
            "/api/v1/documents/:id",
            delete(documents::handle_delete_document),
        )
        // Enrichment
        .route(
            "/api/v1/documents/:id/enrich",
            post(enrich::handle_enrich_document),
        )
        .route(
            "/api/v1/documents/:id/analysis",
            post(enrich::handle_analyze_document),
        )
        // Import, templates, media
        .route("/api/v1/import", post(import::handle_import_cv))
        .route("/api/v1/templates", get(templates::handle_list_templates))
        .route("/api/v1/media", post(media::handle_upload_media))
        .with_state(state)
}
