use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::entitlement::catalog::DocumentCategory;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Normal product behavior, not a server fault: the cycle count reached
    /// the plan's limit. Carries the figures the client renders next to the
    /// upgrade call-to-action.
    #[error("Quota exceeded for {category}: {current}/{limit} this cycle")]
    QuotaExceeded {
        category: DocumentCategory,
        current: i64,
        limit: i64,
    },

    #[error("Plan does not include the '{0}' feature")]
    FeatureNotAvailable(&'static str),

    /// Caller bug: a category outside the closed enumeration. Fails loudly
    /// rather than defaulting.
    #[error("Unsupported document category: {0}")]
    UnsupportedCategory(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A conditional update (cycle rollover) kept losing its race after
    /// bounded retries. Transient, safe for the client to retry.
    #[error("Storage contention: {0}")]
    StorageContention(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::QuotaExceeded {
                category,
                current,
                limit,
            } => (
                StatusCode::FORBIDDEN,
                "QUOTA_EXCEEDED",
                format!(
                    "You have used {current} of {limit} {category} documents this cycle. \
                     Upgrade your plan to keep creating."
                ),
                Some(json!({
                    "category": category,
                    "current": current,
                    "limit": limit,
                    "upgrade_url": "/pricing"
                })),
            ),
            AppError::FeatureNotAvailable(feature) => (
                StatusCode::FORBIDDEN,
                "FEATURE_NOT_AVAILABLE",
                format!("The '{feature}' feature is not included in your plan."),
                Some(json!({ "feature": feature, "upgrade_url": "/pricing" })),
            ),
            AppError::UnsupportedCategory(category) => (
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_CATEGORY",
                format!("'{category}' is not a known document category"),
                None,
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "A transient storage error occurred; please retry".to_string(),
                    None,
                )
            }
            AppError::StorageContention(msg) => {
                tracing::error!("Storage contention: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORAGE_UNAVAILABLE",
                    "A transient storage error occurred; please retry".to_string(),
                    None,
                )
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                    None,
                )
            }
            AppError::S3(msg) => {
                tracing::error!("S3 error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "S3_ERROR",
                    "A storage error occurred".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
