// Document CRUD plus PDF import and the template catalog. Creation paths
// are metered: check_and_reserve before the insert, record_creation after.

pub mod handlers;
pub mod import;
pub mod templates;

use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::document::DocumentRow;

/// Fetches a document, enforcing ownership. A document belonging to another
/// user is indistinguishable from a missing one.
pub async fn fetch_owned_document(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<DocumentRow, AppError> {
    sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))
}
