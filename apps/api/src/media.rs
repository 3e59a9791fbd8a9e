//! Media uploads — thin glue over S3/MinIO. Stores profile photos and other
//! images and hands the URL back; nothing here touches usage accounting.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct MediaUploadResponse {
    pub url: String,
    pub key: String,
}

/// POST /api/v1/media
pub async fn handle_upload_media(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaUploadResponse>), AppError> {
    let mut user_id: Option<Uuid> = None;
    let mut file: Option<(Bytes, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("user_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable user_id field: {e}")))?;
                user_id = Some(
                    raw.parse::<Uuid>()
                        .map_err(|_| AppError::Validation("user_id must be a UUID".to_string()))?,
                );
            }
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Unreadable file field: {e}")))?;
                file = Some((data, content_type));
            }
            _ => {}
        }
    }

    let user_id =
        user_id.ok_or_else(|| AppError::Validation("Missing 'user_id' field".to_string()))?;
    let (data, content_type) =
        file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation(format!(
            "Upload exceeds the {MAX_UPLOAD_BYTES} byte limit"
        )));
    }

    let key = format!("media/{user_id}/{}", Uuid::new_v4());
    state
        .s3
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(&key)
        .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
        .content_type(&content_type)
        .send()
        .await
        .map_err(|e| AppError::S3(format!("Upload failed: {e}")))?;

    info!("Stored media object s3://{}/{key}", state.config.s3_bucket);

    let url = format!(
        "{}/{}/{key}",
        state.config.s3_endpoint.trim_end_matches('/'),
        state.config.s3_bucket
    );
    Ok((StatusCode::CREATED, Json(MediaUploadResponse { url, key })))
}
