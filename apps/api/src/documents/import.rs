//! PDF import — extracts text from an uploaded CV and turns it into a
//! structured document through the LLM, then creates it through the same
//! metered path as a hand-built document.

use std::io::Write;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::documents::handlers::{insert_document, CreateDocumentResponse};
use crate::entitlement::catalog::{DocumentCategory, Feature};
use crate::entitlement::check::{check_and_reserve, record_creation};
use crate::entitlement::resolve_plan;
use crate::errors::AppError;
use crate::state::AppState;

const IMPORT_SYSTEM: &str = "\
You are a precise CV data extractor. \
Convert raw CV text into structured JSON with keys: summary, experience, \
education, skills, projects. Keep every fact; never invent content. \
You MUST respond with valid JSON only — no markdown fences, no explanations.";

const IMPORT_PROMPT: &str = r#"Convert the following extracted CV text into a structured JSON object
with the keys "summary", "experience", "education", "skills", and "projects".

CV TEXT:
{cv_text}

Return ONLY the JSON object — nothing else, no code fences."#;

struct ImportUpload {
    user_id: Uuid,
    plan: Option<String>,
    title: String,
    file: Bytes,
}

/// POST /api/v1/import
/// Gated by the `import` feature flag and metered as a CV creation.
pub async fn handle_import_cv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreateDocumentResponse>), AppError> {
    let upload = read_upload(multipart).await?;
    let category = DocumentCategory::Cv;

    let plan = resolve_plan(&state.ledger, upload.user_id, upload.plan.as_deref()).await?;
    if !state.catalog.feature_enabled(plan, Feature::Import) {
        return Err(AppError::FeatureNotAvailable("import"));
    }

    let decision =
        check_and_reserve(&state.catalog, &state.ledger, upload.user_id, plan, category).await?;
    if let Some(denied) = decision.denial() {
        return Err(denied);
    }

    let text = extract_pdf_text(&upload.file)?;
    if text.is_empty() {
        return Err(AppError::Validation(
            "The uploaded PDF contains no extractable text".to_string(),
        ));
    }

    let content: Value = state
        .llm
        .complete_json(IMPORT_SYSTEM, &IMPORT_PROMPT.replace("{cv_text}", &text))
        .await
        .map_err(|e| AppError::Llm(format!("CV import failed: {e}")))?;

    let document =
        insert_document(&state, upload.user_id, category, &upload.title, &content).await?;
    let cycle_count = record_creation(
        &state.ledger,
        upload.user_id,
        category,
        &document.id.to_string(),
        json!({ "action": "import", "source": "pdf" }),
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

async fn read_upload(mut multipart: Multipart) -> Result<ImportUpload, AppError> {
    let mut user_id = None;
    let mut plan = None;
    let mut title = None;
    let mut file = None;

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
            Some("plan") => {
                plan = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Unreadable plan field: {e}"))
                })?);
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Unreadable title field: {e}"))
                })?);
            }
            Some("file") => {
                file = Some(field.bytes().await.map_err(|e| {
                    AppError::Validation(format!("Unreadable file field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    Ok(ImportUpload {
        user_id: user_id
            .ok_or_else(|| AppError::Validation("Missing 'user_id' field".to_string()))?,
        plan,
        title: title.unwrap_or_else(|| "Imported CV".to_string()),
        file: file.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?,
    })
}

/// Writes the upload to a temp file and runs text extraction on it.
fn extract_pdf_text(data: &[u8]) -> Result<String, AppError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Could not create temp file: {e}")))?;
    tmp.write_all(data)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Could not write temp file: {e}")))?;

    let raw = pdf_extract::extract_text(tmp.path())
        .map_err(|e| AppError::Validation(format!("Could not read PDF: {e}")))?;
    Ok(normalize_extracted_text(&raw))
}

/// Collapses the ragged whitespace pdf extraction produces: trims each line,
/// drops blank runs down to a single separator.
fn normalize_extracted_text(raw: &str) -> String {
    let mut lines = Vec::new();
    let mut last_blank = true;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !last_blank {
                lines.push("");
            }
            last_blank = true;
        } else {
            lines.push(line);
            last_blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_blank_runs() {
        let raw = "Jane Doe\n\n\n\nSoftware Engineer\n\n  Rust, Go  \n";
        assert_eq!(
            normalize_extracted_text(raw),
            "Jane Doe\n\nSoftware Engineer\n\nRust, Go"
        );
    }

    #[test]
    fn test_normalize_trims_leading_and_trailing_blanks() {
        let raw = "\n\n  Profile  \n\n";
        assert_eq!(normalize_extracted_text(raw), "Profile");
    }

    #[test]
    fn test_normalize_empty_input() {
        assert_eq!(normalize_extracted_text(""), "");
        assert_eq!(normalize_extracted_text("\n \n"), "");
    }
}
