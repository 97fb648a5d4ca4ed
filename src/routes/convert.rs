use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::conversion::{ConversionResponse, ConversionStatus};
use crate::models::job::ConversionJob;
use crate::routes::error::ApiError;
use crate::services::conversion::ConversionError;
use crate::services::storage::UploadedFile;

/// Ids that are not UUIDs cannot name a job, so they are reported as missing.
fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ConversionError::NotFound(Uuid::nil()).into())
}

/// GET /api/
pub async fn api_root() -> Json<Value> {
    Json(json!({
        "message": "TS2JS2dotSH Converter API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/convert: upload a TypeScript project and start its conversion.
///
/// Multipart fields: `project_name` (text) and one or more `files`, each
/// carrying its path relative to the project root as the file name.
pub async fn submit_conversion(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ConversionResponse>, ApiError> {
    let mut project_name: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("project_name") => project_name = Some(field.text().await?.trim().to_string()),
            Some("files") => {
                let path = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("Uploaded file has no file name".into()))?;
                let content = field.bytes().await?.to_vec();
                files.push(UploadedFile { path, content });
            }
            _ => {}
        }
    }

    let project_name = project_name
        .ok_or_else(|| ApiError::BadRequest("Missing project_name field".into()))?;

    let job = state.conversions.submit(project_name, files).await?;

    Ok(Json(ConversionResponse {
        job_id: job.id,
        status: job.status,
        message: "Conversion job started successfully".to_string(),
    }))
}

/// GET /api/status/{job_id}
pub async fn get_conversion_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ConversionStatus>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.conversions.status(job_id).await?))
}

/// GET /api/jobs: all jobs, most recent first.
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<ConversionJob>>, ApiError> {
    Ok(Json(state.conversions.list().await?))
}

/// GET /api/download/{job_id}: the packaged shell script.
pub async fn download_executable(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    let artifact = state.conversions.download(job_id).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.file_name.replace(['"', '\\'], "_")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    ))
}

/// DELETE /api/jobs/{job_id}: remove the job record and its artifact.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job_id = parse_job_id(&job_id)?;
    state.conversions.delete(job_id).await?;
    Ok(Json(json!({ "message": "Job deleted successfully" })))
}
