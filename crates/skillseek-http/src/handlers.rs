//! Request handlers for the HTTP endpoints.

use crate::types::{SkillListResponse, UploadResponse};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use skillseek_runtime::{LoadingSnapshot, ServiceContext, ServiceError, SkillScope};
use std::sync::Arc;
use tracing::warn;

/// `GET /health` - loading-state snapshot.
pub async fn health(State(ctx): State<Arc<ServiceContext>>) -> Json<LoadingSnapshot> {
    Json(ctx.loading().snapshot())
}

/// `GET /skills` - indexed skill inventory plus the loading flag.
pub async fn list_skills(State(ctx): State<Arc<ServiceContext>>) -> Json<SkillListResponse> {
    Json(SkillListResponse {
        skills: ctx.index.list().await,
        loading_in_progress: !ctx.loading().is_complete(),
    })
}

/// `POST /skills/upload` - multipart form with a `file` zip archive and
/// optional `tenant_id` / `scope` fields.
pub async fn upload_skills(
    State(ctx): State<Arc<ServiceContext>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<UploadResponse>) {
    let mut archive: Option<Vec<u8>> = None;
    let mut tenant_id: Option<String> = None;
    let mut scope: Option<SkillScope> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        };
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => match field.bytes().await {
                Ok(bytes) => archive = Some(bytes.to_vec()),
                Err(e) => return bad_request(format!("could not read file field: {e}")),
            },
            Some("tenant_id") => match field.text().await {
                Ok(text) if !text.is_empty() => tenant_id = Some(text),
                Ok(_) => {}
                Err(e) => return bad_request(format!("could not read tenant_id field: {e}")),
            },
            Some("scope") => match field.text().await {
                Ok(text) => match text.as_str() {
                    "global" => scope = Some(SkillScope::Global),
                    "tenant" => scope = Some(SkillScope::Tenant),
                    other => return bad_request(format!("unknown scope '{other}'")),
                },
                Err(e) => return bad_request(format!("could not read scope field: {e}")),
            },
            _ => {}
        }
    }

    let Some(archive) = archive else {
        return bad_request("missing 'file' field".to_string());
    };

    match ctx.coordinator.upload_archive(archive, tenant_id, scope).await {
        Ok(names) => (StatusCode::OK, Json(UploadResponse::ok(names))),
        Err(e @ ServiceError::UploadRejected(_)) | Err(e @ ServiceError::ManifestMalformed { .. }) => {
            warn!(error = %e, "upload rejected");
            (StatusCode::BAD_REQUEST, Json(UploadResponse::error(e.to_string())))
        }
        Err(e) => {
            warn!(error = %e, "upload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(UploadResponse::error(e.to_string())))
        }
    }
}

fn bad_request(message: String) -> (StatusCode, Json<UploadResponse>) {
    (StatusCode::BAD_REQUEST, Json(UploadResponse::error(message)))
}
