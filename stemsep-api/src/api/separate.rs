//! Separation API handler
//!
//! POST /separate

use axum::{
    extract::{multipart::Field, Multipart, Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult, JobError},
    AppState,
};

/// POST /separate query string
#[derive(Debug, Default, Deserialize)]
pub struct SeparateQuery {
    pub model: Option<String>,
}

/// POST /separate response
#[derive(Debug, Serialize, Deserialize)]
pub struct SeparateResponse {
    pub success: bool,
    pub session_id: Uuid,
    /// Stem name → retrieval URL
    pub stems: BTreeMap<String, String>,
}

/// POST /separate
///
/// Multipart body with a `file` field and an optional `model` field (the
/// `model` query parameter is also accepted; the form field wins). The file
/// is spooled to disk chunk by chunk since `model` may follow it. Blocks
/// until the job has fully succeeded or failed.
pub async fn separate(
    State(state): State<AppState>,
    Query(query): Query<SeparateQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<SeparateResponse>> {
    let mut upload = None;
    let mut model = query.model.filter(|m| !m.trim().is_empty());

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("'file' field has no filename".to_string()))?;
                let spool = state.service.sessions().spool();
                let bytes = spool_field(field, spool.path()).await?;
                // A repeated field replaces the earlier one, whose spool is dropped here
                upload = Some((filename, spool, bytes));
            }
            Some("model") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    model = Some(text.trim().to_string());
                }
            }
            other => {
                tracing::debug!(field = ?other, "Ignoring unknown multipart field");
            }
        }
    }

    let (filename, spool, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;
    let model = model.unwrap_or_else(|| state.default_model.clone());

    tracing::info!(
        filename = %filename,
        model = %model,
        bytes = bytes,
        "Separation requested"
    );

    let body = tokio::fs::File::open(spool.path())
        .await
        .map_err(|source| JobError::UploadWrite {
            path: spool.path().to_path_buf(),
            source,
        })?;

    let job = match state.service.run(body, &filename, &model).await {
        Ok(job) => job,
        Err(e) => {
            *state.last_error.write().await = Some(e.to_string());
            return Err(e.into());
        }
    };

    let stems = job
        .stems
        .into_iter()
        .map(|stem| (stem.name, stem.url))
        .collect();

    Ok(Json(SeparateResponse {
        success: true,
        session_id: job.session_id,
        stems,
    }))
}

/// Copy one multipart field to `path`, returning its length
async fn spool_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let write_error = |source| JobError::UploadWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(write_error)?;
    let mut bytes = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await.map_err(write_error)?;
        bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(write_error)?;
    Ok(bytes)
}

/// Build separation routes
pub fn separate_routes() -> Router<AppState> {
    Router::new().route("/separate", post(separate))
}
