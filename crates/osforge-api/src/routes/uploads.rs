//! Multipart input-file uploads.

use std::io::Write;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use osforge_core::FileReference;
use osforge_build::UploadCoordinator;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::builds::fetch;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub uploaded: usize,
}

/// `POST /v1/builds/{name}/uploads`
///
/// Each multipart `file` part is staged to disk, then pushed into the
/// build's upload unit under the part's file name. Returns 503 while the
/// upload unit is not ready; the client retries.
pub async fn upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let build = fetch(&state, &name).await?;

    // Staged files must outlive the pushes below.
    let mut staged: Vec<(String, tempfile::NamedTempFile)> = Vec::new();
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("multipart body unreadable: {e}")))?
    {
        let dest = field
            .file_name()
            .map(str::to_owned)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::Validation("multipart part has no file name".into()))?;
        // Stream the part chunk-by-chunk; the whole file never sits in
        // memory even at the body-limit ceiling.
        let mut temp = tempfile::NamedTempFile::new()
            .map_err(|e| AppError::Internal(format!("staging upload failed: {e}")))?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::Validation(format!("multipart part unreadable: {e}")))?
        {
            temp.write_all(&chunk)
                .map_err(|e| AppError::Internal(format!("staging upload failed: {e}")))?;
        }
        temp.flush()
            .map_err(|e| AppError::Internal(format!("staging upload failed: {e}")))?;
        staged.push((dest, temp));
    }

    if staged.is_empty() {
        return Err(AppError::Validation("no file parts in request".into()));
    }

    let references: Vec<FileReference> = staged
        .iter()
        .map(|(dest, temp)| FileReference::local(dest.clone(), temp.path()))
        .collect();

    let (interval, cap) = state.upload_ready_window;
    let coordinator = UploadCoordinator::new(
        state.cluster.clone(),
        state.channel.clone(),
        state.container.clone(),
        state.storage_root.clone(),
    )
    .with_ready_window(interval, cap);
    coordinator.upload_all(&build, &references).await?;

    Ok(Json(UploadResponse { uploaded: references.len() }))
}
