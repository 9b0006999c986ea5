//! Compressed artifact download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use osforge_core::BuildPhase;
use osforge_build::ArtifactStreamer;
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::routes::builds::fetch;
use crate::state::AppState;

/// `GET /v1/builds/{name}/artifact`
///
/// 409 unless the build has completed. On success the artifact is
/// compressed inside the unit and streamed straight through; the gateway
/// never buffers it. A disconnecting client tears down the remote
/// compression pipeline.
pub async fn artifact(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let build = fetch(&state, &name).await?;
    if build.phase() != BuildPhase::Completed {
        return Err(AppError::Conflict(format!(
            "build {name:?} is {}, artifact available once Completed",
            build.phase()
        )));
    }

    let streamer = ArtifactStreamer::new(
        state.cluster.clone(),
        state.channel.clone(),
        state.container.clone(),
    );
    let stream = streamer.open_stream(&build).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, stream.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", stream.file_name),
        )
        .body(Body::from_stream(ReaderStream::new(stream.reader)))
        .map_err(|e| AppError::Internal(format!("assembling artifact response failed: {e}")))
}
