//! Streamed pipeline logs.

use std::pin::Pin;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

use crate::error::AppError;
use crate::routes::builds::fetch;
use crate::state::AppState;

/// `GET /v1/builds/{name}/logs`
///
/// Streams the logs of every pipeline step in order, each prefixed with
/// a section header. 503 while no step has produced output yet.
pub async fn logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let build = fetch(&state, &name).await?;
    let steps = state.cluster.log_steps(&build).await?;
    if steps.is_empty() {
        return Err(AppError::NotReady(format!(
            "build {name:?} has no step output yet"
        )));
    }

    let mut combined: Pin<Box<dyn AsyncRead + Send>> = Box::pin(tokio::io::empty());
    for step in steps {
        let header = std::io::Cursor::new(format!("==== {} ====\n", step.name).into_bytes());
        combined = Box::pin(combined.chain(header).chain(step.reader));
    }

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(ReaderStream::new(combined)))
        .map_err(|e| AppError::Internal(format!("assembling log response failed: {e}")))
}
