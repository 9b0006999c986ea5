//! On-demand artifact streaming.
//!
//! The finished artifact never leaves the artifact unit until a caller
//! asks for it. [`ArtifactStreamer::open_stream`] locates the unit,
//! classifies the artifact path by live inspection (file vs directory),
//! and starts a remote compression pipeline whose stdout becomes the
//! response body. Headers are computable before the first content byte;
//! at most one in-flight chunk is buffered; dropping the reader kills
//! the remote pipeline.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use osforge_core::{ArtifactDescriptor, BuildResource, Compression};
use osforge_remote::channel::{
    run_script, sh_quote, shell_command, BoxedReader, RemoteChannel, RemoteError, StdinMode,
    Waiter,
};
use osforge_remote::cluster::{ClusterClient, ClusterError};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::artifact_selector;

/// Attempts made to locate a ready artifact unit.
const LOCATE_ATTEMPTS: u32 = 5;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("artifact unit {selector:?} not ready after {attempts} attempts")]
    UnitNotReady { selector: String, attempts: u32 },

    #[error("build {build:?} reports no artifact path")]
    NoArtifact { build: String },

    #[error("artifact path {path:?} does not exist in the unit")]
    ArtifactMissing { path: String },

    #[error("unexpected artifact classification output: {output:?}")]
    UnexpectedClassification { output: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// A ready-to-serve compressed artifact stream.
pub struct ArtifactStream {
    /// File name for the download disposition header.
    pub file_name: String,
    pub content_type: &'static str,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Streams finished artifacts out of their unit, compressing on the fly.
pub struct ArtifactStreamer {
    cluster: Arc<dyn ClusterClient>,
    channel: Arc<dyn RemoteChannel>,
    container: String,
}

impl ArtifactStreamer {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        channel: Arc<dyn RemoteChannel>,
        container: impl Into<String>,
    ) -> Self {
        Self { cluster, channel, container: container.into() }
    }

    /// Open a compressed stream of `build`'s artifact.
    pub async fn open_stream(&self, build: &BuildResource) -> Result<ArtifactStream, StreamError> {
        let path = build.status.artifact_path.clone();
        if path.is_empty() {
            return Err(StreamError::NoArtifact { build: build.name.clone() });
        }

        let unit = self.locate_unit(&build.name).await?;
        let is_dir = self.classify(&unit, &path).await?;

        let file_name = if build.status.artifact_file_name.is_empty() {
            ArtifactDescriptor::derive_file_name(
                &build.spec.distro,
                &build.spec.target,
                &build.spec.export_format,
            )
        } else {
            build.status.artifact_file_name.clone()
        };
        let descriptor =
            ArtifactDescriptor { file_name, is_dir, compression: build.spec.compression };

        let script = if is_dir {
            compress_dir_script(&path, descriptor.compression)
        } else {
            compress_file_script(&path, descriptor.compression)
        };
        tracing::info!(build = %build.name, unit, path, is_dir, "opening artifact stream");

        let proc = self
            .channel
            .open(&unit, &self.container, &shell_command(&script), StdinMode::Closed)
            .await?;

        let (stdout, waiter) = proc.into_reader_and_waiter();
        Ok(ArtifactStream {
            file_name: descriptor.download_name(),
            content_type: descriptor.compression.content_type(),
            reader: Box::pin(PipelineReader { stdout, waiter: Some(waiter), drained: false }),
        })
    }

    /// Locate the ready artifact unit with bounded exponential backoff.
    async fn locate_unit(&self, build: &str) -> Result<String, StreamError> {
        let selector = artifact_selector(build);
        for attempt in 1..=LOCATE_ATTEMPTS {
            if let Some(unit) = self.cluster.find_unit(&selector).await? {
                if unit.ready {
                    return Ok(unit.name);
                }
            }
            if attempt < LOCATE_ATTEMPTS {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
        Err(StreamError::UnitNotReady { selector, attempts: LOCATE_ATTEMPTS })
    }

    /// Classify the artifact path by live inspection. Returns whether it
    /// is a directory.
    async fn classify(&self, unit: &str, path: &str) -> Result<bool, StreamError> {
        let out =
            run_script(self.channel.as_ref(), unit, &self.container, &classify_script(path))
                .await?;
        match String::from_utf8_lossy(&out).trim() {
            "dir" => Ok(true),
            "file" => Ok(false),
            "missing" => Err(StreamError::ArtifactMissing { path: path.into() }),
            other => Err(StreamError::UnexpectedClassification { output: other.into() }),
        }
    }
}

/// Delay before the next unit-location attempt: 1 s base, doubling,
/// capped at 8 s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1).min(3))
}

fn classify_script(path: &str) -> String {
    let q = sh_quote(path);
    format!("if [ -d {q} ]; then echo dir; elif [ -e {q} ]; then echo file; else echo missing; fi")
}

fn compress_file_script(path: &str, compression: Compression) -> String {
    format!("{} -c < {}", compression.command(), sh_quote(path))
}

fn compress_dir_script(path: &str, compression: Compression) -> String {
    let p = std::path::Path::new(path);
    let parent = match p.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.display().to_string(),
        _ => ".".to_string(),
    };
    let name = p.file_name().and_then(|n| n.to_str()).unwrap_or(path);
    format!(
        "tar -C {} -cf - {} | {} -c",
        sh_quote(&parent),
        sh_quote(name),
        compression.command()
    )
}

/// Streams the pipeline's stdout, then confirms its exit status.
///
/// A compressor that dies mid-stream closes stdout just like a clean
/// finish would, so EOF alone cannot be trusted: after draining stdout
/// the reader awaits the exit waiter and turns a non-zero exit into an
/// [`std::io::Error`] carrying the captured stderr, which aborts the
/// response body instead of delivering a truncated artifact. The waiter
/// owns the remote child, so dropping the reader still tears the
/// pipeline down.
struct PipelineReader {
    stdout: BoxedReader,
    waiter: Option<Waiter>,
    drained: bool,
}

impl AsyncRead for PipelineReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if !this.drained {
            let before = buf.filled().len();
            match Pin::new(&mut this.stdout).poll_read(cx, buf) {
                Poll::Ready(Ok(())) if buf.filled().len() == before => this.drained = true,
                other => return other,
            }
        }
        let Some(waiter) = this.waiter.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        match waiter.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                this.waiter = None;
                match result {
                    Ok(out) if out.success => Poll::Ready(Ok(())),
                    Ok(out) => Poll::Ready(Err(std::io::Error::other(format!(
                        "artifact pipeline exited non-zero: {}",
                        out.stderr.trim()
                    )))),
                    Err(err) => Poll::Ready(Err(std::io::Error::other(err))),
                }
            }
        }
    }
}
