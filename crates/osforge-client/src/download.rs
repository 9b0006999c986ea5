//! Retrying artifact downloader.
//!
//! Artifacts appear on their endpoint some time after the build
//! completes, and the first bytes may flow while the serving side is
//! still settling. The downloader therefore probes for existence first,
//! then retries the streaming GET itself: any transport error,
//! non-success status, or mid-stream failure is retryable until the
//! final attempt. The body streams to a temp file that is renamed into
//! place only after the stream ended cleanly.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// GET attempts before giving up.
const MAX_ATTEMPTS: u32 = 5;

/// Base unit of the linear backoff between attempts.
const BASE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("artifact at {url} did not appear within {attempts} probes")]
    NeverAppeared { url: String, attempts: u32 },

    #[error("download of {url} failed after {attempts} attempts: {last_error}")]
    Exhausted { url: String, attempts: u32, last_error: String },

    #[error("download i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads one URL to one destination path, with bounded retries.
#[derive(Debug, Clone)]
pub struct RetryingDownloader {
    client: reqwest::Client,
    base_delay: Duration,
}

impl RetryingDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, base_delay: BASE_DELAY }
    }

    /// Override the backoff base unit.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Download `url` to `dest`, returning the final byte count.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        self.probe(url).await?;

        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.fetch_once(url, dest).await {
                Ok(size) => {
                    tracing::info!(url, dest = %dest.display(), size, "artifact downloaded");
                    return Ok(size);
                }
                Err(e) => {
                    last_error = e;
                    if attempt < MAX_ATTEMPTS {
                        let delay = backoff_delay(self.base_delay, attempt);
                        tracing::warn!(
                            url,
                            attempt,
                            max_attempts = MAX_ATTEMPTS,
                            "download attempt failed, retrying in {delay:?}: {last_error}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(DownloadError::Exhausted { url: url.into(), attempts: MAX_ATTEMPTS, last_error })
    }

    /// Probe for the artifact's existence with bounded attempts.
    async fn probe(&self, url: &str) -> Result<(), DownloadError> {
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.head(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    tracing::debug!(url, status = %response.status(), attempt, "artifact not served yet");
                }
                Err(e) => {
                    tracing::debug!(url, attempt, "artifact probe failed: {e}");
                }
            }
            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
            }
        }
        Err(DownloadError::NeverAppeared { url: url.into(), attempts: MAX_ATTEMPTS })
    }

    /// One streaming GET into a staging file, renamed into place only
    /// when the stream ended cleanly.
    async fn fetch_once(&self, url: &str, dest: &Path) -> Result<u64, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        let dir = dest.parent().ok_or_else(|| "destination has no parent".to_string())?;
        let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
        let mut file = tokio::fs::File::from_std(
            temp.as_file().try_clone().map_err(|e| e.to_string())?,
        );

        let mut size: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("mid-stream: {e}"))?;
            file.write_all(&chunk).await.map_err(|e| e.to_string())?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| e.to_string())?;

        temp.persist(dest).map_err(|e| e.to_string())?;
        Ok(size)
    }
}

/// Linear backoff: `attempt * base`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * attempt
}
