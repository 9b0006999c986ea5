//! File transfer over a remote channel.
//!
//! Push streams a single-entry archive into a remote untar; pull streams
//! raw bytes out and applies the verify-then-rename discipline: the
//! received byte count must exactly match the size the remote side
//! reported up front, and only then is the staging file renamed into
//! place. A caller can therefore never observe a partially written file
//! under its final name.
//!
//! Each push or pull opens its own channel; sessions are never shared
//! across files, which keeps the blast radius of a failed channel to one
//! file.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::archive::{self, ArchiveError};
use crate::channel::{run_script, sh_quote, shell_command, RemoteChannel, RemoteError, StdinMode};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("destination {0:?} has no file name")]
    InvalidDest(String),

    #[error("could not parse remote size from {output:?}")]
    SizeParse { output: String },

    /// The pulled byte count does not match the size the remote side
    /// reported. The staging file has been discarded.
    #[error("size mismatch pulling {path:?}: remote reported {expected} bytes, received {actual}")]
    SizeMismatch { path: String, expected: u64, actual: u64 },

    #[error("transfer i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pushes and pulls single files through a [`RemoteChannel`].
#[derive(Clone)]
pub struct FileTransfer {
    channel: Arc<dyn RemoteChannel>,
    container: String,
}

impl FileTransfer {
    pub fn new(channel: Arc<dyn RemoteChannel>, container: impl Into<String>) -> Self {
        Self { channel, container: container.into() }
    }

    /// Push `local` to `remote_dest` inside `unit`.
    ///
    /// Creates the destination's parent directory first, then streams the
    /// archive into a remote extraction command. A zero exit means the
    /// bytes were accepted; the pushed content is not re-verified
    /// afterwards (known asymmetry with the pull path, kept to match
    /// observed behavior).
    pub async fn push(
        &self,
        unit: &str,
        local: &Path,
        remote_dest: &str,
    ) -> Result<u64, TransferError> {
        let dest = Path::new(remote_dest);
        let entry_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidDest(remote_dest.into()))?;
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.display().to_string(),
            _ => ".".to_string(),
        };

        tracing::debug!(unit, local = %local.display(), remote_dest, "pushing file");

        run_script(
            self.channel.as_ref(),
            unit,
            &self.container,
            &format!("mkdir -p {}", sh_quote(&parent)),
        )
        .await?;

        let extract = shell_command(&format!("tar -xf - -C {}", sh_quote(&parent)));
        let mut proc = self
            .channel
            .open(unit, &self.container, &extract, StdinMode::Attached)
            .await?;
        let mut stdin = proc.stdin.take().ok_or(RemoteError::Channel {
            reason: "channel opened without stdin".into(),
        })?;

        let encoded = archive::encode_single_file_as(local, entry_name, &mut stdin).await;
        let shutdown = stdin.shutdown().await;
        drop(stdin);

        let result = proc.wait().await?;
        if !result.success {
            return Err(RemoteError::CommandFailed { stderr: result.stderr }.into());
        }
        let size = encoded?;
        shutdown?;

        tracing::info!(unit, remote_dest, size, "file pushed");
        Ok(size)
    }

    /// Report the size of `remote_src` inside `unit`.
    pub async fn remote_size(&self, unit: &str, remote_src: &str) -> Result<u64, TransferError> {
        let out = run_script(
            self.channel.as_ref(),
            unit,
            &self.container,
            &format!("wc -c < {}", sh_quote(remote_src)),
        )
        .await?;
        let text = String::from_utf8_lossy(&out);
        text.trim()
            .parse()
            .map_err(|_| TransferError::SizeParse { output: text.trim().to_string() })
    }

    /// Pull `remote_src` from `unit` into `local_dest`.
    ///
    /// Queries the remote size, streams the raw bytes into a staging file
    /// next to the destination, and renames into place only when the byte
    /// count matches exactly. On mismatch the staging file is discarded
    /// and [`TransferError::SizeMismatch`] is returned.
    pub async fn pull(
        &self,
        unit: &str,
        remote_src: &str,
        local_dest: &Path,
    ) -> Result<u64, TransferError> {
        let expected = self.remote_size(unit, remote_src).await?;

        tracing::debug!(unit, remote_src, expected, "pulling file");

        let temp = tempfile::NamedTempFile::new_in(staging_dir(local_dest))?;

        let read = shell_command(&format!("cat {}", sh_quote(remote_src)));
        let mut proc = self
            .channel
            .open(unit, &self.container, &read, StdinMode::Closed)
            .await?;

        let mut file = tokio::fs::File::from_std(temp.as_file().try_clone()?);
        let actual = tokio::io::copy(&mut proc.stdout, &mut file).await?;
        file.flush().await?;

        let result = proc.wait().await?;
        if !result.success {
            return Err(RemoteError::CommandFailed { stderr: result.stderr }.into());
        }

        if actual != expected {
            // Dropping `temp` removes the staging file.
            return Err(TransferError::SizeMismatch {
                path: remote_src.into(),
                expected,
                actual,
            });
        }

        temp.persist(local_dest).map_err(|e| TransferError::Io(e.error))?;
        tracing::info!(unit, remote_src, dest = %local_dest.display(), size = actual, "file pulled");
        Ok(actual)
    }
}

/// Directory the pull staging file is created in. It must live on the
/// same filesystem as `dest` or the final rename could fail with EXDEV,
/// so a bare file name stages in the current directory, never in the
/// system temp dir.
fn staging_dir(dest: &Path) -> &Path {
    dest.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}
