//! Remote command channels.
//!
//! A channel opens a bidirectional byte stream to a named container in a
//! named compute unit by running a command there. The command runs to
//! completion; the channel closes when it exits. Connection and auth
//! failures surface immediately as [`RemoteError::Channel`]; a non-zero
//! remote exit is reported through the captured stderr text — there is no
//! per-program error type, callers inspect stderr for diagnostics.

use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Errors from opening or running a remote command.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The channel itself could not be opened (spawn, connection, auth).
    #[error("remote channel failed: {reason}")]
    Channel { reason: String },

    /// The remote command exited non-zero. `stderr` carries whatever the
    /// remote side printed; it is attached verbatim for diagnostics.
    #[error("remote command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("remote i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Final result of a remote command.
#[derive(Debug)]
pub struct ExecOutput {
    pub success: bool,
    /// Captured stderr text, complete once the command has exited.
    pub stderr: String,
}

pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
/// Future resolving to the command's exit status once it terminates.
/// Owns the underlying child, so dropping it tears the command down.
pub type Waiter =
    Pin<Box<dyn std::future::Future<Output = Result<ExecOutput, RemoteError>> + Send>>;

/// A running remote command.
///
/// `stdout` must be drained before [`RemoteProcess::wait`] is called for
/// commands that produce unbounded output, or the remote side may block
/// on a full pipe. Dropping the handle terminates the remote command, so
/// a cancelled caller never leaks a compression or tar process.
pub struct RemoteProcess {
    /// Present only when the channel was opened with stdin attached.
    pub stdin: Option<BoxedWriter>,
    pub stdout: BoxedReader,
    waiter: Waiter,
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("stdin", &self.stdin.is_some())
            .finish_non_exhaustive()
    }
}

impl RemoteProcess {
    pub fn new(stdin: Option<BoxedWriter>, stdout: BoxedReader, waiter: Waiter) -> Self {
        Self { stdin, stdout, waiter }
    }

    /// Wait for the command to exit, returning its final status and
    /// captured stderr. Consumes the handle.
    pub async fn wait(self) -> Result<ExecOutput, RemoteError> {
        drop(self.stdin);
        drop(self.stdout);
        self.waiter.await
    }

    /// Split into the stdout reader and the exit waiter, closing stdin.
    /// For callers that stream stdout incrementally and still need the
    /// exit status afterwards.
    pub fn into_reader_and_waiter(self) -> (BoxedReader, Waiter) {
        drop(self.stdin);
        (self.stdout, self.waiter)
    }

    /// Drain stdout to completion, then wait. Fails with
    /// [`RemoteError::CommandFailed`] on a non-zero exit.
    pub async fn collect(mut self) -> Result<Vec<u8>, RemoteError> {
        let mut out = Vec::new();
        self.stdout.read_to_end(&mut out).await?;
        let result = self.wait().await?;
        if !result.success {
            return Err(RemoteError::CommandFailed { stderr: result.stderr });
        }
        Ok(out)
    }
}

/// Whether the opened command gets a writable stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdinMode {
    Attached,
    Closed,
}

/// A transport that runs commands inside a compute unit's container.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Open a channel running `command` in `container` of `unit`.
    async fn open(
        &self,
        unit: &str,
        container: &str,
        command: &[String],
        stdin: StdinMode,
    ) -> Result<RemoteProcess, RemoteError>;
}

/// Run a shell script in the unit and collect its stdout.
///
/// Convenience for the short commands the transfer and streaming layers
/// issue (`mkdir -p`, `wc -c`, `test -d`).
pub async fn run_script(
    channel: &dyn RemoteChannel,
    unit: &str,
    container: &str,
    script: &str,
) -> Result<Vec<u8>, RemoteError> {
    let command = shell_command(script);
    let proc = channel
        .open(unit, container, &command, StdinMode::Closed)
        .await?;
    proc.collect().await
}

/// Wrap a script for `sh -c` execution.
pub fn shell_command(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

/// Quote a path for safe interpolation into a shell script.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
