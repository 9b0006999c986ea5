//! Shared subprocess plumbing for the kubectl and local channels.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::channel::{ExecOutput, RemoteError, RemoteProcess, StdinMode};

/// Spawn `cmd` with piped stdio and adapt it into a [`RemoteProcess`].
///
/// stderr is drained concurrently into a buffer so the child can never
/// block on a full stderr pipe while the caller streams stdout. The child
/// is killed when the handle is dropped.
pub(crate) fn spawn_process(
    mut cmd: Command,
    stdin: StdinMode,
) -> Result<RemoteProcess, RemoteError> {
    cmd.stdin(match stdin {
        StdinMode::Attached => Stdio::piped(),
        StdinMode::Closed => Stdio::null(),
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| RemoteError::Channel {
        reason: format!("failed to spawn {:?}: {e}", cmd.as_std().get_program()),
    })?;

    let child_stdin = child.stdin.take();
    let child_stdout = child.stdout.take().ok_or_else(|| RemoteError::Channel {
        reason: "child stdout not captured".into(),
    })?;
    let mut child_stderr = child.stderr.take().ok_or_else(|| RemoteError::Channel {
        reason: "child stderr not captured".into(),
    })?;

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = child_stderr.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    let waiter = Box::pin(async move {
        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        Ok(ExecOutput { success: status.success(), stderr })
    });

    Ok(RemoteProcess::new(
        child_stdin.map(|s| Box::pin(s) as _),
        Box::pin(child_stdout),
        waiter,
    ))
}
