//! Local-process channel.
//!
//! Runs commands directly on the host, one sandbox directory per unit
//! name. Used by the test suites and by `--local` development mode, where
//! no cluster is available but the exec semantics must hold: same
//! command arrays, same stdin/stdout/stderr contract, same exit-status
//! reporting as the kubectl channel.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::channel::{RemoteChannel, RemoteError, RemoteProcess, StdinMode};
use crate::spawn::spawn_process;

/// Channel executing commands in per-unit directories under a root.
#[derive(Debug, Clone)]
pub struct LocalChannel {
    root: PathBuf,
}

impl LocalChannel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The sandbox directory backing `unit`.
    pub fn sandbox(&self, unit: &str) -> PathBuf {
        self.root.join(unit)
    }
}

#[async_trait]
impl RemoteChannel for LocalChannel {
    async fn open(
        &self,
        unit: &str,
        _container: &str,
        command: &[String],
        stdin: StdinMode,
    ) -> Result<RemoteProcess, RemoteError> {
        let cwd = self.sandbox(unit);
        tokio::fs::create_dir_all(&cwd).await?;

        let (program, args) = command.split_first().ok_or_else(|| RemoteError::Channel {
            reason: "empty command".into(),
        })?;

        tracing::debug!(unit, command = ?command, "opening local channel");

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&cwd);
        spawn_process(cmd, stdin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{run_script, shell_command};
    use tokio::io::AsyncWriteExt;

    fn channel() -> (tempfile::TempDir, LocalChannel) {
        let dir = tempfile::tempdir().unwrap();
        let ch = LocalChannel::new(dir.path());
        (dir, ch)
    }

    #[tokio::test]
    async fn runs_command_and_collects_stdout() {
        let (_dir, ch) = channel();
        let out = run_script(&ch, "u1", "main", "printf hello").await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let (_dir, ch) = channel();
        let err = run_script(&ch, "u1", "main", "echo boom >&2; exit 3")
            .await
            .unwrap_err();
        match err {
            RemoteError::CommandFailed { stderr } => assert!(stderr.contains("boom")),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stdin_streams_to_command() {
        let (_dir, ch) = channel();
        let mut proc = ch
            .open("u1", "main", &shell_command("cat > copy.txt"), StdinMode::Attached)
            .await
            .unwrap();
        let mut stdin = proc.stdin.take().unwrap();
        stdin.write_all(b"payload").await.unwrap();
        stdin.shutdown().await.unwrap();
        drop(stdin);
        let result = proc.wait().await.unwrap();
        assert!(result.success);

        let copied = std::fs::read(ch.sandbox("u1").join("copy.txt")).unwrap();
        assert_eq!(copied, b"payload");
    }

    #[tokio::test]
    async fn units_are_isolated() {
        let (_dir, ch) = channel();
        run_script(&ch, "a", "main", "touch marker").await.unwrap();
        assert!(ch.sandbox("a").join("marker").exists());
        assert!(!ch.sandbox("b").join("marker").exists());
    }

    #[tokio::test]
    async fn empty_command_rejected() {
        let (_dir, ch) = channel();
        let err = ch.open("u1", "main", &[], StdinMode::Closed).await.unwrap_err();
        assert!(matches!(err, RemoteError::Channel { .. }));
    }
}
