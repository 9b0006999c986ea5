//! Input-file upload coordination.
//!
//! Pushes every declared input file into the build's upload unit, then
//! sets the uploads-complete marker on the resource status. That marker
//! is the only signal the controller gates the build step on, so it is
//! patched strictly after the last file has been accepted.
//!
//! All references are validated before the first remote call; a request
//! containing one bad reference never touches the unit at all. Files are
//! pushed sequentially, one channel per file.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use osforge_core::{BuildResource, FileReference, FileSource, ValidationError};
use osforge_remote::channel::{run_script, sh_quote, RemoteChannel, RemoteError};
use osforge_remote::cluster::{ClusterClient, ClusterError, StatusPatch};
use osforge_remote::transfer::{FileTransfer, TransferError};
use thiserror::Error;

use crate::upload_selector;

/// Default interval between upload-unit readiness polls.
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default total time allowed for the upload unit to become ready.
pub const READY_POLL_CAP: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload unit {selector:?} not ready after {waited:?}")]
    UnitNotReady { selector: String, waited: Duration },

    #[error("invalid file reference {dest:?}")]
    Validation {
        dest: String,
        #[source]
        source: ValidationError,
    },

    #[error("pushing {dest:?} failed")]
    Transfer {
        dest: String,
        #[source]
        source: TransferError,
    },

    #[error("remote fetch of {dest:?} failed")]
    Fetch {
        dest: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error("staging inline content failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Pushes declared input files into a build's upload unit.
pub struct UploadCoordinator {
    cluster: Arc<dyn ClusterClient>,
    channel: Arc<dyn RemoteChannel>,
    container: String,
    /// Path of the shared storage root inside the unit. Destinations are
    /// resolved relative to it.
    storage_root: String,
    ready_interval: Duration,
    ready_cap: Duration,
}

impl UploadCoordinator {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        channel: Arc<dyn RemoteChannel>,
        container: impl Into<String>,
        storage_root: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            channel,
            container: container.into(),
            storage_root: storage_root.into(),
            ready_interval: READY_POLL_INTERVAL,
            ready_cap: READY_POLL_CAP,
        }
    }

    /// Override the readiness polling window.
    pub fn with_ready_window(mut self, interval: Duration, cap: Duration) -> Self {
        self.ready_interval = interval;
        self.ready_cap = cap;
        self
    }

    /// Upload all of `files` into `build`'s upload unit and set the
    /// uploads-complete marker.
    pub async fn upload_all(
        &self,
        build: &BuildResource,
        files: &[FileReference],
    ) -> Result<(), UploadError> {
        for file in files {
            file.validate().map_err(|source| UploadError::Validation {
                dest: file.dest.clone(),
                source,
            })?;
        }

        let unit = self.wait_unit_ready(&build.name).await?;
        tracing::info!(build = %build.name, unit, files = files.len(), "uploading input files");

        for file in files {
            self.push_one(&unit, file).await?;
        }

        self.cluster
            .patch_status(
                &build.name,
                StatusPatch { uploads_complete: Some(true), ..StatusPatch::default() },
            )
            .await?;
        tracing::info!(build = %build.name, "uploads complete");
        Ok(())
    }

    /// Poll until the upload unit exists and is ready.
    async fn wait_unit_ready(&self, build: &str) -> Result<String, UploadError> {
        let selector = upload_selector(build);
        let deadline = tokio::time::Instant::now() + self.ready_cap;
        loop {
            if let Some(unit) = self.cluster.find_unit(&selector).await? {
                if unit.ready {
                    return Ok(unit.name);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(UploadError::UnitNotReady { selector, waited: self.ready_cap });
            }
            tokio::time::sleep(self.ready_interval).await;
        }
    }

    async fn push_one(&self, unit: &str, file: &FileReference) -> Result<(), UploadError> {
        let dest = format!("{}/{}", self.storage_root, file.dest);
        let transfer = FileTransfer::new(self.channel.clone(), &self.container);

        match &file.source {
            FileSource::Local(path) => {
                transfer.push(unit, path, &dest).await.map_err(|source| {
                    UploadError::Transfer { dest: file.dest.clone(), source }
                })?;
            }
            FileSource::Inline(content) => {
                let mut staged = tempfile::NamedTempFile::new()?;
                staged.write_all(content.as_bytes())?;
                staged.flush()?;
                transfer.push(unit, staged.path(), &dest).await.map_err(|source| {
                    UploadError::Transfer { dest: file.dest.clone(), source }
                })?;
            }
            FileSource::Url(url) => {
                run_script(self.channel.as_ref(), unit, &self.container, &fetch_script(&dest, url))
                    .await
                    .map_err(|source| UploadError::Fetch { dest: file.dest.clone(), source })?;
            }
        }
        Ok(())
    }
}

/// Script the unit runs to fetch a URL-sourced input itself.
fn fetch_script(dest: &str, url: &str) -> String {
    let parent = match std::path::Path::new(dest).parent() {
        Some(p) if !p.as_os_str().is_empty() => p.display().to_string(),
        _ => ".".to_string(),
    };
    format!(
        "mkdir -p {} && curl -fsSL -o {} {}",
        sh_quote(&parent),
        sh_quote(dest),
        sh_quote(url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use osforge_remote::cluster::{MemoryCluster, UnitInfo};
    use osforge_remote::local::LocalChannel;

    fn build(name: &str) -> BuildResource {
        BuildResource { name: name.into(), namespace: "builds".into(), ..Default::default() }
    }

    fn harness() -> (tempfile::TempDir, Arc<MemoryCluster>, LocalChannel, UploadCoordinator) {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(MemoryCluster::new());
        let channel = LocalChannel::new(dir.path());
        let coord = UploadCoordinator::new(
            cluster.clone(),
            Arc::new(channel.clone()),
            "main",
            "data",
        );
        (dir, cluster, channel, coord)
    }

    fn ready_unit(cluster: &MemoryCluster, build: &str) {
        cluster.insert_unit(
            &upload_selector(build),
            UnitInfo { name: "upload-0".into(), ready: true },
        );
    }

    #[tokio::test]
    async fn uploads_files_and_sets_marker() {
        let (dir, cluster, channel, coord) = harness();
        let b = build("b1");
        cluster.create_build(b.clone()).await.unwrap();
        ready_unit(&cluster, "b1");

        let local = dir.path().join("cfg.yml");
        std::fs::write(&local, b"a: 1\n").unwrap();

        let files = vec![
            FileReference::local("configs/cfg.yml", &local),
            FileReference::inline("manifest.aib.yml", "image:\n  name: test\n"),
        ];
        coord.upload_all(&b, &files).await.unwrap();

        let sandbox = channel.sandbox("upload-0");
        assert_eq!(std::fs::read(sandbox.join("data/configs/cfg.yml")).unwrap(), b"a: 1\n");
        assert_eq!(
            std::fs::read(sandbox.join("data/manifest.aib.yml")).unwrap(),
            b"image:\n  name: test\n"
        );

        let stored = cluster.get_build("b1").await.unwrap().unwrap();
        assert!(stored.status.uploads_complete);
    }

    #[tokio::test]
    async fn bad_reference_fails_before_any_remote_call() {
        let (dir, cluster, channel, coord) = harness();
        let b = build("b1");
        cluster.create_build(b.clone()).await.unwrap();
        ready_unit(&cluster, "b1");

        let local = dir.path().join("ok.txt");
        std::fs::write(&local, b"ok").unwrap();

        let files = vec![
            FileReference::local("ok.txt", &local),
            FileReference::inline("../escape", "evil"),
        ];
        let err = coord.upload_all(&b, &files).await.unwrap_err();
        assert!(matches!(err, UploadError::Validation { ref dest, .. } if dest == "../escape"));

        // Nothing was pushed, not even the valid first file.
        assert!(!channel.sandbox("upload-0").exists());
        let stored = cluster.get_build("b1").await.unwrap().unwrap();
        assert!(!stored.status.uploads_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn unit_never_ready_times_out() {
        let (_dir, cluster, _channel, coord) = harness();
        let b = build("b1");
        cluster.create_build(b.clone()).await.unwrap();
        // Unit exists but never becomes ready.
        cluster.insert_unit(
            &upload_selector("b1"),
            UnitInfo { name: "upload-0".into(), ready: false },
        );

        let err = coord.upload_all(&b, &[]).await.unwrap_err();
        assert!(matches!(err, UploadError::UnitNotReady { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_unit_to_become_ready() {
        let (_dir, cluster, _channel, coord) = harness();
        let b = build("b1");
        cluster.create_build(b.clone()).await.unwrap();

        let task = {
            let cluster = cluster.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(12)).await;
                ready_unit(&cluster, "b1");
            })
        };
        coord.upload_all(&b, &[]).await.unwrap();
        task.await.unwrap();

        let stored = cluster.get_build("b1").await.unwrap().unwrap();
        assert!(stored.status.uploads_complete);
    }

    #[tokio::test]
    async fn failed_push_carries_destination_context() {
        let (dir, cluster, _channel, coord) = harness();
        let b = build("b1");
        cluster.create_build(b.clone()).await.unwrap();
        ready_unit(&cluster, "b1");

        let missing = dir.path().join("gone.txt");
        let files = vec![FileReference::local("in/gone.txt", &missing)];
        let err = coord.upload_all(&b, &files).await.unwrap_err();
        match err {
            UploadError::Transfer { dest, source } => {
                assert_eq!(dest, "in/gone.txt");
                assert!(matches!(source, TransferError::Archive(_)));
            }
            other => panic!("expected Transfer, got {other:?}"),
        }
    }

    #[test]
    fn fetch_script_quotes_and_creates_parent() {
        let s = fetch_script("data/in put.img", "https://example.com/a?x=1");
        assert_eq!(
            s,
            "mkdir -p 'data' && curl -fsSL -o 'data/in put.img' 'https://example.com/a?x=1'"
        );
    }
}
