//! Build-resource and unit access.
//!
//! [`ClusterClient`] is the seam between osforge and the control plane
//! that actually reconciles builds. Clients only ever create, read,
//! delete, and narrowly patch build resources; every phase transition is
//! driven by the external controller. Status patches use merge semantics
//! (fetch latest, apply field, write) so concurrent narrow patches from
//! different components do not stomp each other's fields.

use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use osforge_core::BuildResource;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::io::AsyncRead;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("build {name:?} already exists")]
    AlreadyExists { name: String },

    #[error("build {name:?} not found")]
    NotFound { name: String },

    #[error("build {name:?} still present after {waited:?}")]
    DeletionTimeout { name: String, waited: Duration },

    /// The control-plane API rejected or failed the operation.
    #[error("cluster api error: {reason}")]
    Api { reason: String },
}

/// A compute unit as seen through a label-selector lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub name: String,
    /// True once the unit is running and all its containers are ready.
    pub ready: bool,
}

/// Narrow status patch applied with merge semantics. Fields left `None`
/// are untouched on the resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPatch {
    pub uploads_complete: Option<bool>,
    pub artifact_url: Option<String>,
}

/// One pipeline step's log stream.
pub struct LogStep {
    pub name: String,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

/// Access to build resources and their compute units.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_build(&self, name: &str) -> Result<Option<BuildResource>, ClusterError>;

    async fn list_builds(&self) -> Result<Vec<BuildResource>, ClusterError>;

    /// Create a new resource. Fails with [`ClusterError::AlreadyExists`]
    /// without mutating the existing resource when the name is taken.
    async fn create_build(&self, resource: BuildResource) -> Result<(), ClusterError>;

    /// Request deletion. Deleting an absent resource is not an error.
    async fn delete_build(&self, name: &str) -> Result<(), ClusterError>;

    /// Apply a narrow merge patch to the resource's status.
    async fn patch_status(&self, name: &str, patch: StatusPatch) -> Result<(), ClusterError>;

    /// Find a unit matching `selector`, if any exists yet.
    async fn find_unit(&self, selector: &str) -> Result<Option<UnitInfo>, ClusterError>;

    /// Open per-step log streams for a build's pipeline run, in step
    /// order. Empty when no step has produced output yet.
    async fn log_steps(&self, build: &BuildResource) -> Result<Vec<LogStep>, ClusterError>;

    /// Block until deletion of `name` has been observed, polling every
    /// two seconds. Re-creating a build under the same name races the
    /// controller's cleanup of dependent objects unless deletion is
    /// confirmed first.
    async fn wait_deleted(&self, name: &str, timeout: Duration) -> Result<(), ClusterError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.get_build(name).await?.is_none() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClusterError::DeletionTimeout { name: name.into(), waited: timeout });
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }
}

/// In-memory [`ClusterClient`] used by tests and local development mode.
///
/// Phase transitions that the real controller would perform are driven
/// through the `set_*` helpers.
#[derive(Default)]
pub struct MemoryCluster {
    builds: RwLock<HashMap<String, BuildResource>>,
    units: RwLock<HashMap<String, UnitInfo>>,
    logs: RwLock<HashMap<String, Vec<(String, Vec<u8>)>>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit under a label selector.
    pub fn insert_unit(&self, selector: &str, unit: UnitInfo) {
        self.units.write().insert(selector.into(), unit);
    }

    pub fn remove_unit(&self, selector: &str) {
        self.units.write().remove(selector);
    }

    /// Apply a controller-side mutation to a stored resource.
    pub fn update_build<F>(&self, name: &str, mutate: F)
    where
        F: FnOnce(&mut BuildResource),
    {
        if let Some(b) = self.builds.write().get_mut(name) {
            mutate(b);
        }
    }

    /// Append a log chunk for a named pipeline step.
    pub fn push_log(&self, build: &str, step: &str, chunk: &[u8]) {
        let mut logs = self.logs.write();
        let steps = logs.entry(build.into()).or_default();
        if let Some((_, buf)) = steps.iter_mut().find(|(s, _)| s == step) {
            buf.extend_from_slice(chunk);
        } else {
            steps.push((step.into(), chunk.to_vec()));
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get_build(&self, name: &str) -> Result<Option<BuildResource>, ClusterError> {
        Ok(self.builds.read().get(name).cloned())
    }

    async fn list_builds(&self) -> Result<Vec<BuildResource>, ClusterError> {
        let mut all: Vec<_> = self.builds.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn create_build(&self, resource: BuildResource) -> Result<(), ClusterError> {
        let mut builds = self.builds.write();
        if builds.contains_key(&resource.name) {
            return Err(ClusterError::AlreadyExists { name: resource.name });
        }
        builds.insert(resource.name.clone(), resource);
        Ok(())
    }

    async fn delete_build(&self, name: &str) -> Result<(), ClusterError> {
        self.builds.write().remove(name);
        self.logs.write().remove(name);
        Ok(())
    }

    async fn patch_status(&self, name: &str, patch: StatusPatch) -> Result<(), ClusterError> {
        let mut builds = self.builds.write();
        let build = builds
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound { name: name.into() })?;
        if let Some(v) = patch.uploads_complete {
            build.status.uploads_complete = v;
        }
        if let Some(v) = patch.artifact_url {
            build.status.artifact_url = v;
        }
        Ok(())
    }

    async fn find_unit(&self, selector: &str) -> Result<Option<UnitInfo>, ClusterError> {
        Ok(self.units.read().get(selector).cloned())
    }

    async fn log_steps(&self, build: &BuildResource) -> Result<Vec<LogStep>, ClusterError> {
        let logs = self.logs.read();
        let steps = logs.get(&build.name).cloned().unwrap_or_default();
        Ok(steps
            .into_iter()
            .map(|(name, bytes)| LogStep {
                name,
                reader: Box::pin(std::io::Cursor::new(bytes)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osforge_core::BuildPhase;
    use tokio::io::AsyncReadExt;

    fn resource(name: &str) -> BuildResource {
        BuildResource { name: name.into(), namespace: "builds".into(), ..Default::default() }
    }

    #[tokio::test]
    async fn create_then_get() {
        let c = MemoryCluster::new();
        c.create_build(resource("b1")).await.unwrap();
        assert!(c.get_build("b1").await.unwrap().is_some());
        assert!(c.get_build("b2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_rejected_without_mutation() {
        let c = MemoryCluster::new();
        let mut first = resource("b1");
        first.spec.distro = "original".into();
        c.create_build(first).await.unwrap();

        let mut second = resource("b1");
        second.spec.distro = "imposter".into();
        let err = c.create_build(second).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists { .. }));

        let stored = c.get_build("b1").await.unwrap().unwrap();
        assert_eq!(stored.spec.distro, "original");
    }

    #[tokio::test]
    async fn patch_merges_narrow_fields() {
        let c = MemoryCluster::new();
        c.create_build(resource("b1")).await.unwrap();
        c.update_build("b1", |b| {
            b.status.phase = Some(BuildPhase::Building);
            b.status.message = "controller owns this".into();
        });

        c.patch_status("b1", StatusPatch { uploads_complete: Some(true), ..Default::default() })
            .await
            .unwrap();

        let b = c.get_build("b1").await.unwrap().unwrap();
        assert!(b.status.uploads_complete);
        // Controller-owned fields untouched by the narrow patch.
        assert_eq!(b.status.phase, Some(BuildPhase::Building));
        assert_eq!(b.status.message, "controller owns this");
    }

    #[tokio::test]
    async fn patch_missing_build_is_not_found() {
        let c = MemoryCluster::new();
        let err = c.patch_status("ghost", StatusPatch::default()).await.unwrap_err();
        assert!(matches!(err, ClusterError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let c = MemoryCluster::new();
        c.create_build(resource("zeta")).await.unwrap();
        c.create_build(resource("alpha")).await.unwrap();
        let names: Vec<_> = c.list_builds().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_deleted_returns_once_gone() {
        let c = std::sync::Arc::new(MemoryCluster::new());
        c.create_build(resource("b1")).await.unwrap();

        let waiter = {
            let c = c.clone();
            tokio::spawn(async move { c.wait_deleted("b1", Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        c.delete_build("b1").await.unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_deleted_times_out() {
        let c = MemoryCluster::new();
        c.create_build(resource("b1")).await.unwrap();
        let err = c.wait_deleted("b1", Duration::from_secs(6)).await.unwrap_err();
        assert!(matches!(err, ClusterError::DeletionTimeout { .. }));
    }

    #[tokio::test]
    async fn log_steps_in_order() {
        let c = MemoryCluster::new();
        c.create_build(resource("b1")).await.unwrap();
        c.push_log("b1", "prepare", b"preparing\n");
        c.push_log("b1", "build", b"building\n");
        c.push_log("b1", "prepare", b"done\n");

        let build = c.get_build("b1").await.unwrap().unwrap();
        let mut steps = c.log_steps(&build).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].name, "prepare");

        let mut text = String::new();
        steps[0].reader.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, "preparing\ndone\n");
    }

    #[tokio::test]
    async fn unit_lookup() {
        let c = MemoryCluster::new();
        assert!(c.find_unit("app=upload").await.unwrap().is_none());
        c.insert_unit("app=upload", UnitInfo { name: "upload-0".into(), ready: false });
        let u = c.find_unit("app=upload").await.unwrap().unwrap();
        assert!(!u.ready);
    }
}
