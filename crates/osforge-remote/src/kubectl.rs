//! kubectl-backed channel and cluster client.
//!
//! Production access to the cluster goes through `kubectl` subprocesses:
//! `kubectl exec` for remote channels, `kubectl get/create/delete/patch`
//! with JSON output for build resources, `kubectl logs` for step output.
//! All argument construction is pure and unit-tested; the subprocess
//! plumbing is shared with the local channel.

use std::path::PathBuf;

use async_trait::async_trait;
use osforge_core::{BuildResource, BuildSpec, BuildStatus};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::channel::{RemoteChannel, RemoteError, RemoteProcess, StdinMode};
use crate::cluster::{ClusterClient, ClusterError, LogStep, StatusPatch, UnitInfo};
use crate::spawn::spawn_process;

/// API group/version of the build resource.
pub const API_VERSION: &str = "osforge.io/v1alpha1";
/// Kind of the build resource.
pub const KIND: &str = "OSImageBuild";
/// Plural resource name used on the kubectl command line.
pub const RESOURCE: &str = "osimagebuilds";
/// Label tying pipeline units to their build.
pub const BUILD_LABEL: &str = "osforge.io/build";

/// Connection parameters for kubectl-backed access.
#[derive(Debug, Clone)]
pub struct KubectlConfig {
    /// kubectl binary to invoke.
    pub kubectl: PathBuf,
    pub namespace: String,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
}

impl KubectlConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            kubectl: PathBuf::from("kubectl"),
            namespace: namespace.into(),
            kubeconfig: None,
            context: None,
        }
    }

    /// Flags shared by every kubectl invocation.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--namespace".into(), self.namespace.clone()];
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".into());
            args.push(path.display().to_string());
        }
        if let Some(ctx) = &self.context {
            args.push("--context".into());
            args.push(ctx.clone());
        }
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.kubectl);
        cmd.args(self.base_args()).args(args);
        cmd
    }
}

/// Remote channel running commands via `kubectl exec`.
#[derive(Debug, Clone)]
pub struct KubectlChannel {
    config: KubectlConfig,
}

impl KubectlChannel {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }
}

/// Arguments for `kubectl exec` against a unit/container pair.
fn exec_args(unit: &str, container: &str, command: &[String], stdin: StdinMode) -> Vec<String> {
    let mut args: Vec<String> = vec!["exec".into()];
    if stdin == StdinMode::Attached {
        args.push("-i".into());
    }
    args.push(unit.into());
    args.push("-c".into());
    args.push(container.into());
    args.push("--".into());
    args.extend_from_slice(command);
    args
}

#[async_trait]
impl RemoteChannel for KubectlChannel {
    async fn open(
        &self,
        unit: &str,
        container: &str,
        command: &[String],
        stdin: StdinMode,
    ) -> Result<RemoteProcess, RemoteError> {
        tracing::debug!(unit, container, command = ?command, "opening exec channel");
        let args = exec_args(unit, container, command, stdin);
        spawn_process(self.config.command(&args), stdin)
    }
}

/// Cluster client backed by kubectl JSON output.
#[derive(Debug, Clone)]
pub struct KubectlCluster {
    config: KubectlConfig,
}

impl KubectlCluster {
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    async fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<Vec<u8>, ClusterError> {
        let mode = if stdin.is_some() { StdinMode::Attached } else { StdinMode::Closed };
        let mut proc = spawn_process(self.config.command(args), mode)
            .map_err(|e| ClusterError::Api { reason: e.to_string() })?;
        if let Some(bytes) = stdin {
            let mut writer = proc.stdin.take().ok_or_else(|| ClusterError::Api {
                reason: "kubectl stdin not captured".into(),
            })?;
            writer
                .write_all(bytes)
                .await
                .and(writer.shutdown().await)
                .map_err(|e| ClusterError::Api { reason: e.to_string() })?;
        }
        proc.collect().await.map_err(|e| match e {
            RemoteError::CommandFailed { stderr } => classify_stderr(stderr),
            other => ClusterError::Api { reason: other.to_string() },
        })
    }

    fn parse<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ClusterError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ClusterError::Api { reason: format!("unparseable kubectl output: {e}") })
    }
}

/// Map kubectl's server error text to the structured error taxonomy.
fn classify_stderr(stderr: String) -> ClusterError {
    if stderr.contains("(NotFound)") {
        ClusterError::NotFound { name: String::new() }
    } else if stderr.contains("(AlreadyExists)") {
        ClusterError::AlreadyExists { name: String::new() }
    } else {
        ClusterError::Api { reason: stderr }
    }
}

/// Wrap a [`BuildResource`] into its cluster manifest representation.
fn to_manifest(resource: &BuildResource) -> Value {
    json!({
        "apiVersion": API_VERSION,
        "kind": KIND,
        "metadata": {
            "name": resource.name,
            "namespace": resource.namespace,
        },
        "spec": resource.spec,
        "status": resource.status,
    })
}

/// Read a [`BuildResource`] back out of a cluster manifest.
fn from_manifest(value: &Value) -> Result<BuildResource, ClusterError> {
    let bad = |reason: &str| ClusterError::Api { reason: reason.to_string() };
    let metadata = value.get("metadata").ok_or_else(|| bad("manifest missing metadata"))?;
    let name = metadata
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| bad("manifest missing metadata.name"))?
        .to_string();
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let spec: BuildSpec = value
        .get("spec")
        .map(|s| serde_json::from_value(s.clone()))
        .transpose()
        .map_err(|e| bad(&format!("manifest spec unparseable: {e}")))?
        .unwrap_or_default();
    let status: BuildStatus = value
        .get("status")
        .map(|s| serde_json::from_value(s.clone()))
        .transpose()
        .map_err(|e| bad(&format!("manifest status unparseable: {e}")))?
        .unwrap_or_default();
    Ok(BuildResource { name, namespace, spec, status })
}

/// Whether a pod manifest describes a running unit with all containers ready.
fn unit_from_pod(pod: &Value) -> Option<UnitInfo> {
    let name = pod.pointer("/metadata/name")?.as_str()?.to_string();
    let running = pod.pointer("/status/phase").and_then(Value::as_str) == Some("Running");
    let statuses = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let all_ready = !statuses.is_empty()
        && statuses.iter().all(|c| c.get("ready").and_then(Value::as_bool) == Some(true));
    Some(UnitInfo { name, ready: running && all_ready })
}

#[async_trait]
impl ClusterClient for KubectlCluster {
    async fn get_build(&self, name: &str) -> Result<Option<BuildResource>, ClusterError> {
        let args: Vec<String> =
            vec!["get".into(), RESOURCE.into(), name.into(), "-o".into(), "json".into()];
        match self.run(&args, None).await {
            Ok(out) => Ok(Some(from_manifest(&Self::parse::<Value>(&out)?)?)),
            Err(ClusterError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_builds(&self) -> Result<Vec<BuildResource>, ClusterError> {
        let args: Vec<String> = vec!["get".into(), RESOURCE.into(), "-o".into(), "json".into()];
        let out = self.run(&args, None).await?;
        let list: Value = Self::parse(&out)?;
        list.get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(from_manifest).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create_build(&self, resource: BuildResource) -> Result<(), ClusterError> {
        let manifest = serde_json::to_vec(&to_manifest(&resource))
            .map_err(|e| ClusterError::Api { reason: e.to_string() })?;
        let args: Vec<String> = vec!["create".into(), "-f".into(), "-".into()];
        match self.run(&args, Some(&manifest)).await {
            Ok(_) => Ok(()),
            Err(ClusterError::AlreadyExists { .. }) => {
                Err(ClusterError::AlreadyExists { name: resource.name })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_build(&self, name: &str) -> Result<(), ClusterError> {
        let args: Vec<String> = vec![
            "delete".into(),
            RESOURCE.into(),
            name.into(),
            "--ignore-not-found".into(),
        ];
        self.run(&args, None).await.map(|_| ())
    }

    async fn patch_status(&self, name: &str, patch: StatusPatch) -> Result<(), ClusterError> {
        let mut status = serde_json::Map::new();
        if let Some(v) = patch.uploads_complete {
            status.insert("uploads_complete".into(), json!(v));
        }
        if let Some(v) = patch.artifact_url {
            status.insert("artifact_url".into(), json!(v));
        }
        let body = json!({ "status": Value::Object(status) }).to_string();
        let args: Vec<String> = vec![
            "patch".into(),
            RESOURCE.into(),
            name.into(),
            "--type=merge".into(),
            "-p".into(),
            body,
        ];
        match self.run(&args, None).await {
            Ok(_) => Ok(()),
            Err(ClusterError::NotFound { .. }) => {
                Err(ClusterError::NotFound { name: name.into() })
            }
            Err(e) => Err(e),
        }
    }

    async fn find_unit(&self, selector: &str) -> Result<Option<UnitInfo>, ClusterError> {
        let args: Vec<String> = vec![
            "get".into(),
            "pods".into(),
            "-l".into(),
            selector.into(),
            "-o".into(),
            "json".into(),
        ];
        let out = self.run(&args, None).await?;
        let list: Value = Self::parse(&out)?;
        Ok(list
            .get("items")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .find_map(unit_from_pod))
    }

    async fn log_steps(&self, build: &BuildResource) -> Result<Vec<LogStep>, ClusterError> {
        let selector = format!("{BUILD_LABEL}={}", build.name);
        let args: Vec<String> = vec![
            "get".into(),
            "pods".into(),
            "-l".into(),
            selector,
            "-o".into(),
            "json".into(),
        ];
        let out = self.run(&args, None).await?;
        let list: Value = Self::parse(&out)?;

        let mut steps = Vec::new();
        for pod in list.get("items").and_then(Value::as_array).into_iter().flatten() {
            let Some(pod_name) = pod.pointer("/metadata/name").and_then(Value::as_str) else {
                continue;
            };
            for status in pod
                .pointer("/status/containerStatuses")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                let Some(container) = status.get("name").and_then(Value::as_str) else {
                    continue;
                };
                // Containers that never started have no log stream to open.
                if status.get("state").and_then(|s| s.get("waiting")).is_some() {
                    continue;
                }
                let log_args: Vec<String> =
                    vec!["logs".into(), pod_name.into(), "-c".into(), container.into()];
                let proc = spawn_process(self.config.command(&log_args), StdinMode::Closed)
                    .map_err(|e| ClusterError::Api { reason: e.to_string() })?;
                steps.push(LogStep { name: container.to_string(), reader: proc.stdout });
            }
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_args_with_stdin() {
        let cmd: Vec<String> = vec!["sh".into(), "-c".into(), "cat > f".into()];
        let args = exec_args("pod-1", "main", &cmd, StdinMode::Attached);
        assert_eq!(args, ["exec", "-i", "pod-1", "-c", "main", "--", "sh", "-c", "cat > f"]);
    }

    #[test]
    fn exec_args_without_stdin() {
        let cmd: Vec<String> = vec!["true".into()];
        let args = exec_args("pod-1", "main", &cmd, StdinMode::Closed);
        assert_eq!(args, ["exec", "pod-1", "-c", "main", "--", "true"]);
    }

    #[test]
    fn base_args_include_optional_flags() {
        let mut config = KubectlConfig::new("builds");
        assert_eq!(config.base_args(), ["--namespace", "builds"]);
        config.kubeconfig = Some(PathBuf::from("/home/me/.kube/config"));
        config.context = Some("staging".into());
        assert_eq!(
            config.base_args(),
            [
                "--namespace",
                "builds",
                "--kubeconfig",
                "/home/me/.kube/config",
                "--context",
                "staging"
            ]
        );
    }

    #[test]
    fn manifest_round_trip() {
        let mut resource = BuildResource {
            name: "b1".into(),
            namespace: "builds".into(),
            ..Default::default()
        };
        resource.spec.distro = "autosd".into();
        resource.status.message = "building".into();

        let manifest = to_manifest(&resource);
        assert_eq!(manifest["apiVersion"], API_VERSION);
        assert_eq!(manifest["kind"], KIND);

        let back = from_manifest(&manifest).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn manifest_without_status_defaults() {
        let value = json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "metadata": { "name": "b1" },
            "spec": {},
        });
        let resource = from_manifest(&value).unwrap();
        assert_eq!(resource.name, "b1");
        assert_eq!(resource.status, BuildStatus::default());
    }

    #[test]
    fn stderr_classification() {
        assert!(matches!(
            classify_stderr("Error from server (NotFound): osimagebuilds \"x\" not found".into()),
            ClusterError::NotFound { .. }
        ));
        assert!(matches!(
            classify_stderr("Error from server (AlreadyExists): already exists".into()),
            ClusterError::AlreadyExists { .. }
        ));
        assert!(matches!(
            classify_stderr("connection refused".into()),
            ClusterError::Api { .. }
        ));
    }

    #[test]
    fn pod_readiness_parsing() {
        let ready_pod = json!({
            "metadata": { "name": "upload-0" },
            "status": {
                "phase": "Running",
                "containerStatuses": [
                    { "name": "main", "ready": true },
                    { "name": "sidecar", "ready": true }
                ]
            }
        });
        assert_eq!(
            unit_from_pod(&ready_pod),
            Some(UnitInfo { name: "upload-0".into(), ready: true })
        );

        let pending_pod = json!({
            "metadata": { "name": "upload-1" },
            "status": { "phase": "Pending" }
        });
        assert_eq!(
            unit_from_pod(&pending_pod),
            Some(UnitInfo { name: "upload-1".into(), ready: false })
        );

        let not_ready = json!({
            "metadata": { "name": "upload-2" },
            "status": {
                "phase": "Running",
                "containerStatuses": [ { "name": "main", "ready": false } ]
            }
        });
        assert_eq!(unit_from_pod(&not_ready).unwrap().ready, false);
    }
}
