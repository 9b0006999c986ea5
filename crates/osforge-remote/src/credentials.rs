//! Cluster credential discovery.
//!
//! Access configuration is resolved through an ordered provider chain,
//! first success wins: an explicit kubeconfig path, the `KUBECONFIG`
//! environment variable, the in-cluster service-account mount, then the
//! default `~/.kube/config`. The chain is an explicit list rather than
//! nested fallthrough so the resolution order reads top to bottom.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Default in-cluster service-account mount point.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("kubeconfig {0:?} does not exist")]
    MissingKubeconfig(PathBuf),

    #[error("no cluster credentials found (no kubeconfig, no in-cluster service account)")]
    NoneFound,
}

/// How the process authenticates to the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterAccess {
    /// Out-of-cluster access via a kubeconfig file.
    Kubeconfig(PathBuf),
    /// In-cluster access via the mounted service-account token.
    ServiceAccount { token_dir: PathBuf },
}

impl ClusterAccess {
    /// Resolve access configuration from the ambient environment.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, CredentialError> {
        Self::discover_in(explicit, &RealEnvironment)
    }

    fn discover_in(
        explicit: Option<&Path>,
        env: &dyn Environment,
    ) -> Result<Self, CredentialError> {
        // An explicit path is an instruction, not a hint: if it does not
        // exist the chain stops rather than silently falling through.
        if let Some(path) = explicit {
            if !env.exists(path) {
                return Err(CredentialError::MissingKubeconfig(path.to_path_buf()));
            }
            return Ok(Self::Kubeconfig(path.to_path_buf()));
        }

        let providers: [&dyn Fn(&dyn Environment) -> Option<ClusterAccess>; 3] = [
            &from_env_var,
            &from_service_account,
            &from_default_kubeconfig,
        ];
        for provider in providers {
            if let Some(access) = provider(env) {
                tracing::debug!(?access, "cluster credentials resolved");
                return Ok(access);
            }
        }
        Err(CredentialError::NoneFound)
    }

    /// Kubeconfig path to pass on the kubectl command line, if any.
    /// In-cluster access relies on kubectl's own service-account handling.
    pub fn kubeconfig(&self) -> Option<&Path> {
        match self {
            Self::Kubeconfig(path) => Some(path),
            Self::ServiceAccount { .. } => None,
        }
    }
}

fn from_env_var(env: &dyn Environment) -> Option<ClusterAccess> {
    let value = env.var("KUBECONFIG")?;
    let path = PathBuf::from(value);
    env.exists(&path).then(|| ClusterAccess::Kubeconfig(path))
}

fn from_service_account(env: &dyn Environment) -> Option<ClusterAccess> {
    let dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
    env.exists(&dir.join("token"))
        .then(|| ClusterAccess::ServiceAccount { token_dir: dir })
}

fn from_default_kubeconfig(env: &dyn Environment) -> Option<ClusterAccess> {
    let home = env.var("HOME")?;
    let path = PathBuf::from(home).join(".kube/config");
    env.exists(&path).then(|| ClusterAccess::Kubeconfig(path))
}

/// Environment access, injectable so the chain is testable without
/// touching the process environment or the filesystem.
trait Environment {
    fn var(&self, name: &str) -> Option<String>;
    fn exists(&self, path: &Path) -> bool;
}

struct RealEnvironment;

impl Environment for RealEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}
