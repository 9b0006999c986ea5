//! Gateway entry point.
//!
//! Configuration comes from the environment:
//!
//! - `OSFORGE_LISTEN` — bind address (default `0.0.0.0:8080`)
//! - `OSFORGE_NAMESPACE` — namespace build resources live in
//! - `OSFORGE_IDENTITY_ENDPOINT` — token-review endpoint URL; presented
//!   tokens are verified against it (takes precedence over the static
//!   token)
//! - `OSFORGE_AUTH_TOKEN` — static bearer token; with both variables
//!   unset the API is open (local development only)
//! - `OSFORGE_KUBECONFIG` — explicit kubeconfig path; unset runs the
//!   standard discovery chain
//! - `RUST_LOG` — tracing filter (default `info`)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use osforge_api::auth::{IdentityServiceVerifier, StaticTokenVerifier, TokenVerifier};
use osforge_api::AppState;
use osforge_remote::{ClusterAccess, KubectlChannel, KubectlCluster, KubectlConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let listen = std::env::var("OSFORGE_LISTEN").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let namespace = std::env::var("OSFORGE_NAMESPACE").unwrap_or_else(|_| "osforge".into());
    let explicit = std::env::var("OSFORGE_KUBECONFIG").ok().map(PathBuf::from);

    let access = ClusterAccess::discover(explicit.as_deref())
        .context("resolving cluster credentials")?;
    let mut config = KubectlConfig::new(namespace.as_str());
    config.kubeconfig = access.kubeconfig().map(|p| p.to_path_buf());

    let mut state = AppState::new(
        Arc::new(KubectlCluster::new(config.clone())),
        Arc::new(KubectlChannel::new(config)),
        namespace.as_str(),
    );
    let verifier = resolve_verifier(
        std::env::var("OSFORGE_AUTH_TOKEN").ok(),
        std::env::var("OSFORGE_IDENTITY_ENDPOINT").ok(),
    )?;
    match verifier {
        Some(verifier) => state = state.with_verifier(verifier),
        None => tracing::warn!(
            "OSFORGE_AUTH_TOKEN and OSFORGE_IDENTITY_ENDPOINT unset, API is unauthenticated"
        ),
    }

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    tracing::info!(%listen, %namespace, "gateway listening");
    axum::serve(listener, osforge_api::app(state))
        .await
        .context("serving")?;
    Ok(())
}

/// Pick the token verifier from the environment. An identity endpoint
/// takes precedence over a static token; empty values count as unset.
fn resolve_verifier(
    token: Option<String>,
    identity_endpoint: Option<String>,
) -> anyhow::Result<Option<Arc<dyn TokenVerifier>>> {
    if let Some(endpoint) = identity_endpoint.filter(|v| !v.is_empty()) {
        let endpoint = url::Url::parse(&endpoint)
            .with_context(|| format!("invalid OSFORGE_IDENTITY_ENDPOINT {endpoint:?}"))?;
        let verifier = IdentityServiceVerifier::new(reqwest::Client::new(), endpoint);
        return Ok(Some(Arc::new(verifier)));
    }
    Ok(token
        .filter(|v| !v.is_empty())
        .map(|token| Arc::new(StaticTokenVerifier::new(token)) as Arc<dyn TokenVerifier>))
}
