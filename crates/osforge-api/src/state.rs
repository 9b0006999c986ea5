//! Shared application state.

use std::sync::Arc;

use osforge_remote::{ClusterClient, RemoteChannel};

use crate::auth::TokenVerifier;

/// State shared by all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub cluster: Arc<dyn ClusterClient>,
    pub channel: Arc<dyn RemoteChannel>,
    /// Namespace build resources are created in.
    pub namespace: String,
    /// Container name targeted inside build units.
    pub container: String,
    /// Shared storage root inside units that uploads land under.
    pub storage_root: String,
    /// Bearer-token verifier. `None` leaves the API open (local mode).
    pub verifier: Option<Arc<dyn TokenVerifier>>,
    /// Upload-unit readiness polling window `(interval, cap)`.
    pub upload_ready_window: (std::time::Duration, std::time::Duration),
}

impl AppState {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        channel: Arc<dyn RemoteChannel>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            channel,
            namespace: namespace.into(),
            container: "builder".into(),
            storage_root: "workspace".into(),
            verifier: None,
            upload_ready_window: (
                osforge_build::upload::READY_POLL_INTERVAL,
                osforge_build::upload::READY_POLL_CAP,
            ),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}
