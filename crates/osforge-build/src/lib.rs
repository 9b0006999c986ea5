//! # osforge-build — Build Orchestration
//!
//! Sits between the cluster access layer and the user-facing surfaces.
//! Three orchestrators, all pure observers of the build resource — phase
//! transitions are driven exclusively by the external controller:
//!
//! - [`upload::UploadCoordinator`] — pushes declared input files into the
//!   upload unit and sets the uploads-complete marker.
//! - [`poller::LifecyclePoller`] — polls a build to a terminal outcome as
//!   an explicit state machine.
//! - [`stream::ArtifactStreamer`] — opens a compressed on-demand stream
//!   of the finished artifact straight out of the artifact unit.

pub mod poller;
pub mod stream;
pub mod upload;

pub use poller::{LifecyclePoller, PollError, PollStatus};
pub use stream::{ArtifactStream, ArtifactStreamer, StreamError};
pub use upload::{UploadCoordinator, UploadError};

use osforge_remote::kubectl::BUILD_LABEL;

/// Label identifying a unit's role within a build's pipeline.
pub const ROLE_LABEL: &str = "osforge.io/role";

/// Selector matching the upload unit of `build`.
pub fn upload_selector(build: &str) -> String {
    format!("{BUILD_LABEL}={build},{ROLE_LABEL}=upload")
}

/// Selector matching the artifact unit of `build`.
pub fn artifact_selector(build: &str) -> String {
    format!("{BUILD_LABEL}={build},{ROLE_LABEL}=artifact")
}

/// Log and swallow a failure from a side effect that must not mask the
/// outcome of an already-successful main operation.
pub fn log_non_fatal<T, E: std::fmt::Display>(context: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(context, error = %e, "non-fatal side effect failed");
            None
        }
    }
}
