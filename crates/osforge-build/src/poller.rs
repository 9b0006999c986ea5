//! Build lifecycle polling.
//!
//! [`LifecyclePoller`] is an explicit state machine over the observed
//! build resource: each [`LifecyclePoller::step`] fetches the resource
//! once and classifies it. It is a pure observer and never drives a
//! transition; the external controller owns the lifecycle.
//!
//! A status line is logged only when the observed phase or message
//! changed since the previous step, so a long-running build produces one
//! line per transition rather than one per poll.

use std::time::Duration;

use osforge_core::{BuildPhase, BuildResource};
use osforge_remote::cluster::{ClusterClient, ClusterError};
use thiserror::Error;

/// Interval between polls in [`LifecyclePoller::wait_for_completion`].
const POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The resource disappeared mid-poll (deleted out from under us).
    #[error("build {name:?} vanished while polling")]
    Vanished { name: String },
}

/// Outcome of one polling step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Building,
    /// Terminal success. When the build serves its artifact over the
    /// network this is only reported once the artifact URL is populated.
    Completed,
    /// Terminal failure, with the resource's status message verbatim.
    Failed { message: String },
    /// The polling deadline elapsed. Distinct from build failure: the
    /// build itself may still be running.
    TimedOut,
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Building)
    }
}

/// Polls one build to a terminal outcome.
pub struct LifecyclePoller {
    name: String,
    deadline: tokio::time::Instant,
    last_seen: Option<(BuildPhase, String)>,
}

impl LifecyclePoller {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            deadline: tokio::time::Instant::now() + timeout,
            last_seen: None,
        }
    }

    /// Fetch the resource once and classify its state.
    pub async fn step(&mut self, cluster: &dyn ClusterClient) -> Result<PollStatus, PollError> {
        if tokio::time::Instant::now() >= self.deadline {
            return Ok(PollStatus::TimedOut);
        }

        let build = cluster
            .get_build(&self.name)
            .await?
            .ok_or_else(|| PollError::Vanished { name: self.name.clone() })?;

        self.log_transition(&build);

        Ok(match build.phase() {
            BuildPhase::Pending => PollStatus::Pending,
            BuildPhase::Building => PollStatus::Building,
            BuildPhase::Failed => PollStatus::Failed { message: build.status.message.clone() },
            BuildPhase::Completed => {
                if build.spec.serve_artifact && build.status.artifact_url.is_empty() {
                    // Completed but not yet downloadable; keep polling
                    // silently until the controller publishes the URL.
                    PollStatus::Building
                } else {
                    PollStatus::Completed
                }
            }
        })
    }

    /// Poll on a fixed interval until a terminal status.
    pub async fn wait_for_completion(
        &mut self,
        cluster: &dyn ClusterClient,
    ) -> Result<PollStatus, PollError> {
        loop {
            let status = self.step(cluster).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn log_transition(&mut self, build: &BuildResource) {
        let seen = (build.phase(), build.status.message.clone());
        if self.last_seen.as_ref() != Some(&seen) {
            tracing::info!(
                build = %self.name,
                phase = %seen.0,
                message = %seen.1,
                "build status"
            );
            self.last_seen = Some(seen);
        }
    }
}
