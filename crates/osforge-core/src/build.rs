//! The declarative build resource and its lifecycle.
//!
//! A [`BuildResource`] represents one build attempt. It is created once,
//! mutated only by the external controller and by clients patching narrow
//! status fields, and never leaves a terminal phase. Re-running a build
//! under the same name requires deleting and recreating the resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::Compression;
use crate::define::DefineArg;
use crate::error::ValidationError;

/// Finite lifecycle phase of a build resource.
///
/// `Pending → Building → {Completed | Failed}`. The two terminal phases
/// are absorbing: once observed, no further transition occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildPhase {
    Pending,
    Building,
    Completed,
    Failed,
}

impl BuildPhase {
    /// Whether this phase is terminal (`Completed` or `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Building => "Building",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the original build request, kept on the spec so the
/// gateway can rehydrate it for "use as template" flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    /// Manifest file content as submitted.
    pub manifest: String,
    /// File name the manifest is written under inside the build unit.
    pub manifest_file_name: String,
    /// Raw `KEY=VALUE` extra tool arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Raw `KEY=VALUE` override tool arguments.
    #[serde(default)]
    pub override_args: Vec<String>,
}

impl RequestSnapshot {
    /// Re-parse the stored raw arguments into typed definitions.
    pub fn parsed_extra_args(&self) -> Result<Vec<DefineArg>, ValidationError> {
        self.extra_args.iter().map(|s| DefineArg::parse(s)).collect()
    }

    /// Re-parse the stored raw override arguments.
    pub fn parsed_override_args(&self) -> Result<Vec<DefineArg>, ValidationError> {
        self.override_args.iter().map(|s| DefineArg::parse(s)).collect()
    }
}

/// Desired state of a build, written once at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub distro: String,
    pub target: String,
    pub architecture: String,
    pub export_format: String,
    pub mode: String,
    /// Container image reference of the vendored image-builder tool.
    pub builder_image: String,
    /// Name of the secret holding registry pull credentials for the
    /// builder image, when the registry is private.
    #[serde(default)]
    pub registry_auth_ref: String,
    /// Name of the config resource holding the manifest.
    pub manifest_ref: String,
    /// Whether the pipeline must run an upload unit and wait for the
    /// uploads-complete marker before building.
    #[serde(default)]
    pub needs_upload_unit: bool,
    /// Whether the controller serves the finished artifact over a
    /// network endpoint (populates `BuildStatus::artifact_url`).
    #[serde(default)]
    pub serve_artifact: bool,
    /// Hours after completion at which the resource expires.
    #[serde(default)]
    pub expiry_hours: Option<u32>,
    /// Compression scheme requested for artifact downloads.
    #[serde(default)]
    pub compression: Compression,
    /// Original request snapshot for the template endpoint.
    #[serde(default)]
    pub request: RequestSnapshot,
}

/// Observed state of a build, mutated by the controller and by narrow
/// client patches (the uploads-complete marker).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub phase: Option<BuildPhase>,
    /// Human-readable status message, surfaced verbatim to users.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub artifact_file_name: String,
    #[serde(default)]
    pub artifact_path: String,
    /// URL the artifact is served from once the controller exposes it.
    #[serde(default)]
    pub artifact_url: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Identifier of the pipeline run owning this attempt.
    #[serde(default)]
    pub run_id: String,
    /// Set by the upload coordinator once every declared input file has
    /// been pushed. The only signal gating the build step.
    #[serde(default)]
    pub uploads_complete: bool,
}

/// One build attempt: identity, desired state, observed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildResource {
    pub name: String,
    pub namespace: String,
    pub spec: BuildSpec,
    #[serde(default)]
    pub status: BuildStatus,
}

impl BuildResource {
    /// Current phase, `Pending` when the controller has not reported yet.
    pub fn phase(&self) -> BuildPhase {
        self.status.phase.unwrap_or(BuildPhase::Pending)
    }

    /// Validate the identity and required spec fields of a new resource.
    pub fn validate_new(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        for (field, value) in [
            ("distro", &self.spec.distro),
            ("target", &self.spec.target),
            ("architecture", &self.spec.architecture),
            ("export_format", &self.spec.export_format),
            ("mode", &self.spec.mode),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::BlankField(field));
            }
        }
        Ok(())
    }
}

/// Validate a build name against cluster resource-name rules: non-empty,
/// at most 63 characters, lowercase alphanumerics and `-`, starting and
/// ending with an alphanumeric.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidName(name.into(), "empty"));
    }
    if name.len() > 63 {
        return Err(ValidationError::InvalidName(name.into(), "longer than 63 characters"));
    }
    let ok_char = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-';
    if !name.chars().all(ok_char) {
        return Err(ValidationError::InvalidName(
            name.into(),
            "must be lowercase alphanumerics and `-`",
        ));
    }
    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if first == '-' || last == '-' {
        return Err(ValidationError::InvalidName(
            name.into(),
            "must start and end with an alphanumeric",
        ));
    }
    Ok(())
}
