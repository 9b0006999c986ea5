//! Wire types for the gateway API.
//!
//! Mirrors the gateway's request and response bodies. Kept separate from
//! the resource model in osforge-core: these are the HTTP contract, not
//! the cluster state.

use chrono::{DateTime, Utc};
use osforge_core::Compression;
use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/builds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBuildRequest {
    pub name: String,
    pub distro: String,
    pub target: String,
    pub architecture: String,
    pub export_format: String,
    pub mode: String,
    #[serde(default)]
    pub builder_image: String,
    #[serde(default)]
    pub registry_auth_ref: String,
    pub manifest: String,
    pub manifest_file_name: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub override_args: Vec<String>,
    #[serde(default)]
    pub compression: Compression,
    #[serde(default)]
    pub serve_artifact: bool,
    #[serde(default)]
    pub needs_upload_unit: bool,
    #[serde(default)]
    pub expiry_hours: Option<u32>,
}

/// Response for an accepted build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBuildResponse {
    pub name: String,
    pub phase: String,
    pub message: String,
}

/// One entry in `GET /v1/builds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub name: String,
    pub phase: String,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Full status from `GET /v1/builds/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildDetail {
    pub name: String,
    pub phase: String,
    pub message: String,
    #[serde(default)]
    pub artifact_file_name: String,
    #[serde(default)]
    pub artifact_url: String,
    #[serde(default)]
    pub uploads_complete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildDetail {
    pub fn is_completed(&self) -> bool {
        self.phase == "Completed"
    }

    pub fn is_failed(&self) -> bool {
        self.phase == "Failed"
    }
}

/// Response from `POST /v1/builds/{name}/uploads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub uploaded: usize,
}

/// Structured error body returned by the gateway.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
