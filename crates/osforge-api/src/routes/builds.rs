//! Build CRUD and the request-template endpoint.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use osforge_core::{BuildResource, BuildSpec, Compression, DefineArg, RequestSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// How long a delete waits for the resource to actually disappear.
/// Recreating a build under the same name races controller cleanup
/// unless deletion has been observed.
const DELETE_WAIT: Duration = Duration::from_secs(30);

fn default_manifest_file_name() -> String {
    "manifest.aib.yml".to_string()
}

/// Request body for `POST /v1/builds`.
#[derive(Debug, Clone, Deserialize, Serialize)]
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
    /// Manifest file content, submitted inline.
    pub manifest: String,
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,
    /// `KEY=VALUE` extra arguments for the builder tool.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// `KEY=VALUE` override arguments for the builder tool.
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

impl CreateBuildRequest {
    fn into_resource(self, namespace: &str) -> BuildResource {
        let manifest_ref = format!("{}-manifest", self.name);
        BuildResource {
            name: self.name,
            namespace: namespace.to_string(),
            spec: BuildSpec {
                distro: self.distro,
                target: self.target,
                architecture: self.architecture,
                export_format: self.export_format,
                mode: self.mode,
                builder_image: self.builder_image,
                registry_auth_ref: self.registry_auth_ref,
                manifest_ref,
                needs_upload_unit: self.needs_upload_unit,
                serve_artifact: self.serve_artifact,
                expiry_hours: self.expiry_hours,
                compression: self.compression,
                request: RequestSnapshot {
                    manifest: self.manifest,
                    manifest_file_name: self.manifest_file_name,
                    extra_args: self.extra_args,
                    override_args: self.override_args,
                },
            },
            ..BuildResource::default()
        }
    }
}

/// Response for an accepted build.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBuildResponse {
    pub name: String,
    pub phase: String,
    pub message: String,
}

/// One entry in the build list.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildSummary {
    pub name: String,
    pub phase: String,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Full build status.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildDetail {
    pub name: String,
    pub phase: String,
    pub message: String,
    pub artifact_file_name: String,
    pub artifact_url: String,
    pub uploads_complete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildDetail {
    fn from_resource(b: &BuildResource) -> Self {
        Self {
            name: b.name.clone(),
            phase: b.phase().as_str().to_string(),
            message: b.status.message.clone(),
            artifact_file_name: b.status.artifact_file_name.clone(),
            artifact_url: b.status.artifact_url.clone(),
            uploads_complete: b.status.uploads_complete,
            started_at: b.status.started_at,
            completed_at: b.status.completed_at,
        }
    }
}

/// A re-parsed `KEY=VALUE` argument in the template response.
#[derive(Debug, Serialize, Deserialize)]
pub struct DefineView {
    pub key: String,
    pub value: String,
}

impl From<DefineArg> for DefineView {
    fn from(d: DefineArg) -> Self {
        Self { key: d.key, value: d.value }
    }
}

/// Rehydrated original request for "use as template" flows.
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub name: String,
    pub distro: String,
    pub target: String,
    pub architecture: String,
    pub export_format: String,
    pub mode: String,
    pub manifest: String,
    pub manifest_file_name: String,
    pub extra_args: Vec<DefineView>,
    pub override_args: Vec<DefineView>,
    pub compression: Compression,
}

/// `POST /v1/builds`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateBuildRequest>,
) -> Result<(StatusCode, Json<CreateBuildResponse>), AppError> {
    if request.manifest.trim().is_empty() {
        return Err(AppError::Validation("manifest must not be blank".into()));
    }
    // Malformed KEY=VALUE arguments are rejected before the resource is
    // created; the template endpoint re-parses them later and must not
    // be able to fail on stored data.
    DefineArg::parse_all(&request.extra_args)?;
    DefineArg::parse_all(&request.override_args)?;

    let resource = request.into_resource(&state.namespace);
    resource.validate_new()?;

    let name = resource.name.clone();
    state.cluster.create_build(resource).await?;
    tracing::info!(build = %name, "build accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateBuildResponse {
            name,
            phase: "Building".into(),
            message: "build accepted".into(),
        }),
    ))
}

/// `GET /v1/builds`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<BuildSummary>>, AppError> {
    let builds = state.cluster.list_builds().await?;
    Ok(Json(
        builds
            .iter()
            .map(|b| BuildSummary {
                name: b.name.clone(),
                phase: b.phase().as_str().to_string(),
                message: b.status.message.clone(),
                started_at: b.status.started_at,
                completed_at: b.status.completed_at,
            })
            .collect(),
    ))
}

/// `GET /v1/builds/{name}`
pub async fn get_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BuildDetail>, AppError> {
    let build = fetch(&state, &name).await?;
    Ok(Json(BuildDetail::from_resource(&build)))
}

/// `GET /v1/builds/{name}/template`
pub async fn template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateResponse>, AppError> {
    let build = fetch(&state, &name).await?;
    let snapshot = &build.spec.request;

    // Stored arguments were validated at creation; a parse failure here
    // means the resource was edited out-of-band.
    let reparse = |r: Result<Vec<DefineArg>, _>| -> Result<Vec<DefineView>, AppError> {
        r.map(|args| args.into_iter().map(DefineView::from).collect())
            .map_err(|e: osforge_core::ValidationError| {
                AppError::Internal(format!("stored arguments corrupt: {e}"))
            })
    };

    Ok(Json(TemplateResponse {
        name: build.name.clone(),
        distro: build.spec.distro.clone(),
        target: build.spec.target.clone(),
        architecture: build.spec.architecture.clone(),
        export_format: build.spec.export_format.clone(),
        mode: build.spec.mode.clone(),
        manifest: snapshot.manifest.clone(),
        manifest_file_name: snapshot.manifest_file_name.clone(),
        extra_args: reparse(snapshot.parsed_extra_args())?,
        override_args: reparse(snapshot.parsed_override_args())?,
        compression: build.spec.compression,
    }))
}

/// `DELETE /v1/builds/{name}` — delete and wait until the deletion has
/// been observed, so the name is immediately reusable.
pub async fn delete_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.cluster.delete_build(&name).await?;
    state.cluster.wait_deleted(&name, DELETE_WAIT).await?;
    tracing::info!(build = %name, "build deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn fetch(state: &AppState, name: &str) -> Result<BuildResource, AppError> {
    state
        .cluster
        .get_build(name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("build {name:?} not found")))
}
