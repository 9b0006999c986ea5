//! Integration tests for the gateway.
//!
//! Exercises the full router against an in-memory cluster and a local
//! sandbox channel: build CRUD, validation mapping, auth middleware,
//! multipart uploads, log streaming, and artifact streaming.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flate2::read::GzDecoder;
use http_body_util::BodyExt;
use osforge_api::auth::StaticTokenVerifier;
use osforge_api::AppState;
use osforge_core::{BuildPhase, BuildResource};
use osforge_remote::cluster::UnitInfo;
use osforge_remote::{ClusterClient, LocalChannel, MemoryCluster};
use tower::ServiceExt;

struct Harness {
    cluster: Arc<MemoryCluster>,
    channel: LocalChannel,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            cluster: Arc::new(MemoryCluster::new()),
            channel: LocalChannel::new(dir.path()),
            _dir: dir,
        }
    }

    fn state(&self) -> AppState {
        let mut state = AppState::new(
            self.cluster.clone(),
            Arc::new(self.channel.clone()),
            "builds",
        );
        // Tight readiness window so not-ready paths fail fast.
        state.upload_ready_window = (Duration::from_millis(20), Duration::from_millis(100));
        state
    }

    fn app(&self) -> axum::Router {
        osforge_api::app(self.state())
    }

    fn app_with_token(&self, token: &str) -> axum::Router {
        osforge_api::app(self.state().with_verifier(Arc::new(StaticTokenVerifier::new(token))))
    }
}

async fn body_string(response: axum::http::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn create_body(name: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "distro": "autosd",
        "target": "qemu",
        "architecture": "aarch64",
        "export_format": "image",
        "mode": "package",
        "manifest": "image:\n  name: test\n",
        "extra_args": ["ARCH=aarch64"],
        "override_args": ["DISTRO=autosd9"],
    })
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// -- Health Probes ------------------------------------------------------------

#[tokio::test]
async fn liveness_probe() {
    let h = Harness::new();
    let response = h.app().oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "ok");
}

#[tokio::test]
async fn readiness_probe_is_unauthenticated() {
    let h = Harness::new();
    let app = h.app_with_token("secret");
    let response = app.oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Build CRUD ---------------------------------------------------------------

#[tokio::test]
async fn create_build_is_accepted() {
    let h = Harness::new();
    let response = h
        .app()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let json = body_json(response).await;
    assert_eq!(json["name"], "b1");
    assert_eq!(json["phase"], "Building");

    let stored = h.cluster.get_build("b1").await.unwrap().unwrap();
    assert_eq!(stored.spec.distro, "autosd");
    assert_eq!(stored.spec.manifest_ref, "b1-manifest");
    assert_eq!(stored.namespace, "builds");
}

#[tokio::test]
async fn create_build_with_blank_field_is_400() {
    let h = Harness::new();
    let mut body = create_body("b1");
    body["distro"] = serde_json::json!("   ");
    let response = h.app().oneshot(post_json("/v1/builds", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn create_build_with_bad_name_is_400() {
    let h = Harness::new();
    let response = h
        .app()
        .oneshot(post_json("/v1/builds", &create_body("Not-Valid")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_build_with_malformed_define_is_400() {
    let h = Harness::new();
    let mut body = create_body("b1");
    body["extra_args"] = serde_json::json!(["no-equals"]);
    let response = h.app().oneshot(post_json("/v1/builds", &body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    // Nothing created on the cluster.
    assert!(h.cluster.get_build("b1").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_build_name_is_409() {
    let h = Harness::new();
    let app = h.app();
    let first = app
        .clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let json = body_json(second).await;
    assert_eq!(json["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn get_missing_build_is_404() {
    let h = Harness::new();
    let response = h.app().oneshot(get("/v1/builds/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_reports_phase_and_message() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    h.cluster.update_build("b1", |b| {
        b.status.phase = Some(BuildPhase::Building);
        b.status.message = "stage 2/5".into();
    });

    let response = app.oneshot(get("/v1/builds")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["name"], "b1");
    assert_eq!(json[0]["phase"], "Building");
    assert_eq!(json[0]["message"], "stage 2/5");
}

#[tokio::test]
async fn template_rehydrates_request() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();

    let response = app.oneshot(get("/v1/builds/b1/template")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["manifest"], "image:\n  name: test\n");
    assert_eq!(json["manifest_file_name"], "manifest.aib.yml");
    assert_eq!(json["extra_args"][0]["key"], "ARCH");
    assert_eq!(json["extra_args"][0]["value"], "aarch64");
    assert_eq!(json["override_args"][0]["key"], "DISTRO");
}

#[tokio::test]
async fn delete_build_waits_and_returns_204() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/v1/builds/b1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.oneshot(get("/v1/builds/b1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Authentication -----------------------------------------------------------

#[tokio::test]
async fn missing_token_is_401() {
    let h = Harness::new();
    let response = h
        .app_with_token("secret")
        .oneshot(get("/v1/builds"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_token_is_401() {
    let h = Harness::new();
    let response = h
        .app_with_token("secret")
        .oneshot(
            Request::builder()
                .uri("/v1/builds")
                .header("authorization", "Bearer guess")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_is_accepted() {
    let h = Harness::new();
    let response = h
        .app_with_token("secret")
        .oneshot(
            Request::builder()
                .uri("/v1/builds")
                .header("authorization", "Bearer secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// -- Uploads ------------------------------------------------------------------

fn multipart_request(uri: &str, parts: &[(&str, &[u8])]) -> Request<Body> {
    let boundary = "osforge-test-boundary";
    let mut body = Vec::new();
    for (file_name, content) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

fn upload_unit(h: &Harness, build: &str) {
    h.cluster.insert_unit(
        &osforge_build::upload_selector(build),
        UnitInfo { name: "upload-0".into(), ready: true },
    );
}

#[tokio::test]
async fn upload_lands_files_in_unit_storage() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    upload_unit(&h, "b1");

    let response = app
        .oneshot(multipart_request(
            "/v1/builds/b1/uploads",
            &[("cfg.yml", b"a: 1\n"), ("seed.img", b"\x00\x01\x02")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["uploaded"], 2);

    let sandbox = h.channel.sandbox("upload-0");
    assert_eq!(std::fs::read(sandbox.join("workspace/cfg.yml")).unwrap(), b"a: 1\n");
    assert_eq!(std::fs::read(sandbox.join("workspace/seed.img")).unwrap(), b"\x00\x01\x02");

    let stored = h.cluster.get_build("b1").await.unwrap().unwrap();
    assert!(stored.status.uploads_complete);
}

#[tokio::test]
async fn upload_stages_multi_chunk_part_intact() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    upload_unit(&h, "b1");

    // Large enough to arrive at the handler in several body chunks.
    let payload: Vec<u8> = (0..800_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let response = app
        .oneshot(multipart_request("/v1/builds/b1/uploads", &[("rootfs.img", payload.as_slice())]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sandbox = h.channel.sandbox("upload-0");
    assert_eq!(std::fs::read(sandbox.join("workspace/rootfs.img")).unwrap(), payload);
}

#[tokio::test]
async fn upload_before_unit_ready_is_503() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();

    let response = app
        .oneshot(multipart_request("/v1/builds/b1/uploads", &[("cfg.yml", b"a: 1\n")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_READY");
}

#[tokio::test]
async fn upload_to_missing_build_is_404() {
    let h = Harness::new();
    let response = h
        .app()
        .oneshot(multipart_request("/v1/builds/ghost/uploads", &[("f", b"x")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// -- Logs ---------------------------------------------------------------------

#[tokio::test]
async fn logs_stream_with_section_headers_in_step_order() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    h.cluster.push_log("b1", "prepare", b"fetching inputs\n");
    h.cluster.push_log("b1", "build", b"stage 1\nstage 2\n");

    let response = app.oneshot(get("/v1/builds/b1/logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    let prepare = text.find("==== prepare ====").unwrap();
    let build = text.find("==== build ====").unwrap();
    assert!(prepare < build);
    assert!(text.contains("fetching inputs"));
    assert!(text.contains("stage 2"));
}

#[tokio::test]
async fn logs_before_any_output_is_503() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();

    let response = app.oneshot(get("/v1/builds/b1/logs")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// -- Artifact -----------------------------------------------------------------

fn artifact_unit(h: &Harness, build: &str) {
    h.cluster.insert_unit(
        &osforge_build::artifact_selector(build),
        UnitInfo { name: "artifact-0".into(), ready: true },
    );
}

fn complete_with_artifact(h: &Harness, build: &BuildResource, payload: &[u8]) {
    let sandbox = h.channel.sandbox("artifact-0");
    std::fs::create_dir_all(sandbox.join("out")).unwrap();
    std::fs::write(sandbox.join("out/disk.img"), payload).unwrap();
    h.cluster.update_build(&build.name, |b| {
        b.status.phase = Some(BuildPhase::Completed);
        b.status.artifact_path = "out/disk.img".into();
        b.status.artifact_file_name = "disk.img".into();
    });
}

#[tokio::test]
async fn artifact_before_completion_is_409() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    h.cluster.update_build("b1", |b| b.status.phase = Some(BuildPhase::Building));

    let response = app.oneshot(get("/v1/builds/b1/artifact")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn artifact_streams_compressed_content() {
    let h = Harness::new();
    let app = h.app();
    app.clone()
        .oneshot(post_json("/v1/builds", &create_body("b1")))
        .await
        .unwrap();
    artifact_unit(&h, "b1");

    let payload: Vec<u8> = (0..30_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let build = h.cluster.get_build("b1").await.unwrap().unwrap();
    complete_with_artifact(&h, &build, &payload);

    let response = app.oneshot(get("/v1/builds/b1/artifact")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/gzip"
    );
    assert_eq!(
        response.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"disk.img.gz\""
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let mut decoded = Vec::new();
    GzDecoder::new(bytes.as_ref()).read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, payload);
}

// -- Full flow ----------------------------------------------------------------

#[tokio::test]
async fn build_lifecycle_end_to_end() {
    let h = Harness::new();
    let app = h.app();

    // Accept the build.
    let response = app
        .clone()
        .oneshot(post_json("/v1/builds", &create_body("e2e")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Push an input file once the upload unit is up.
    upload_unit(&h, "e2e");
    let response = app
        .clone()
        .oneshot(multipart_request(
            "/v1/builds/e2e/uploads",
            &[("seed.yml", b"seed: true\n")],
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Controller walks the build through its phases.
    h.cluster.update_build("e2e", |b| {
        b.status.phase = Some(BuildPhase::Building);
        b.status.message = "running stages".into();
    });
    let response = app.clone().oneshot(get("/v1/builds/e2e")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["phase"], "Building");
    assert_eq!(json["uploads_complete"], true);

    // Completion publishes the artifact; the stream decodes to the
    // fixture bytes.
    artifact_unit(&h, "e2e");
    let payload = b"pretend this is a disk image".to_vec();
    let build = h.cluster.get_build("e2e").await.unwrap().unwrap();
    complete_with_artifact(&h, &build, &payload);

    let response = app.oneshot(get("/v1/builds/e2e/artifact")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    // gzip magic before decoding.
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    let mut decoded = Vec::new();
    GzDecoder::new(bytes.as_ref()).read_to_end(&mut decoded).unwrap();
    assert_eq!(decoded, payload);
}
