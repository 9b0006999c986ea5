//! Typed gateway client.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::types::{
    BuildDetail, BuildSummary, CreateBuildRequest, CreateBuildResponse, ErrorBody, UploadResponse,
};

/// Default per-request timeout. Uploads and downloads stream and are
/// exempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between polls in [`GatewayClient::wait_ready`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// HTTP client for the gateway API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    /// Build a client for `base_url`, attaching `token` as a bearer
    /// header on every request when present.
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, ClientError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid base URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported URL scheme {:?}",
                parsed.scheme()
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::Config("token contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The underlying reqwest client, sharing auth headers and pools.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Absolute URL of a build's artifact endpoint.
    pub fn artifact_url(&self, name: &str) -> String {
        self.url(&format!("/v1/builds/{name}/artifact"))
    }

    pub async fn create_build(
        &self,
        request: &CreateBuildRequest,
    ) -> Result<CreateBuildResponse, ClientError> {
        let endpoint = self.url("/v1/builds");
        let response = self
            .client
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|source| ClientError::Http { endpoint: endpoint.clone(), source })?;
        read_json(&endpoint, response).await
    }

    pub async fn get_build(&self, name: &str) -> Result<BuildDetail, ClientError> {
        let endpoint = self.url(&format!("/v1/builds/{name}"));
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| ClientError::Http { endpoint: endpoint.clone(), source })?;
        read_json(&endpoint, response).await
    }

    pub async fn list_builds(&self) -> Result<Vec<BuildSummary>, ClientError> {
        let endpoint = self.url("/v1/builds");
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .map_err(|source| ClientError::Http { endpoint: endpoint.clone(), source })?;
        read_json(&endpoint, response).await
    }

    pub async fn delete_build(&self, name: &str) -> Result<(), ClientError> {
        let endpoint = self.url(&format!("/v1/builds/{name}"));
        let response = self
            .client
            .delete(&endpoint)
            .send()
            .await
            .map_err(|source| ClientError::Http { endpoint: endpoint.clone(), source })?;
        expect_success(&endpoint, response).await.map(|_| ())
    }

    /// Upload one local file as a multipart part named after `dest_name`.
    pub async fn upload_file(
        &self,
        name: &str,
        dest_name: &str,
        path: &Path,
    ) -> Result<UploadResponse, ClientError> {
        let endpoint = self.url(&format!("/v1/builds/{name}/uploads"));
        // The file streams through; it is never buffered whole.
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));
        let part = reqwest::multipart::Part::stream_with_length(body, length)
            .file_name(dest_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ClientError::Http { endpoint: endpoint.clone(), source })?;
        read_json(&endpoint, response).await
    }

    /// Poll until the build reaches a terminal phase, at a fixed
    /// interval, bounded by `timeout`.
    pub async fn wait_ready(&self, name: &str, timeout: Duration) -> Result<BuildDetail, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let detail = self.get_build(name).await?;
            if detail.is_completed() || detail.is_failed() {
                return Ok(detail);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::WaitTimeout { name: name.into() });
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

/// Turn a non-2xx response into [`ClientError::Api`], preferring the
/// structured error body's message.
async fn expect_success(endpoint: &str, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);
    Err(ClientError::Api { endpoint: endpoint.to_string(), status: status.as_u16(), message })
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T, ClientError> {
    let response = expect_success(endpoint, response).await?;
    response
        .json()
        .await
        .map_err(|source| ClientError::Deserialization { endpoint: endpoint.to_string(), source })
}
