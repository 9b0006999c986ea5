//! Bearer-token authentication.
//!
//! Every `/v1` route requires a bearer token; health probes are mounted
//! outside the auth layer. Verification is behind the [`TokenVerifier`]
//! trait: a static shared secret compared in constant time, or a POST to
//! the cluster's identity review endpoint.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::AppState;

/// A bearer token held for comparison. Debug output never prints the
/// secret.
#[derive(Clone)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Constant-time equality against a presented token.
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl std::fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretToken(****)")
    }
}

/// Decides whether a presented bearer token is acceptable.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<(), AppError>;
}

/// Verifier against a single configured shared secret.
#[derive(Debug)]
pub struct StaticTokenVerifier {
    secret: SecretToken,
}

impl StaticTokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: SecretToken::new(secret) }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<(), AppError> {
        if self.secret.matches(token) {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid token".into()))
        }
    }
}

/// Verifier that delegates to the cluster's identity review endpoint.
pub struct IdentityServiceVerifier {
    client: reqwest::Client,
    endpoint: url::Url,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    authenticated: bool,
}

impl IdentityServiceVerifier {
    pub fn new(client: reqwest::Client, endpoint: url::Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl TokenVerifier for IdentityServiceVerifier {
    async fn verify(&self, token: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AppError::Remote(format!("identity review request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Unauthorized(format!(
                "identity review rejected the token ({})",
                response.status()
            )));
        }
        let review: ReviewResponse = response
            .json()
            .await
            .map_err(|e| AppError::Remote(format!("identity review response unreadable: {e}")))?;
        if review.authenticated {
            Ok(())
        } else {
            Err(AppError::Unauthorized("token not authenticated".into()))
        }
    }
}

/// Axum middleware enforcing bearer auth on the `/v1` surface. A state
/// without a configured verifier leaves the surface open (local mode).
pub async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(verifier) = &state.verifier else {
        return Ok(next.run(request).await);
    };

    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

    verifier.verify(token).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_accepts_matching_token() {
        let v = StaticTokenVerifier::new("s3cret");
        assert!(v.verify("s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn static_verifier_rejects_wrong_token() {
        let v = StaticTokenVerifier::new("s3cret");
        let err = v.verify("guess").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn secret_token_debug_is_redacted() {
        let t = SecretToken::new("s3cret");
        assert_eq!(format!("{t:?}"), "SecretToken(****)");
    }

    #[test]
    fn constant_time_compare_handles_length_mismatch() {
        let t = SecretToken::new("abc");
        assert!(!t.matches("abcd"));
        assert!(!t.matches(""));
        assert!(t.matches("abc"));
    }

    #[tokio::test]
    async fn identity_verifier_accepts_authenticated_review() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/review"))
            .and(body_json(serde_json::json!({ "token": "tok-1" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "authenticated": true })),
            )
            .mount(&server)
            .await;

        let endpoint = url::Url::parse(&format!("{}/review", server.uri())).unwrap();
        let v = IdentityServiceVerifier::new(reqwest::Client::new(), endpoint);
        assert!(v.verify("tok-1").await.is_ok());
    }

    #[tokio::test]
    async fn identity_verifier_rejects_unauthenticated_review() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/review"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "authenticated": false })),
            )
            .mount(&server)
            .await;

        let endpoint = url::Url::parse(&format!("{}/review", server.uri())).unwrap();
        let v = IdentityServiceVerifier::new(reqwest::Client::new(), endpoint);
        let err = v.verify("tok-1").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn identity_verifier_rejects_on_error_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let endpoint = url::Url::parse(&server.uri()).unwrap();
        let v = IdentityServiceVerifier::new(reqwest::Client::new(), endpoint);
        let err = v.verify("tok-1").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
