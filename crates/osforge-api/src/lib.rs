//! # osforge-api — REST Gateway
//!
//! The HTTP surface over the build service. Route handlers hold no
//! business logic: they validate, delegate to osforge-build and
//! osforge-remote, and map domain errors to structured HTTP responses
//! via [`AppError`].
//!
//! ## API Surface
//!
//! | Route                              | Module                |
//! |------------------------------------|-----------------------|
//! | `POST   /v1/builds`                | [`routes::builds`]    |
//! | `GET    /v1/builds`                | [`routes::builds`]    |
//! | `GET    /v1/builds/{name}`         | [`routes::builds`]    |
//! | `GET    /v1/builds/{name}/template`| [`routes::builds`]    |
//! | `DELETE /v1/builds/{name}`         | [`routes::builds`]    |
//! | `POST   /v1/builds/{name}/uploads` | [`routes::uploads`]   |
//! | `GET    /v1/builds/{name}/logs`    | [`routes::logs`]      |
//! | `GET    /v1/builds/{name}/artifact`| [`routes::artifact`]  |
//! | `GET    /health/*`                 | unauthenticated       |

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Upload bodies may carry disk images; 1 GiB cap.
const UPLOAD_BODY_LIMIT: usize = 1024 * 1024 * 1024;

/// Assemble the application router.
///
/// Health probes are mounted outside the auth layer.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/builds", post(routes::builds::create).get(routes::builds::list))
        .route(
            "/v1/builds/:name",
            get(routes::builds::get_build).delete(routes::builds::delete_build),
        )
        .route("/v1/builds/:name/template", get(routes::builds::template))
        .route("/v1/builds/:name/uploads", post(routes::uploads::upload))
        .route("/v1/builds/:name/logs", get(routes::logs::logs))
        .route("/v1/builds/:name/artifact", get(routes::artifact::artifact))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .layer(from_fn_with_state(state.clone(), auth::require_auth))
        .with_state(state);

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    Router::new()
        .merge(unauthenticated)
        .merge(api)
        .layer(TraceLayer::new_for_http())
}

async fn liveness() -> &'static str {
    "ok"
}

async fn readiness() -> &'static str {
    "ready"
}
