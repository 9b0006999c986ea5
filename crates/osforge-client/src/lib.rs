//! # osforge-client — Gateway Client
//!
//! Typed HTTP client for the gateway API plus the retrying artifact
//! downloader used by the CLI. The client attaches bearer auth as a
//! default header and surfaces the gateway's structured error bodies;
//! the downloader applies the temp-file-then-rename discipline so a
//! partially downloaded artifact is never visible under its final name.

pub mod client;
pub mod download;
pub mod error;
pub mod types;

pub use client::GatewayClient;
pub use download::{DownloadError, RetryingDownloader};
pub use error::ClientError;
pub use types::{
    BuildDetail, BuildSummary, CreateBuildRequest, CreateBuildResponse, UploadResponse,
};
