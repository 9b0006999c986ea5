//! `osforge download` — fetch a completed build's artifact.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Args;
use osforge_client::{BuildDetail, GatewayClient, RetryingDownloader};

use crate::config::CliConfig;

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Build whose artifact to download.
    #[arg(long)]
    pub name: String,

    /// Directory the artifact lands in.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

pub async fn run_download(config: &CliConfig, args: &DownloadArgs) -> anyhow::Result<()> {
    let client = config.client()?;
    let detail = client.get_build(&args.name).await?;
    if !detail.is_completed() {
        bail!(
            "build {} is {}, artifact available once Completed",
            args.name,
            detail.phase
        );
    }
    fetch_artifact(&client, &detail, &args.output_dir).await
}

/// Download a completed build's artifact into `output_dir`.
///
/// Prefers the controller-published URL when present, otherwise the
/// gateway's artifact endpoint.
pub async fn fetch_artifact(
    client: &GatewayClient,
    detail: &BuildDetail,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let url = if detail.artifact_url.is_empty() {
        client.artifact_url(&detail.name)
    } else {
        detail.artifact_url.clone()
    };
    let dest = output_dir.join(download_file_name(detail));

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let downloader = RetryingDownloader::new(client.http().clone());
    let size = downloader.download(&url, &dest).await?;
    println!("downloaded {} ({size} bytes)", dest.display());
    Ok(())
}

/// Local file name for the download. The served stream is compressed,
/// so the name carries the gzip extension unless the URL already names
/// a compressed file.
fn download_file_name(detail: &BuildDetail) -> String {
    let base = if detail.artifact_file_name.is_empty() {
        format!("{}-artifact", detail.name)
    } else {
        detail.artifact_file_name.clone()
    };
    if base.ends_with(".gz") || base.ends_with(".lz4") {
        base
    } else {
        format!("{base}.gz")
    }
}
