//! `osforge build` — submit a build, optionally wait and download.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use osforge_client::{CreateBuildRequest, GatewayClient};
use osforge_core::DefineArg;

use crate::config::CliConfig;
use crate::download::fetch_artifact;

/// Interval between status polls while waiting for completion.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Longest a `--wait` will watch a build.
const WAIT_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Manifest file to build from.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Build name (cluster resource name rules apply).
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub distro: String,

    #[arg(long)]
    pub target: String,

    #[arg(long)]
    pub arch: String,

    #[arg(long)]
    pub export_format: String,

    #[arg(long, default_value = "image")]
    pub mode: String,

    /// Builder tool container image override.
    #[arg(long)]
    pub builder_image: Option<String>,

    /// `KEY=VALUE` definition passed to the builder tool. Repeatable.
    #[arg(long = "define", value_name = "KEY=VALUE")]
    pub defines: Vec<String>,

    /// Compression for artifact downloads.
    #[arg(long, default_value = "gzip")]
    pub compression: String,

    /// Watch the build until it reaches a terminal phase.
    #[arg(long)]
    pub wait: bool,

    /// Download the artifact once the build completes. Implies --wait.
    #[arg(long)]
    pub auto_download: bool,

    /// Directory downloads land in.
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,
}

pub async fn run_build(config: &CliConfig, args: &BuildArgs) -> anyhow::Result<()> {
    // Fail on malformed defines before the manifest is even read.
    DefineArg::parse_all(&args.defines).context("invalid --define")?;

    let manifest = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("reading manifest {}", args.manifest.display()))?;
    let manifest_file_name = args
        .manifest
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .unwrap_or_else(|| "manifest.aib.yml".to_string());

    let client = config.client()?;
    let request = CreateBuildRequest {
        name: args.name.clone(),
        distro: args.distro.clone(),
        target: args.target.clone(),
        architecture: args.arch.clone(),
        export_format: args.export_format.clone(),
        mode: args.mode.clone(),
        builder_image: args.builder_image.clone().unwrap_or_default(),
        registry_auth_ref: String::new(),
        manifest,
        manifest_file_name,
        extra_args: args.defines.clone(),
        override_args: Vec::new(),
        compression: parse_compression(&args.compression)?,
        serve_artifact: args.auto_download,
        needs_upload_unit: false,
        expiry_hours: None,
    };

    let accepted = client.create_build(&request).await?;
    println!("build {} accepted: {}", accepted.name, accepted.message);

    if args.wait || args.auto_download {
        let detail = watch(&client, &args.name).await?;
        if args.auto_download {
            fetch_artifact(&client, &detail, &args.output_dir).await?;
        }
    }
    Ok(())
}

/// Poll the build to a terminal phase, printing a status line on each
/// observed phase or message change.
pub async fn watch(
    client: &GatewayClient,
    name: &str,
) -> anyhow::Result<osforge_client::BuildDetail> {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    let mut last_seen: Option<(String, String)> = None;
    loop {
        let detail = client.get_build(name).await?;
        let seen = (detail.phase.clone(), detail.message.clone());
        if last_seen.as_ref() != Some(&seen) {
            if seen.1.is_empty() {
                println!("{name}: {}", seen.0);
            } else {
                println!("{name}: {} ({})", seen.0, seen.1);
            }
            last_seen = Some(seen);
        }

        if detail.is_failed() {
            bail!("build {name} failed: {}", detail.message);
        }
        if detail.is_completed() {
            return Ok(detail);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for build {name}");
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

pub fn parse_compression(raw: &str) -> anyhow::Result<osforge_core::Compression> {
    match raw {
        "gzip" => Ok(osforge_core::Compression::Gzip),
        "lz4" => Ok(osforge_core::Compression::Lz4),
        other => bail!("unsupported compression {other:?} (expected gzip or lz4)"),
    }
}
