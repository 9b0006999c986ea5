//! # osforge CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use osforge_cli::build::{run_build, BuildArgs};
use osforge_cli::config::CliConfig;
use osforge_cli::download::{run_download, DownloadArgs};
use osforge_cli::list::{run_list, run_show, ShowArgs};

/// osforge — cluster-built OS images from the command line.
#[derive(Parser, Debug)]
#[command(name = "osforge", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Gateway base URL (defaults to $OSFORGE_SERVER, then localhost).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Bearer token (defaults to $OSFORGE_TOKEN).
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a build, optionally waiting and downloading the artifact.
    Build(BuildArgs),

    /// Download a completed build's artifact.
    Download(DownloadArgs),

    /// List builds.
    List,

    /// Show one build's full status.
    Show(ShowArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = CliConfig::resolve(cli.server, cli.token);

    let result = match cli.command {
        Commands::Build(args) => run_build(&config, &args).await,
        Commands::Download(args) => run_download(&config, &args).await,
        Commands::List => run_list(&config).await,
        Commands::Show(args) => run_show(&config, &args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
