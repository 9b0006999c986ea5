//! `osforge list` and `osforge show`.

use clap::Args;

use crate::config::CliConfig;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Build to show.
    pub name: String,
}

pub async fn run_list(config: &CliConfig) -> anyhow::Result<()> {
    let client = config.client()?;
    let builds = client.list_builds().await?;
    if builds.is_empty() {
        println!("no builds");
        return Ok(());
    }

    println!("{:<32} {:<10} MESSAGE", "NAME", "PHASE");
    for b in builds {
        println!("{:<32} {:<10} {}", b.name, b.phase, b.message);
    }
    Ok(())
}

pub async fn run_show(config: &CliConfig, args: &ShowArgs) -> anyhow::Result<()> {
    let client = config.client()?;
    let b = client.get_build(&args.name).await?;

    println!("name:              {}", b.name);
    println!("phase:             {}", b.phase);
    println!("message:           {}", b.message);
    println!("uploads complete:  {}", b.uploads_complete);
    if !b.artifact_file_name.is_empty() {
        println!("artifact:          {}", b.artifact_file_name);
    }
    if !b.artifact_url.is_empty() {
        println!("artifact url:      {}", b.artifact_url);
    }
    if let Some(t) = b.started_at {
        println!("started:           {t}");
    }
    if let Some(t) = b.completed_at {
        println!("completed:         {t}");
    }
    Ok(())
}
