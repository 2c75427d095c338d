use std::path::PathBuf;

use airsounds::publish::{in_ci, is_git_repo, publish_if_changed};
use airsounds::{AirsoundsConfig, GitPublisher, Orchestrator, PublishMode, SourceKind, SourceSelection, logging};
use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tracing::{error, info};

/// Fetch sounding and station forecasts into the airsounds data tree
#[derive(Debug, Parser)]
#[command(name = "airsounds")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Only refresh one source (default: all, in order noaa, ims, uwyo)
    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    /// Configuration file (default: ./airsounds.toml if present)
    #[arg(long, env = "AIRSOUNDS_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the data tree, overrides `storage.data_dir`
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// When to commit and push the modified files
    #[arg(long, value_enum)]
    publish: Option<PublishMode>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AirsoundsConfig::load_from_path(cli.config).context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir.display().to_string();
    }
    if let Some(mode) = cli.publish {
        config.publish.mode = mode;
    }

    logging::init(&config.logging, cli.verbose)?;
    info!("airsounds {} starting", airsounds::VERSION);

    let selection = SourceSelection::from(cli.source);
    let orchestrator = Orchestrator::from_config(&config)?;
    let report = orchestrator.run(selection).await.map_err(|e| {
        error!("{}", e.user_message());
        e
    })?;

    info!(
        "Fetched {} records, {} files modified",
        report.total_records(),
        report.modified.len()
    );

    if !config.publish.mode.enabled(in_ci()) {
        info!("Publishing disabled ({:?} mode)", config.publish.mode);
        return Ok(());
    }

    if report.modified.is_empty() {
        info!("No modified files, nothing to publish");
        return Ok(());
    }

    let repo_dir = PathBuf::from(&config.publish.repo_dir);
    if !is_git_repo(&repo_dir) {
        bail!("Cannot publish: {} is not a git work tree", repo_dir.display());
    }
    let outcome = publish_if_changed(&GitPublisher::new(&config.publish), &report.modified)
        .context("Failed to publish changes")?;
    info!("Publish outcome: {:?}", outcome);
    Ok(())
}
