use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gone_cli::commands::{compact, report, track};
use gone_cli::period::Week;
use gone_cli::{Cli, Commands, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config =
        Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = cli.dir {
        config.data_dir = dir;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Commands::Track { display, stdin }) => {
            track::run(&config, display.as_deref(), stdin).await?;
        }
        None => track::run(&config, None, false).await?,
        Some(Commands::Report { json, last_week }) => {
            report::run(
                &mut std::io::stdout().lock(),
                &config,
                Week::from_flag(last_week),
                json,
                Utc::now(),
            )?;
        }
        Some(Commands::Compact { last_week }) => {
            compact::run(
                &mut std::io::stdout().lock(),
                &config,
                Week::from_flag(last_week),
                Local::now().date_naive(),
            )?;
        }
    }

    Ok(())
}
