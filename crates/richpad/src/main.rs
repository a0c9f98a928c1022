mod script;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use richpad_history::HistoryConfig;

/// Replays a JSON edit script through the richpad undo/redo engine.
#[derive(Parser, Debug)]
#[command(name = "richpad", version, about)]
struct Cli {
    /// Edit script to replay.
    script: PathBuf,

    /// History config file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured undo depth.
    #[arg(long = "max-undo-depth")]
    max_undo_depth: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => HistoryConfig::load_or_default(path),
        None => HistoryConfig::default(),
    }
    .with_env_overrides();
    if let Some(depth) = cli.max_undo_depth {
        config.max_undo_depth = depth.max(1);
    }

    tracing::info!("Replaying {}", cli.script.display());
    let script = script::Script::load(&cli.script)?;
    let report = script::run(&script, config)?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}
