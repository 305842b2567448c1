mod cli;
mod config;
mod error;
mod gateway;
mod model;
mod orchestrator;
mod results;
mod runner;
mod storage;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;
mod wizard;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr in headless modes and to a file under the TUI, where
/// stderr would tear the alternate screen.
fn init_tracing(headless: bool, cfg: &config::WizardConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if headless {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        return Ok(());
    }

    let path = cfg.log_file.clone().unwrap_or_else(config::default_log_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.is_headless();
    let cfg = cli::build_config(&args)?;
    init_tracing(is_non_tui, &cfg)?;

    cli::run(args, cfg).await?;
    // Explicitly exit with code 0 on success, especially for non-TUI modes
    if is_non_tui {
        std::process::exit(0);
    }
    Ok(())
}
