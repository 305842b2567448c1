use crate::config::{self, WizardConfig, API_KEY_ENV};
use crate::gateway::ComputationGateway;
use crate::model::{
    ClusteringMethod, InfoEvent, ProjectInputs, SessionReport, SolverType, WizardEvent,
};
use crate::orchestrator::{run_controller, ControllerOptions, UiCommand};
use crate::runner::SubprocessRunner;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "pricing-wizard",
    version,
    about = "Cluster-based price optimisation wizard with optional TUI"
)]
pub struct Cli {
    /// Config file (default: <config dir>/pricing-wizard/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Project name; also names the project folder
    #[arg(long)]
    pub project_name: Option<String>,

    /// Token handed to the pricing solver
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, value_enum)]
    pub clustering: Option<ClusteringMethod>,

    #[arg(long, value_enum)]
    pub solver: Option<SolverType>,

    /// Prices dataset (CSV)
    #[arg(long)]
    pub prices: Option<String>,

    /// Cross-elasticities dataset (CSV)
    #[arg(long)]
    pub elasticities: Option<String>,

    /// Program used to run the computation scripts
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Directory holding the computation scripts
    #[arg(long)]
    pub scripts_dir: Option<PathBuf>,

    /// Sampler reads requested from the solver
    #[arg(long)]
    pub num_reads: Option<u32>,

    /// Rows per page on the results table
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Kill a computation that runs longer than this (e.g. 10m)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Run the whole chain and print the JSON session report (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Run the whole chain and print a text summary (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Export the session report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export the result rows as CSV
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Log file for TUI mode
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Set up the project as soon as the TUI opens
    #[arg(long)]
    pub start: bool,
}

impl Cli {
    pub fn is_headless(&self) -> bool {
        self.json || self.text || !cfg!(feature = "tui")
    }
}

/// Merge the config file with command-line and environment overrides.
pub fn build_config(args: &Cli) -> Result<WizardConfig> {
    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(v) = args.interpreter.as_ref() {
        cfg.interpreter = v.clone();
    }
    if let Some(v) = args.scripts_dir.as_ref() {
        cfg.scripts_dir = v.clone();
    }
    if let Some(v) = args.num_reads {
        cfg.num_reads = v;
    }
    if let Some(v) = args.page_size {
        anyhow::ensure!(v > 0, "--page-size must be at least 1");
        cfg.page_size = v;
    }
    if let Some(v) = args.timeout {
        cfg.computation_timeout = Some(v.into());
    }
    if let Some(v) = args.log_file.as_ref() {
        cfg.log_file = Some(v.clone());
    }
    if let Some(v) = args.api_key.as_ref() {
        cfg.api_key = Some(v.clone());
    }
    Ok(cfg)
}

/// Stage-0 values taken from flags; the TUI lets the user fill in the rest.
pub fn seed_inputs(args: &Cli, cfg: &WizardConfig) -> ProjectInputs {
    ProjectInputs {
        project_name: args.project_name.clone().unwrap_or_default(),
        api_key: cfg.api_key.clone().unwrap_or_default(),
        clustering_method: args.clustering,
        solver_type: args.solver,
        prices_source: args.prices.clone().unwrap_or_default(),
        elasticities_source: args.elasticities.clone().unwrap_or_default(),
    }
}

pub async fn run(args: Cli, cfg: WizardConfig) -> Result<()> {
    if !args.is_headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args, cfg).await;
        }
    }
    run_headless(args, cfg).await
}

/// Drive the full chain without a UI and print the outcome.
async fn run_headless(args: Cli, cfg: WizardConfig) -> Result<()> {
    let seed = seed_inputs(&args, &cfg);
    let missing = seed.missing();
    if !missing.is_empty() {
        anyhow::bail!(
            "missing inputs for a headless run: {} (see --help)",
            missing.join(", ")
        );
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<WizardEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let gateway = Arc::new(ComputationGateway::new(Arc::new(SubprocessRunner), &cfg));
    let options = ControllerOptions {
        auto_start: true,
        browse_clusters: false,
        num_reads: cfg.num_reads,
    };
    let controller = tokio::spawn(run_controller(gateway, seed, options, event_tx, cmd_rx));

    let progress = |msg: String| {
        if args.text {
            let _ = out_tx.send(OutputLine::Stderr(msg));
        }
    };

    let mut outcome: Result<SessionReport> = Err(anyhow::anyhow!("session ended before results"));
    while let Some(ev) = event_rx.recv().await {
        match ev {
            WizardEvent::ResultsReady(report) => {
                outcome = Ok(*report);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            WizardEvent::Failed(failure) => {
                outcome = Err(anyhow::anyhow!(
                    "{} stage failed: {}",
                    failure.stage.label(),
                    failure.error
                ));
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            WizardEvent::Info(InfoEvent::Rejected(reason)) => {
                outcome = Err(anyhow::anyhow!("{reason}"));
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            WizardEvent::Info(info) => progress(info.to_message()),
            WizardEvent::ClustersDiscovered { count } => progress(format!("{count} clusters")),
            WizardEvent::StateChanged(_) | WizardEvent::ClusterLoaded(_) => {}
        }
    }
    controller.await.context("controller task failed")??;

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };

    handle_exports(&args, &report)?;
    if args.json {
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&report, cfg.page_size);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

/// Handle export operations (JSON and CSV) for both text and JSON modes.
fn handle_exports(args: &Cli, report: &SessionReport) -> Result<()> {
    if let Some(p) = args.export_json.as_deref() {
        crate::storage::export_json(p, report)?;
    }
    if let Some(p) = args.export_csv.as_deref() {
        crate::storage::export_csv(p, report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interpreter = \"python3\"\nnum_reads = 50\n").unwrap();
        let args = Cli::parse_from([
            "pricing-wizard",
            "--config",
            path.to_str().unwrap(),
            "--num-reads",
            "5",
            "--timeout",
            "90s",
            "--api-key",
            "tok",
        ]);
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.interpreter, "python3");
        assert_eq!(cfg.num_reads, 5);
        assert_eq!(cfg.computation_timeout, Some(Duration::from_secs(90)));
        assert_eq!(cfg.api_key.as_deref(), Some("tok"));
    }

    #[test]
    fn seed_uses_flag_values() {
        let args = Cli::parse_from([
            "pricing-wizard",
            "--project-name",
            "demo",
            "--clustering",
            "louvain-spectral",
            "--solver",
            "exact",
            "--prices",
            "p.csv",
        ]);
        let seed = seed_inputs(
            &args,
            &WizardConfig {
                api_key: Some("k".into()),
                ..Default::default()
            },
        );
        assert_eq!(seed.project_name, "demo");
        assert_eq!(seed.api_key, "k");
        assert_eq!(seed.clustering_method, Some(ClusteringMethod::LouvainSpectral));
        assert_eq!(seed.solver_type, Some(SolverType::Exact));
        assert_eq!(seed.missing(), vec!["elasticities file"]);
    }

    #[test]
    fn json_and_text_conflict() {
        assert!(Cli::try_parse_from(["pricing-wizard", "--json", "--text"]).is_err());
    }

    #[test]
    fn zero_page_size_flag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let args = Cli::parse_from([
            "pricing-wizard",
            "--config",
            path.to_str().unwrap(),
            "--page-size",
            "0",
        ]);
        assert!(build_config(&args).is_err());
    }
}
