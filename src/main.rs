//! # casecheck CLI
//!
//! Runs the chunked quality stage over a generated case document.
//!
//! ## Usage
//!
//! ```bash
//! casecheck [--config ./casecheck.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `casecheck plan <doc>` | Show how the document would be chunked |
//! | `casecheck analyze <doc>` | Analyze the document and emit the merged issue list |
//! | `casecheck fix <doc> --analysis <file>` | Apply a saved issue list to the document |
//! | `casecheck check <doc>` | Analyze and correct in one run |
//!
//! Log verbosity follows `RUST_LOG` (default `casecheck=info`). Logs go to
//! stderr. Ctrl-C cancels an in-flight analysis.

use anyhow::Result;
use casecheck::check_cmd::{self, AnalyzeArgs};
use casecheck::config::{self, Config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// casecheck: chunked analysis and precision correction for large case
/// documents.
#[derive(Parser)]
#[command(
    name = "casecheck",
    about = "Chunked analysis and precision correction for large generated case documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, built-in defaults are used and the backend is disabled.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the document and print its chunk plan. Makes no backend calls.
    Plan {
        /// Document to plan (JSON).
        document: PathBuf,
    },

    /// Analyze the document chunk by chunk and emit the merged analysis.
    Analyze {
        document: PathBuf,

        /// Earlier coarse-grained analysis whose flagged areas are checked first.
        #[arg(long)]
        prior: Option<PathBuf>,

        /// Area to concentrate on. Repeatable.
        #[arg(long = "focus")]
        focus: Vec<String>,

        /// Write the analysis here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Apply a saved analysis to the document.
    Fix {
        document: PathBuf,

        /// Analysis produced by `analyze` (or raw backend output).
        #[arg(long)]
        analysis: PathBuf,

        /// Write the corrected document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Analyze and correct in one run.
    Check {
        document: PathBuf,

        #[arg(long)]
        prior: Option<PathBuf>,

        #[arg(long = "focus")]
        focus: Vec<String>,

        /// Write the corrected document here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write a JSON run report here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("casecheck=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let cfg = Config::default();
            config::validate(&cfg)?;
            Ok(cfg)
        }
    }
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(cli.config.as_ref())?;

    match cli.command {
        Commands::Plan { document } => {
            check_cmd::run_plan(&cfg, &document)?;
        }
        Commands::Analyze {
            document,
            prior,
            focus,
            output,
        } => {
            let cancel = cancel_on_ctrl_c();
            let args = AnalyzeArgs {
                document,
                prior,
                focus,
                output,
            };
            check_cmd::run_analyze(&cfg, &args, &cancel).await?;
        }
        Commands::Fix {
            document,
            analysis,
            output,
        } => {
            check_cmd::run_fix(&cfg, &document, &analysis, output.as_deref())?;
        }
        Commands::Check {
            document,
            prior,
            focus,
            output,
            report,
        } => {
            let cancel = cancel_on_ctrl_c();
            let args = AnalyzeArgs {
                document,
                prior,
                focus,
                output,
            };
            check_cmd::run_check(&cfg, &args, report.as_deref(), &cancel).await?;
        }
    }

    Ok(())
}
