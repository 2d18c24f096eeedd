//! nDrill - oracle-driven security assessment

use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{assess_command, AssessArgs};
use ndrill_knowledge::RunOutcome;

const DEFAULT_MISSION: &str = "Perform a security assessment of the target.";

/// nDrill - automated security assessment of a single target
#[derive(Parser)]
#[command(name = "ndrill")]
#[command(about = "◆ Oracle-driven security assessment orchestrator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Target URL or host
    #[arg(short, long)]
    target: String,

    /// Mission statement for the agents
    #[arg(short, long, default_value = DEFAULT_MISSION)]
    comment: String,

    /// Model identifier for the selected backend
    #[arg(short, long)]
    model: Option<String>,

    /// Remote API credential; selects the remote backend
    #[arg(long, visible_alias = "openrouter")]
    credential: Option<String>,

    /// Config file (defaults to ~/.ndrill/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let args = AssessArgs {
        target: cli.target,
        comment: cli.comment,
        model: cli.model,
        credential: cli.credential,
        config: cli.config,
    };

    match assess_command(args).await {
        Ok(RunOutcome::Failed { reason }) => {
            error!("Assessment failed: {}", reason);
            std::process::exit(1);
        }
        Ok(_) => {}
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
