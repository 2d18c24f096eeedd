//! nDrill command implementations

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ndrill_agent::{build_oracle, DecisionOracle, Orchestrator};
use ndrill_config::Config;
use ndrill_knowledge::RunOutcome;
use ndrill_sandbox::Sandbox;

/// Inputs of one assessment run
#[derive(Debug, Clone)]
pub struct AssessArgs {
    pub target: String,
    pub comment: String,
    pub model: Option<String>,
    pub credential: Option<String>,
    pub config: Option<PathBuf>,
}

async fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_required(path)
            .await
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::load().await.context("loading config"),
    }
}

/// Cancel `token` on the first Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("◆ INTERRUPT RECEIVED, WINDING DOWN");
            token.cancel();
        }
    });
}

/// Run a full assessment and return how it ended
pub async fn assess_command(args: AssessArgs) -> Result<RunOutcome> {
    let target = args.target.trim().to_string();
    if target.is_empty() {
        anyhow::bail!("target must not be empty");
    }

    let config = load_config(args.config.as_ref()).await?;
    let backend = config.select_backend(args.credential, args.model);

    println!("◆ nDrill Security Assessment");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Target:  {}", target);
    println!("Mission: {}", args.comment);
    println!("Oracle:  {}", backend.label());
    println!("Sandbox: {:?}", config.sandbox.backend);
    println!();

    let oracle: Arc<dyn DecisionOracle> = Arc::from(build_oracle(&backend, &config.oracle));
    let sandbox: Arc<dyn Sandbox> = Arc::from(ndrill_sandbox::from_config(&config.sandbox));
    info!("◆ SANDBOX SESSION {}", sandbox.session_id());

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut orchestrator = Orchestrator::new(&target, &args.comment, &config, oracle, sandbox);
    let assessment = orchestrator.run(cancel).await;

    println!();
    println!("◆ Result: {}", assessment.outcome);
    match &assessment.report {
        Some(path) => println!("◆ Report: {}", path.display()),
        None => println!("✗ Report could not be written"),
    }

    Ok(assessment.outcome)
}
