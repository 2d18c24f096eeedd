//! Assessment orchestrator
//!
//! Drives the fixed phase sequence (reconnaissance, service discovery,
//! repeated exploitation cycles) and always finishes through finalization:
//! sandbox teardown, then the report artifact.

use chrono::Local;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ndrill_config::{AssessmentConfig, Config};
use ndrill_knowledge::{write_report, ExploitAttempt, KnowledgeBase, RunOutcome};
use ndrill_provider::Message;
use ndrill_sandbox::{Sandbox, SandboxError};

use crate::decision::Decision;
use crate::exploit::{ExploitAgent, ExploitReply};
use crate::oracle::DecisionOracle;
use crate::prompts;
use crate::protocol::DecisionProtocol;
use crate::recon::ReconAgent;
use crate::scanner::ScannerAgent;
use crate::syntax::check_python_syntax;
use crate::verdict::{classify, failure_feedback, AttemptBudget, Verdict};
use crate::Result;

const STAGING_FAILED: &str = "Error: Failed to write script to sandbox.";

/// Current stage of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Reconnaissance,
    ServiceDiscovery,
    ExploitationCycle(u32),
    Finalization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Pending => write!(f, "PENDING"),
            Phase::Reconnaissance => write!(f, "RECONNAISSANCE"),
            Phase::ServiceDiscovery => write!(f, "SERVICE DISCOVERY"),
            Phase::ExploitationCycle(n) => write!(f, "EXPLOITATION CYCLE {}", n),
            Phase::Finalization => write!(f, "FINALIZATION"),
        }
    }
}

/// Terminal result of a run
#[derive(Debug, Clone)]
pub struct Assessment {
    pub outcome: RunOutcome,
    /// Absent only when the report could not be written
    pub report: Option<PathBuf>,
}

/// Owns the knowledge base and the sandbox lifecycle of one run
pub struct Orchestrator {
    target: String,
    config: AssessmentConfig,
    command_timeout: Duration,
    report_dir: PathBuf,
    sandbox: Arc<dyn Sandbox>,
    recon: ReconAgent,
    scanner: ScannerAgent,
    exploit: ExploitAgent,
    kb: KnowledgeBase,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(
        target: impl Into<String>,
        mission: impl Into<String>,
        config: &Config,
        oracle: Arc<dyn DecisionOracle>,
        sandbox: Arc<dyn Sandbox>,
    ) -> Self {
        let target = target.into();
        let mission = mission.into();
        let protocol = DecisionProtocol::new(oracle, config.assessment.decision_attempts);
        let command_timeout = config.sandbox.command_timeout();

        Self {
            recon: ReconAgent::new(protocol.clone(), mission.clone(), command_timeout),
            scanner: ScannerAgent::new(
                protocol.clone(),
                mission.clone(),
                &config.assessment,
                command_timeout,
            ),
            exploit: ExploitAgent::new(protocol, mission.clone()),
            kb: KnowledgeBase::new(target.clone(), mission),
            target,
            config: config.assessment.clone(),
            command_timeout,
            report_dir: config.report_dir(),
            sandbox,
            phase: Phase::Pending,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the assessment until a terminal condition, then finalize.
    ///
    /// Cancelling `cancel` stops the current phase at its next await point.
    /// Teardown and the report happen on every path.
    pub async fn run(&mut self, cancel: CancellationToken) -> Assessment {
        info!(
            "◆ ASSESSMENT STARTED: {} (SESSION {})",
            self.target,
            self.sandbox.session_id()
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => RunOutcome::Cancelled,
            result = self.drive() => match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("◆ FATAL ERROR: {}", e);
                    RunOutcome::Failed { reason: e.to_string() }
                }
            },
        };

        if outcome == RunOutcome::Cancelled {
            warn!("◆ INTERRUPTED DURING {}", self.phase);
        }
        self.finalize(outcome).await
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        self.phase = Phase::Reconnaissance;
        info!("◆ PHASE: {}", self.phase);
        let recon = self
            .recon
            .produce(&self.target, self.sandbox.as_ref())
            .await?;
        self.kb.record_recon(recon);

        self.phase = Phase::ServiceDiscovery;
        info!("◆ PHASE: {}", self.phase);
        self.service_discovery().await?;

        let mut cycle: u32 = 0;
        loop {
            cycle += 1;
            self.phase = Phase::ExploitationCycle(cycle);
            info!("◆ PHASE: {}", self.phase);

            if self.exploitation_cycle(cycle).await? {
                return Ok(RunOutcome::ObjectiveAchieved);
            }

            if let Some(max_cycles) = self.config.max_cycles {
                if cycle >= max_cycles {
                    warn!("◆ CYCLE LIMIT {} REACHED", max_cycles);
                    return Ok(RunOutcome::Exhausted { cycles: cycle });
                }
            }

            info!("◆ CYCLE {} EXHAUSTED, BACKING OFF", cycle);
            tokio::time::sleep(self.config.cycle_backoff()).await;
        }
    }

    async fn service_discovery(&mut self) -> std::result::Result<(), SandboxError> {
        let args = vec![
            "-sV".to_string(),
            "--open".to_string(),
            "-F".to_string(),
            discovery_host(&self.target),
        ];
        let result = self
            .sandbox
            .run("nmap", &args, self.command_timeout)
            .await?;
        self.kb.record_service_discovery(result.render());
        Ok(())
    }

    /// One scan pass plus the bounded exploitation loop. `true` when the
    /// objective was reached.
    async fn exploitation_cycle(&mut self, cycle: u32) -> std::result::Result<bool, SandboxError> {
        let context = json!({
            "target": self.target,
            "recon": self.kb.recon,
            "nmap": self.kb.service_discovery,
        });
        let report = self
            .scanner
            .produce(&self.target, &context, self.sandbox.as_ref())
            .await?;
        self.kb.push_scan_report(report.clone());

        let mut transcript =
            self.exploit
                .open_transcript(&self.target, &report, &self.kb.context_summary());
        let mut budget = AttemptBudget::new(self.config.exploit_attempts);

        while let Some(attempt) = budget.next() {
            info!(
                "◆ CYCLE {} ATTEMPT {}/{}",
                cycle, attempt, self.config.exploit_attempts
            );

            let (raw, decision) = match self.exploit.propose(&mut transcript).await {
                ExploitReply::Error { raw, message } => {
                    warn!("◆ EXPLOIT DECISION ERROR (ATTEMPT {}): {}", attempt, message);
                    if let Some(raw) = raw {
                        transcript.push(Message::assistant(raw));
                    }
                    transcript.push(Message::user(prompts::decision_error_feedback(&message)));
                    continue;
                }
                ExploitReply::Proposal { raw, decision } => (raw, decision),
            };

            let Some(script) = decision.exploit_script.clone() else {
                warn!("◆ NO PAYLOAD IN DECISION (ATTEMPT {})", attempt);
                transcript.push(Message::assistant(raw));
                transcript.push(Message::user(prompts::MISSING_SCRIPT_REMINDER));
                continue;
            };

            let (output, executed) = self
                .execute_payload(cycle, attempt, &decision, &script)
                .await?;

            // Rejected or unstaged payloads echo their own source; nothing to judge
            let verdict = if executed {
                classify(
                    decision.is_goal_achieved,
                    &output,
                    &self.config.success_markers,
                )
            } else {
                Verdict::NotAchieved
            };
            if verdict.is_achieved() {
                info!("◆ OBJECTIVE ACHIEVED ({:?})", verdict);
                self.kb.record_success(output);
                return Ok(true);
            }

            self.kb.record_failure(script, output.clone());
            transcript.push(Message::assistant(raw));
            transcript.push(Message::user(failure_feedback(
                &output,
                self.config.feedback_output_chars,
            )));
        }

        Ok(false)
    }

    /// Syntax-check, stage and run one payload. Returns the output text and
    /// whether the payload actually ran.
    async fn execute_payload(
        &mut self,
        cycle: u32,
        attempt: u32,
        decision: &Decision,
        script: &str,
    ) -> std::result::Result<(String, bool), SandboxError> {
        let (result, output) = match check_python_syntax(script) {
            Err(e) => {
                warn!("◆ PAYLOAD REJECTED BEFORE EXECUTION: {}", e);
                (None, e.to_string())
            }
            Ok(()) => {
                let path = payload_filename();
                if self.sandbox.stage_file(script, &path).await {
                    let result = self
                        .sandbox
                        .run("python3", &[path], self.command_timeout)
                        .await?;
                    let output = result.render();
                    (Some(result), output)
                } else {
                    warn!("◆ PAYLOAD STAGING FAILED");
                    (None, STAGING_FAILED.to_string())
                }
            }
        };

        let executed = result.is_some();
        self.kb.record_attempt(ExploitAttempt {
            cycle,
            attempt,
            rationale: decision.rationale.clone(),
            script: script.to_string(),
            result,
            output: output.clone(),
            at: Local::now(),
        });
        Ok((output, executed))
    }

    async fn finalize(&mut self, outcome: RunOutcome) -> Assessment {
        self.phase = Phase::Finalization;
        info!("◆ PHASE: {} ({})", self.phase, outcome);

        self.sandbox.teardown().await;

        let report = match write_report(&self.report_dir, &self.kb, &outcome).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("◆ REPORT NOT WRITTEN: {}", e);
                None
            }
        };

        Assessment { outcome, report }
    }
}

/// Host part of a URL target, or the target unchanged
pub fn discovery_host(target: &str) -> String {
    reqwest::Url::parse(target)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| target.to_string())
}

fn payload_filename() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("exploit_{}.py", &id[..6])
}
