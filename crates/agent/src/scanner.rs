//! Scanning agent
//!
//! Iteratively picks vulnerability-scanning tools, runs them in the sandbox
//! and finally asks for a consolidated scan report.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use ndrill_config::AssessmentConfig;
use ndrill_knowledge::truncate_chars;
use ndrill_provider::Message;
use ndrill_sandbox::{Sandbox, SandboxError};

use crate::decision::Decision;
use crate::prompts;
use crate::protocol::{AgentRole, DecisionProtocol};

/// One executed scanning step, as shown back to the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStep {
    pub tool: String,
    pub args: Vec<String>,
    pub output: String,
}

pub struct ScannerAgent {
    protocol: DecisionProtocol,
    mission: String,
    max_iterations: u32,
    min_iterations: u32,
    history_output_chars: usize,
    timeout: Duration,
}

impl ScannerAgent {
    pub fn new(
        protocol: DecisionProtocol,
        mission: impl Into<String>,
        config: &AssessmentConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            protocol,
            mission: mission.into(),
            max_iterations: config.scan_iterations,
            min_iterations: config.min_scan_iterations,
            history_output_chars: config.history_output_chars,
            timeout,
        }
    }

    /// Run the scanning loop and return the final scan report.
    ///
    /// A satisfied decision only ends the loop once `min_iterations` tools
    /// have run; earlier, its tool is still run. Protocol failures end up in
    /// the report as `{"error": ...}`.
    pub async fn produce(
        &self,
        target: &str,
        context: &Value,
        sandbox: &dyn Sandbox,
    ) -> Result<Value, SandboxError> {
        let mut history: Vec<ScanStep> = Vec::new();
        let mut transcript: Vec<Message> = Vec::new();

        for iteration in 1..=self.max_iterations {
            info!("◆ SCANNER ITERATION {}/{}", iteration, self.max_iterations);
            transcript = prompts::scanner_transcript(&self.mission, target, context, &history);

            let reply = match self.protocol.request(AgentRole::Scanning, &mut transcript).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("◆ SCANNER DECISION FAILED: {}", e);
                    break;
                }
            };
            if reply.is_empty() {
                info!("◆ SCANNER RETURNED NO DECISION, STOPPING");
                break;
            }

            let decision = Decision::from_object(&reply.value);
            if decision.is_satisfied && history.len() as u32 >= self.min_iterations {
                info!("◆ SCANNER SATISFIED AT ITERATION {}", iteration);
                break;
            }

            let Some(invocation) = decision.invocation() else {
                info!("◆ SCANNER CHOSE NO TOOL, STOPPING");
                break;
            };
            let tool = invocation.tool.to_lowercase();

            info!("◆ SCANNER RUNNING {}", invocation.command_line());
            let result = sandbox.run(&tool, &invocation.args, self.timeout).await?;
            history.push(ScanStep {
                tool,
                args: invocation.args,
                output: truncate_chars(&result.render(), self.history_output_chars),
            });
        }

        if transcript.is_empty() {
            transcript = prompts::scanner_transcript(&self.mission, target, context, &history);
        }
        transcript.push(Message::user(prompts::scan_report_request(&history)));

        match self.protocol.request(AgentRole::Scanning, &mut transcript).await {
            Ok(reply) => Ok(reply.into_value()),
            Err(e) => {
                warn!("◆ SCAN REPORT FAILED: {}", e);
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }
}
