//! Reconnaissance agent

use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use ndrill_provider::Message;
use ndrill_sandbox::{Sandbox, SandboxError};

use crate::decision::{Decision, ToolInvocation};
use crate::prompts;
use crate::protocol::{AgentRole, DecisionProtocol};

/// Two rounds: pick one information-gathering command, then summarize its
/// output into a reconnaissance report.
pub struct ReconAgent {
    protocol: DecisionProtocol,
    mission: String,
    timeout: Duration,
}

impl ReconAgent {
    pub fn new(protocol: DecisionProtocol, mission: impl Into<String>, timeout: Duration) -> Self {
        Self {
            protocol,
            mission: mission.into(),
            timeout,
        }
    }

    /// Header probe. Its tool and its arguments each fill in for whatever
    /// the decision leaves out.
    pub fn fallback_probe(target: &str) -> ToolInvocation {
        ToolInvocation::new(
            "curl",
            vec!["-s".to_string(), "-I".to_string(), target.to_string()],
        )
    }

    /// Produce the reconnaissance report.
    ///
    /// Protocol failures are captured as `{"error": ...}`; only sandbox
    /// provisioning errors propagate.
    pub async fn produce(&self, target: &str, sandbox: &dyn Sandbox) -> Result<Value, SandboxError> {
        let mut transcript = prompts::recon_transcript(&self.mission, target);

        let reply = match self
            .protocol
            .request(AgentRole::Reconnaissance, &mut transcript)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("◆ RECON DECISION FAILED: {}", e);
                return Ok(json!({ "error": e.to_string() }));
            }
        };

        let decision = Decision::from_object(&reply.value);
        let invocation = with_defaults(decision, Self::fallback_probe(target));

        info!("◆ RECON RUNNING {}", invocation.command_line());
        let result = sandbox
            .run(&invocation.tool, &invocation.args, self.timeout)
            .await?;

        transcript.push(Message::assistant(
            serde_json::to_string(&reply.value).unwrap_or_default(),
        ));
        transcript.push(Message::user(prompts::recon_report_request(&result.render())));

        match self
            .protocol
            .request(AgentRole::Reconnaissance, &mut transcript)
            .await
        {
            Ok(report) => Ok(report.into_value()),
            Err(e) => {
                warn!("◆ RECON REPORT FAILED: {}", e);
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }
}

fn with_defaults(decision: Decision, probe: ToolInvocation) -> ToolInvocation {
    let tool = if decision.tool_name.is_empty() {
        probe.tool
    } else {
        decision.tool_name
    };
    let args = if decision.args.is_empty() {
        probe.args
    } else {
        decision.args
    };
    ToolInvocation::new(tool, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decision(value: Value) -> Decision {
        match value {
            Value::Object(map) => Decision::from_object(&map),
            _ => Decision::default(),
        }
    }

    #[test]
    fn test_defaults_fill_missing_parts_independently() {
        let probe = || ReconAgent::fallback_probe("http://t");

        let tool_only = with_defaults(decision(json!({"tool_name": "curl"})), probe());
        assert_eq!(tool_only.command_line(), "curl -s -I http://t");

        let args_only = with_defaults(decision(json!({"args": ["-v", "http://t"]})), probe());
        assert_eq!(args_only.command_line(), "curl -v http://t");

        let full = with_defaults(
            decision(json!({"tool_name": "whatweb", "args": "http://t"})),
            probe(),
        );
        assert_eq!(full, ToolInvocation::new("whatweb", vec!["http://t".to_string()]));
    }
}
