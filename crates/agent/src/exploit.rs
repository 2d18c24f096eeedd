//! Exploitation agent
//!
//! Proposes one assessment script per call over a transcript the
//! orchestrator keeps extending with execution feedback.

use serde_json::Value;
use tracing::warn;

use ndrill_provider::Message;

use crate::decision::Decision;
use crate::prompts;
use crate::protocol::{AgentRole, DecisionProtocol};

/// Result of one proposal round
#[derive(Debug, Clone)]
pub enum ExploitReply {
    /// A parsed decision; it may still lack a script
    Proposal { raw: String, decision: Decision },
    /// The oracle failed or answered with an `error` field
    Error { raw: Option<String>, message: String },
}

pub struct ExploitAgent {
    protocol: DecisionProtocol,
    mission: String,
}

impl ExploitAgent {
    pub fn new(protocol: DecisionProtocol, mission: impl Into<String>) -> Self {
        Self {
            protocol,
            mission: mission.into(),
        }
    }

    /// Fresh transcript for one exploitation cycle
    pub fn open_transcript(&self, target: &str, scan_report: &Value, knowledge: &Value) -> Vec<Message> {
        prompts::exploit_transcript(&self.mission, target, scan_report, knowledge)
    }

    pub async fn propose(&self, transcript: &mut Vec<Message>) -> ExploitReply {
        match self
            .protocol
            .request(AgentRole::Exploitation, transcript)
            .await
        {
            Ok(reply) => {
                let decision = Decision::from_object(&reply.value);
                match decision.error.clone() {
                    Some(message) => ExploitReply::Error {
                        raw: Some(reply.raw),
                        message,
                    },
                    None => ExploitReply::Proposal {
                        raw: reply.raw,
                        decision,
                    },
                }
            }
            Err(e) => {
                warn!("◆ EXPLOIT DECISION FAILED: {}", e);
                ExploitReply::Error {
                    raw: None,
                    message: e.to_string(),
                }
            }
        }
    }
}
