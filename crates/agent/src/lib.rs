//! Assessment agents and orchestration
//!
//! Three role agents (reconnaissance, scanning, exploitation) talk to the
//! decision oracle through a self-repairing JSON protocol and act through the
//! sandbox. The orchestrator sequences them into a phased run.

use thiserror::Error;

pub mod decision;
pub mod exploit;
pub mod oracle;
pub mod orchestrator;
pub mod prompts;
pub mod protocol;
pub mod recon;
pub mod scanner;
pub mod syntax;
pub mod verdict;

pub use decision::{normalize_args, Decision, ToolInvocation};
pub use exploit::{ExploitAgent, ExploitReply};
pub use oracle::{build_oracle, DecisionOracle, ProviderOracle};
pub use orchestrator::{Assessment, Orchestrator, Phase};
pub use protocol::{AgentRole, DecisionProtocol, ExhaustionPolicy, Reply};
pub use recon::ReconAgent;
pub use scanner::ScannerAgent;
pub use syntax::{check_python_syntax, ScriptSyntaxError};
pub use verdict::{classify, AttemptBudget, Verdict};

use ndrill_knowledge::KnowledgeError;
use ndrill_provider::ProviderError;
use ndrill_sandbox::SandboxError;

/// Decision protocol errors
#[derive(Error, Debug)]
pub enum DecisionProtocolError {
    #[error("NO VALID DECISION AFTER {attempts} ATTEMPTS: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: String,
        raw: String,
    },

    #[error("ORACLE UNREACHABLE: {0}")]
    Oracle(#[from] ProviderError),
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{0}")]
    Protocol(#[from] DecisionProtocolError),

    #[error("{0}")]
    Sandbox(#[from] SandboxError),

    #[error("{0}")]
    Knowledge(#[from] KnowledgeError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
