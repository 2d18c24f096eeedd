//! Common test utilities for agent integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ndrill_agent::DecisionOracle;
use ndrill_provider::{Message, ProviderError};
use ndrill_sandbox::{ExecutionResult, Sandbox, SandboxError};
use std::collections::{HashMap, VecDeque};
use std::process::Output;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Oracle that replays canned replies in order and records every transcript.
///
/// Once the script runs out it keeps answering `fallback`.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    pub transcripts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_fallback(replies, "{}")
    }

    pub fn with_fallback(replies: &[&str], fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            fallback: fallback.to_string(),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.transcripts.lock().unwrap().len()
    }

    pub fn transcript(&self, call: usize) -> Vec<Message> {
        self.transcripts.lock().unwrap()[call].clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn send(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        self.transcripts.lock().unwrap().push(transcript.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Oracle that never answers within a test's lifetime
pub struct StalledOracle;

#[async_trait]
impl DecisionOracle for StalledOracle {
    async fn send(&self, _transcript: &[Message]) -> Result<String, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("{}".to_string())
    }
}

/// In-memory sandbox recording every call.
///
/// Tools answer with the canned stdout registered for them, or an empty
/// successful result.
pub struct RecordingSandbox {
    pub runs: Mutex<Vec<(String, Vec<String>)>>,
    pub staged: Mutex<Vec<(String, String)>>,
    pub teardowns: AtomicUsize,
    outputs: Mutex<HashMap<String, String>>,
    running: AtomicBool,
    fail_provisioning: bool,
}

impl RecordingSandbox {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
            staged: Mutex::new(Vec::new()),
            teardowns: AtomicUsize::new(0),
            outputs: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            fail_provisioning: false,
        }
    }

    pub fn unprovisionable() -> Self {
        Self {
            fail_provisioning: true,
            ..Self::new()
        }
    }

    pub fn respond(self, tool: &str, stdout: &str) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(tool.to_string(), stdout.to_string());
        self
    }

    pub fn runs(&self) -> Vec<(String, Vec<String>)> {
        self.runs.lock().unwrap().clone()
    }

    pub fn ran(&self, tool: &str) -> bool {
        self.runs().iter().any(|(t, _)| t == tool)
    }

    pub fn teardown_count(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }
}

fn completed(stdout: &str) -> Output {
    #[cfg(unix)]
    use std::os::unix::process::ExitStatusExt;
    Output {
        status: std::process::ExitStatus::from_raw(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

#[async_trait]
impl Sandbox for RecordingSandbox {
    fn session_id(&self) -> &str {
        "ndrill-session-test"
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn ensure_ready(&self) -> ndrill_sandbox::Result<()> {
        if self.fail_provisioning {
            return Err(SandboxError::Provisioning {
                attempts: 2,
                reason: "runtime unavailable".to_string(),
            });
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn run(
        &self,
        tool: &str,
        args: &[String],
        _timeout: Duration,
    ) -> ndrill_sandbox::Result<ExecutionResult> {
        self.ensure_ready().await?;
        self.runs
            .lock()
            .unwrap()
            .push((tool.to_string(), args.to_vec()));
        let stdout = self
            .outputs
            .lock()
            .unwrap()
            .get(tool)
            .cloned()
            .unwrap_or_default();
        Ok(ExecutionResult::from_output(tool, &completed(&stdout)))
    }

    async fn stage_file(&self, content: &str, path: &str) -> bool {
        if self.ensure_ready().await.is_err() {
            return false;
        }
        self.staged
            .lock()
            .unwrap()
            .push((path.to_string(), content.to_string()));
        true
    }

    async fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
