//! Sandboxed execution environment
//!
//! One long-lived, isolated session per assessment run. Commands run inside it
//! with a hard timeout; command failures come back as data, only provisioning
//! failures are errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

pub mod docker;
pub mod host;

pub use docker::DockerSandbox;
pub use host::HostSandbox;

use ndrill_config::{SandboxBackend, SandboxConfig};

/// Sandbox errors
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("SANDBOX PROVISIONING FAILED AFTER {attempts} ATTEMPTS: {reason}")]
    Provisioning { attempts: u32, reason: String },

    #[error("SANDBOX IO ERROR: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Why a command did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    NonZeroExit { code: i32 },
    Timeout { secs: u64 },
    Unavailable { reason: String },
}

/// Outcome of one command. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionResult {
    pub fn from_output(tool: impl Into<String>, output: &std::process::Output) -> Self {
        let code = output.status.code();
        let success = output.status.success();
        Self {
            tool: tool.into(),
            success,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: code,
            failure: if success {
                None
            } else {
                Some(ExecutionFailure::NonZeroExit {
                    code: code.unwrap_or(-1),
                })
            },
        }
    }

    pub fn timeout(tool: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            failure: Some(ExecutionFailure::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    pub fn unavailable(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            failure: Some(ExecutionFailure::Unavailable {
                reason: reason.into(),
            }),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.failure, Some(ExecutionFailure::Timeout { .. }))
    }

    /// Text handed to the oracle. Failures are rendered inline so they can be
    /// reasoned about like any other output.
    pub fn render(&self) -> String {
        match &self.failure {
            None => {
                let stdout = self.stdout.trim();
                if stdout.is_empty() {
                    self.stderr.trim().to_string()
                } else {
                    stdout.to_string()
                }
            }
            Some(ExecutionFailure::NonZeroExit { code }) => format!(
                "Error: Tool '{}' failed with code {}\nStdout: {}\nStderr: {}",
                self.tool, code, self.stdout, self.stderr
            ),
            Some(ExecutionFailure::Timeout { secs }) => format!(
                "Error: Tool '{}' timed out after {} seconds",
                self.tool, secs
            ),
            Some(ExecutionFailure::Unavailable { reason }) => format!("Error: {}", reason),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Isolated execution context bound to one run
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn session_id(&self) -> &str;
    fn is_running(&self) -> bool;

    /// Provision the session once; later calls are no-ops.
    async fn ensure_ready(&self) -> Result<()>;

    /// Run `tool` with `args`. Provisions implicitly; the only error is a
    /// provisioning failure.
    async fn run(&self, tool: &str, args: &[String], timeout: Duration) -> Result<ExecutionResult>;

    /// Write `content` to `path` inside the session.
    async fn stage_file(&self, content: &str, path: &str) -> bool;

    /// Destroy the session if running. Idempotent.
    async fn teardown(&self);
}

/// Build the configured sandbox backend
pub fn from_config(config: &SandboxConfig) -> Box<dyn Sandbox> {
    match config.backend {
        SandboxBackend::Docker => Box::new(DockerSandbox::new(config)),
        SandboxBackend::Host => Box::new(HostSandbox::new(ndrill_config::sandbox_dir())),
    }
}

/// Short random session suffix
pub(crate) fn session_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

pub(crate) enum CommandOutcome {
    Completed(std::process::Output),
    TimedOut,
    Failed(std::io::Error),
}

/// Spawn `cmd`, optionally feed `input` on stdin, and wait at most `timeout`.
///
/// Feeding stdin counts against the deadline. The child is killed when the
/// deadline passes.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    input: Option<&[u8]>,
    timeout: Duration,
) -> CommandOutcome {
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutcome::Failed(e),
    };

    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(bytes), Some(mut stdin)) = (input, stdin) {
            stdin.write_all(bytes).await?;
            // Dropping stdin signals EOF to the child
        }
        Ok::<(), std::io::Error>(())
    };
    let exchange = async move {
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        if let Err(e) = fed {
            warn!("◆ FAILED TO WRITE STDIN: {}", e);
            return Err(e);
        }
        output
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(output)) => CommandOutcome::Completed(output),
        Ok(Err(e)) => CommandOutcome::Failed(e),
        Err(_) => CommandOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(code: i32) -> ExecutionResult {
        ExecutionResult {
            tool: "nmap".to_string(),
            success: false,
            stdout: "partial".to_string(),
            stderr: "bad flag".to_string(),
            exit_code: Some(code),
            failure: Some(ExecutionFailure::NonZeroExit { code }),
        }
    }

    #[test]
    fn test_render_success_trims_stdout() {
        let result = ExecutionResult {
            tool: "curl".to_string(),
            success: true,
            stdout: "  HTTP/1.1 200 OK\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            failure: None,
        };
        assert_eq!(result.render(), "HTTP/1.1 200 OK");
    }

    #[test]
    fn test_render_success_falls_back_to_stderr() {
        let result = ExecutionResult {
            tool: "curl".to_string(),
            success: true,
            stdout: String::new(),
            stderr: "progress\n".to_string(),
            exit_code: Some(0),
            failure: None,
        };
        assert_eq!(result.render(), "progress");
    }

    #[test]
    fn test_render_non_zero_exit() {
        let text = failed(2).render();
        assert!(text.starts_with("Error: Tool 'nmap' failed with code 2"));
        assert!(text.contains("Stdout: partial"));
        assert!(text.contains("Stderr: bad flag"));
    }

    #[test]
    fn test_render_timeout() {
        let result = ExecutionResult::timeout("sqlmap", Duration::from_secs(600));
        assert!(result.is_timeout());
        assert!(!result.success);
        assert_eq!(
            result.to_string(),
            "Error: Tool 'sqlmap' timed out after 600 seconds"
        );
    }

    #[test]
    fn test_render_unavailable() {
        let result = ExecutionResult::unavailable("python3", "executable not found");
        assert_eq!(result.render(), "Error: executable not found");
    }

    #[test]
    fn test_failure_serialization() {
        let json = serde_json::to_value(ExecutionFailure::Timeout { secs: 5 }).unwrap();
        assert_eq!(json["kind"], "timeout");
        assert_eq!(json["secs"], 5);
    }

    #[test]
    fn test_session_suffix_is_hex() {
        let suffix = session_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_run_with_timeout_feeds_stdin() {
        let cmd = Command::new("cat");
        match run_with_timeout(cmd, Some(b"payload"), Duration::from_secs(5)).await {
            CommandOutcome::Completed(output) => {
                assert_eq!(String::from_utf8_lossy(&output.stdout), "payload")
            }
            _ => panic!("Expected completed command"),
        }
    }

    #[tokio::test]
    async fn test_run_with_timeout_bounds_stdin_writes() {
        // More than a pipe buffer, to a child that never reads it
        let payload = vec![b'x'; 1 << 20];
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let started = std::time::Instant::now();
        assert!(matches!(
            run_with_timeout(cmd, Some(&payload), Duration::from_millis(300)).await,
            CommandOutcome::TimedOut
        ));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_with_timeout_kills_slow_command() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        assert!(matches!(
            run_with_timeout(cmd, None, Duration::from_millis(200)).await,
            CommandOutcome::TimedOut
        ));
    }
}
