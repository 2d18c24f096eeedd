//! Container-backed sandbox session
//!
//! A detached container kept alive with `sleep infinity`, with every command
//! issued through `docker exec`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use ndrill_config::SandboxConfig;

use crate::{
    run_with_timeout, session_suffix, CommandOutcome, ExecutionFailure, ExecutionResult, Result,
    Sandbox, SandboxError,
};

const PROVISION_TIMEOUT: Duration = Duration::from_secs(300);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(60);
/// Extra host-side slack on top of the in-container deadline
const HOST_GRACE: Duration = Duration::from_secs(10);
/// coreutils `timeout` exit statuses: deadline hit, or killed after it
const TIMEOUT_EXIT_CODES: &[i32] = &[124, 137];

/// A timeout exit status only means the deadline fired if the deadline has
/// actually passed; 137 is also what an OOM kill looks like.
fn deadline_hit(code: i32, elapsed: Duration, timeout: Duration) -> bool {
    TIMEOUT_EXIT_CODES.contains(&code) && elapsed >= timeout
}

/// Docker (or compatible runtime) session
pub struct DockerSandbox {
    runtime: String,
    name: String,
    image: String,
    network: String,
    memory: String,
    cpus: String,
    workdir: String,
    provision_attempts: u32,
    running: AtomicBool,
    /// Set once `docker run` may have created the container
    provisioning_started: AtomicBool,
    lifecycle: Mutex<()>,
}

impl DockerSandbox {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            runtime: "docker".to_string(),
            name: format!("ndrill-session-{}", session_suffix()),
            image: config.image.clone(),
            network: config.network.clone(),
            memory: config.memory.clone(),
            cpus: config.cpus.clone(),
            workdir: config.workdir.clone(),
            provision_attempts: config.provision_attempts.max(1),
            running: AtomicBool::new(false),
            provisioning_started: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    /// Use a different container runtime binary, e.g. `podman`
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    fn run_args(&self) -> Vec<String> {
        [
            "run",
            "-d",
            "--name",
            self.name.as_str(),
            "--network",
            self.network.as_str(),
            "--memory",
            self.memory.as_str(),
            "--cpus",
            self.cpus.as_str(),
            "-w",
            self.workdir.as_str(),
            self.image.as_str(),
            "sleep",
            "infinity",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn exec_args(&self, tool: &str, args: &[String], timeout: Duration) -> Vec<String> {
        let mut argv: Vec<String> = vec![
            "exec".to_string(),
            self.name.clone(),
            "timeout".to_string(),
            "--kill-after=5s".to_string(),
            format!("{}s", timeout.as_secs().max(1)),
            tool.to_string(),
        ];
        argv.extend(args.iter().cloned());
        argv
    }

    fn stage_args(&self, path: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-i".to_string(),
            self.name.clone(),
            "sh".to_string(),
            "-c".to_string(),
            format!("cat > {}", shell_words::quote(path)),
        ]
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(args);
        cmd
    }

    async fn provision_once(&self) -> std::result::Result<(), String> {
        match run_with_timeout(self.command(&self.run_args()), None, PROVISION_TIMEOUT).await {
            CommandOutcome::Completed(output) if output.status.success() => Ok(()),
            CommandOutcome::Completed(output) => {
                Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
            }
            CommandOutcome::TimedOut => Err(format!(
                "container start exceeded {} seconds",
                PROVISION_TIMEOUT.as_secs()
            )),
            CommandOutcome::Failed(e) => Err(format!("{}: {}", self.runtime, e)),
        }
    }

    /// Whether a container may exist, possibly left over from a cancelled start
    fn may_exist(&self) -> bool {
        self.is_running() || self.provisioning_started.load(Ordering::SeqCst)
    }

    async fn remove_container(&self) -> bool {
        let args = vec!["rm".to_string(), "-f".to_string(), self.name.clone()];
        match run_with_timeout(self.command(&args), None, CONTROL_TIMEOUT).await {
            CommandOutcome::Completed(output) => output.status.success(),
            _ => false,
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn session_id(&self) -> &str {
        &self.name
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn ensure_ready(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_running() {
            return Ok(());
        }

        let mut last_error = String::new();
        self.provisioning_started.store(true, Ordering::SeqCst);
        for attempt in 1..=self.provision_attempts {
            info!(
                "◆ STARTING SESSION CONTAINER {} (ATTEMPT {}/{})",
                self.name, attempt, self.provision_attempts
            );
            match self.provision_once().await {
                Ok(()) => {
                    self.running.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    warn!("◆ CONTAINER START FAILED: {}", e);
                    // A half-created container would block the name on retry
                    self.remove_container().await;
                    last_error = e;
                }
            }
        }

        error!("◆ SANDBOX UNAVAILABLE: {}", last_error);
        Err(SandboxError::Provisioning {
            attempts: self.provision_attempts,
            reason: last_error,
        })
    }

    async fn run(&self, tool: &str, args: &[String], timeout: Duration) -> Result<ExecutionResult> {
        self.ensure_ready().await?;

        let argv = self.exec_args(tool, args, timeout);
        debug!("◆ EXEC: {} {}", self.runtime, argv.join(" "));

        let started = Instant::now();
        let result = match run_with_timeout(self.command(&argv), None, timeout + HOST_GRACE).await
        {
            CommandOutcome::Completed(output) => {
                let result = ExecutionResult::from_output(tool, &output);
                let timed_out = matches!(
                    &result.failure,
                    Some(ExecutionFailure::NonZeroExit { code })
                        if deadline_hit(*code, started.elapsed(), timeout)
                );
                if timed_out {
                    ExecutionResult::timeout(tool, timeout)
                } else {
                    result
                }
            }
            CommandOutcome::TimedOut => ExecutionResult::timeout(tool, timeout),
            CommandOutcome::Failed(e) => ExecutionResult::unavailable(tool, e.to_string()),
        };

        if result.is_timeout() {
            warn!("◆ {} TIMED OUT AFTER {}s", tool, timeout.as_secs());
        }
        Ok(result)
    }

    async fn stage_file(&self, content: &str, path: &str) -> bool {
        if let Err(e) = self.ensure_ready().await {
            warn!("◆ CANNOT STAGE {}: {}", path, e);
            return false;
        }

        let cmd = self.command(&self.stage_args(path));
        match run_with_timeout(cmd, Some(content.as_bytes()), CONTROL_TIMEOUT).await {
            CommandOutcome::Completed(output) if output.status.success() => true,
            CommandOutcome::Completed(output) => {
                warn!(
                    "◆ STAGING {} FAILED: {}",
                    path,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            CommandOutcome::TimedOut => {
                warn!("◆ STAGING {} TIMED OUT", path);
                false
            }
            CommandOutcome::Failed(e) => {
                warn!("◆ STAGING {} FAILED: {}", path, e);
                false
            }
        }
    }

    async fn teardown(&self) {
        let _guard = self.lifecycle.lock().await;
        if !self.may_exist() {
            return;
        }

        info!("◆ REMOVING SESSION CONTAINER {}", self.name);
        let removed = self.remove_container().await;
        if !removed && self.is_running() {
            warn!("◆ FAILED TO REMOVE CONTAINER {}", self.name);
        }
        self.running.store(false, Ordering::SeqCst);
        self.provisioning_started.store(false, Ordering::SeqCst);
    }
}

impl Drop for DockerSandbox {
    fn drop(&mut self) {
        if self.may_exist() {
            warn!("◆ SESSION {} DROPPED BEFORE TEARDOWN, FORCING REMOVAL", self.name);
            let _ = std::process::Command::new(&self.runtime)
                .args(["rm", "-f", self.name.as_str()])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
        }
    }
}
