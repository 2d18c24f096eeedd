//! Host process sandbox
//!
//! Each command is a separate child process confined to a per-session scratch
//! directory. There is no resource ceiling, so this backend is meant for
//! development and tests.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    run_with_timeout, session_suffix, CommandOutcome, ExecutionResult, Result, Sandbox,
    SandboxError,
};

const PROVISION_ATTEMPTS: u32 = 2;

/// Scratch-directory session on the host
pub struct HostSandbox {
    id: String,
    workdir: PathBuf,
    running: AtomicBool,
    lifecycle: Mutex<()>,
}

impl HostSandbox {
    /// Session directory is created under `root` on first use
    pub fn new(root: impl AsRef<Path>) -> Self {
        let id = format!("ndrill-session-{}", session_suffix());
        Self {
            workdir: root.as_ref().join(&id),
            id,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Map a staging path into the session directory.
    ///
    /// Absolute paths are re-rooted under the session; `..` is rejected.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut resolved = self.workdir.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
                Component::ParentDir => return None,
            }
        }
        if resolved == self.workdir {
            None
        } else {
            Some(resolved)
        }
    }
}

#[async_trait]
impl Sandbox for HostSandbox {
    fn session_id(&self) -> &str {
        &self.id
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
        for attempt in 1..=PROVISION_ATTEMPTS {
            info!(
                "◆ PREPARING HOST SESSION {} (ATTEMPT {}/{})",
                self.id, attempt, PROVISION_ATTEMPTS
            );
            match tokio::fs::create_dir_all(&self.workdir).await {
                Ok(()) => {
                    self.running.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(e) => {
                    warn!("◆ SESSION DIRECTORY FAILED: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        Err(SandboxError::Provisioning {
            attempts: PROVISION_ATTEMPTS,
            reason: last_error,
        })
    }

    async fn run(&self, tool: &str, args: &[String], timeout: Duration) -> Result<ExecutionResult> {
        self.ensure_ready().await?;

        debug!("◆ EXEC: {} {}", tool, args.join(" "));
        let mut cmd = Command::new(tool);
        cmd.args(args).current_dir(&self.workdir);

        let result = match run_with_timeout(cmd, None, timeout).await {
            CommandOutcome::Completed(output) => ExecutionResult::from_output(tool, &output),
            CommandOutcome::TimedOut => {
                warn!("◆ {} TIMED OUT AFTER {}s", tool, timeout.as_secs());
                ExecutionResult::timeout(tool, timeout)
            }
            CommandOutcome::Failed(e) => {
                ExecutionResult::unavailable(tool, format!("Tool '{}' could not start: {}", tool, e))
            }
        };
        Ok(result)
    }

    async fn stage_file(&self, content: &str, path: &str) -> bool {
        if let Err(e) = self.ensure_ready().await {
            warn!("◆ CANNOT STAGE {}: {}", path, e);
            return false;
        }

        let Some(target) = self.resolve(path) else {
            warn!("◆ REFUSING TO STAGE OUTSIDE SESSION: {}", path);
            return false;
        };

        if let Some(parent) = target.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("◆ STAGING {} FAILED: {}", path, e);
                return false;
            }
        }

        match tokio::fs::write(&target, content).await {
            Ok(()) => true,
            Err(e) => {
                warn!("◆ STAGING {} FAILED: {}", path, e);
                false
            }
        }
    }

    async fn teardown(&self) {
        let _guard = self.lifecycle.lock().await;
        if !self.is_running() {
            return;
        }

        info!("◆ REMOVING HOST SESSION {}", self.id);
        if let Err(e) = tokio::fs::remove_dir_all(&self.workdir).await {
            warn!("◆ FAILED TO REMOVE {:?}: {}", self.workdir, e);
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for HostSandbox {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            let _ = std::fs::remove_dir_all(&self.workdir);
        }
    }
}
