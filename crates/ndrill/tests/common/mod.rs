//! Common test utilities for nDrill binary tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home, config and report directories
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub report_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let report_dir = temp_dir.path().join("reports");
        Ok(Self {
            temp_dir,
            report_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.temp_dir.path().join("config.json")
    }

    /// Command with HOME pointed at the test environment
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ndrill"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Config using the host sandbox, an unreachable local oracle and a
    /// single short cycle
    pub fn create_offline_config(&self) -> anyhow::Result<()> {
        let config = serde_json::json!({
            "oracle": { "local": { "api_base": "http://127.0.0.1:9" } },
            "sandbox": { "backend": "host", "command_timeout_secs": 5 },
            "assessment": {
                "scan_iterations": 1,
                "exploit_attempts": 1,
                "cycle_backoff_secs": 0,
                "max_cycles": 1,
                "report_dir": self.report_dir
            }
        });
        std::fs::write(self.config_file(), serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }
}
