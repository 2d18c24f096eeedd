//! Configuration management for nDrill
//!
//! Loads and saves assessment parameters from a JSON file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub mod paths;

pub use paths::{config_path, data_dir, sandbox_dir};

/// Errors in configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG IO ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CONFIG NOT FOUND: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Local inference service (no credential)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOracleConfig {
    #[serde(default = "default_local_api_base")]
    pub api_base: String,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_num_thread")]
    pub num_thread: u32,
}

impl Default for LocalOracleConfig {
    fn default() -> Self {
        Self {
            api_base: default_local_api_base(),
            model: default_local_model(),
            num_thread: default_num_thread(),
        }
    }
}

fn default_local_api_base() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_num_thread() -> u32 {
    12
}

/// Remote completion API (bearer credential)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOracleConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_remote_model")]
    pub model: String,
}

impl Default for RemoteOracleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_remote_model(),
        }
    }
}

fn default_remote_model() -> String {
    "google/gemini-2.0-flash-001".to_string()
}

/// Oracle backends and sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub local: LocalOracleConfig,
    #[serde(default)]
    pub remote: RemoteOracleConfig,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            local: LocalOracleConfig::default(),
            remote: RemoteOracleConfig::default(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

/// Resolved oracle backend for one run
#[derive(Debug, Clone, PartialEq)]
pub enum OracleBackend {
    Local {
        api_base: String,
        model: String,
        num_thread: u32,
    },
    Remote {
        api_key: String,
        api_base: Option<String>,
        model: String,
    },
}

impl OracleBackend {
    pub fn model(&self) -> &str {
        match self {
            OracleBackend::Local { model, .. } | OracleBackend::Remote { model, .. } => model,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, OracleBackend::Remote { .. })
    }

    /// Human readable label for logs and banners
    pub fn label(&self) -> String {
        match self {
            OracleBackend::Local { model, .. } => format!("Local ({})", model),
            OracleBackend::Remote { model, .. } => format!("Remote ({})", model),
        }
    }
}

/// Isolation mechanism for tool execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    #[default]
    Docker,
    /// Child processes in a scratch directory, no resource ceilings
    Host,
}

/// Sandbox session parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub backend: SandboxBackend,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_cpus")]
    pub cpus: String,
    #[serde(default = "default_workdir")]
    pub workdir: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_provision_attempts")]
    pub provision_attempts: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::default(),
            image: default_image(),
            network: default_network(),
            memory: default_memory(),
            cpus: default_cpus(),
            workdir: default_workdir(),
            command_timeout_secs: default_command_timeout(),
            provision_attempts: default_provision_attempts(),
        }
    }
}

impl SandboxConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn default_image() -> String {
    "ndrill-agent-tools".to_string()
}

fn default_network() -> String {
    "bridge".to_string()
}

fn default_memory() -> String {
    "1g".to_string()
}

fn default_cpus() -> String {
    "1.0".to_string()
}

fn default_workdir() -> String {
    "/tmp/ndrill".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

fn default_provision_attempts() -> u32 {
    2
}

/// Output markers treated as proof that the objective was reached
pub const DEFAULT_SUCCESS_MARKERS: &[&str] = &[
    "uid=0(root)",
    "root:x:0:0",
    "defacement successful",
    "database_dump_complete",
    "pwned",
];

/// Loop budgets and heuristics of the assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    #[serde(default = "default_decision_attempts")]
    pub decision_attempts: u32,
    #[serde(default = "default_scan_iterations")]
    pub scan_iterations: u32,
    #[serde(default = "default_min_scan_iterations")]
    pub min_scan_iterations: u32,
    #[serde(default = "default_history_output_chars")]
    pub history_output_chars: usize,
    #[serde(default = "default_exploit_attempts")]
    pub exploit_attempts: u32,
    #[serde(default = "default_feedback_output_chars")]
    pub feedback_output_chars: usize,
    #[serde(default = "default_cycle_backoff")]
    pub cycle_backoff_secs: u64,
    /// Unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,
    #[serde(default = "default_success_markers")]
    pub success_markers: Vec<String>,
    #[serde(default = "default_report_dir")]
    pub report_dir: String,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            decision_attempts: default_decision_attempts(),
            scan_iterations: default_scan_iterations(),
            min_scan_iterations: default_min_scan_iterations(),
            history_output_chars: default_history_output_chars(),
            exploit_attempts: default_exploit_attempts(),
            feedback_output_chars: default_feedback_output_chars(),
            cycle_backoff_secs: default_cycle_backoff(),
            max_cycles: None,
            success_markers: default_success_markers(),
            report_dir: default_report_dir(),
        }
    }
}

impl AssessmentConfig {
    pub fn cycle_backoff(&self) -> Duration {
        Duration::from_secs(self.cycle_backoff_secs)
    }
}

fn default_decision_attempts() -> u32 {
    3
}

fn default_scan_iterations() -> u32 {
    5
}

fn default_min_scan_iterations() -> u32 {
    2
}

fn default_history_output_chars() -> usize {
    800
}

fn default_exploit_attempts() -> u32 {
    10
}

fn default_feedback_output_chars() -> usize {
    5000
}

fn default_cycle_backoff() -> u64 {
    2
}

fn default_success_markers() -> Vec<String> {
    DEFAULT_SUCCESS_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_report_dir() -> String {
    ".".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location, defaults when the file is absent
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from an explicitly requested file, which must exist
    pub async fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_from(path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Resolve the oracle backend.
    ///
    /// A credential (argument first, then `oracle.remote.api_key`) selects the
    /// remote API; otherwise the local inference service is used. `model`
    /// overrides the selected backend's default model.
    pub fn select_backend(
        &self,
        credential: Option<String>,
        model: Option<String>,
    ) -> OracleBackend {
        let credential = credential.filter(|c| !c.is_empty()).or_else(|| {
            let key = &self.oracle.remote.api_key;
            if key.is_empty() {
                None
            } else {
                Some(key.clone())
            }
        });
        let model = model.filter(|m| !m.is_empty());

        match credential {
            Some(api_key) => OracleBackend::Remote {
                api_key,
                api_base: self.oracle.remote.api_base.clone(),
                model: model.unwrap_or_else(|| self.oracle.remote.model.clone()),
            },
            None => OracleBackend::Local {
                api_base: self.oracle.local.api_base.clone(),
                model: model.unwrap_or_else(|| self.oracle.local.model.clone()),
                num_thread: self.oracle.local.num_thread,
            },
        }
    }

    /// Directory the report artifact is written into
    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.assessment.report_dir)
    }
}
