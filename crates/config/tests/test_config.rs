//! Tests for Config serialization, defaults and persistence

use ndrill_config::{Config, ConfigError, SandboxBackend, DEFAULT_SUCCESS_MARKERS};
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    // Oracle defaults
    assert_eq!(config.oracle.local.api_base, "http://localhost:11434");
    assert_eq!(config.oracle.local.model, "qwen2.5-coder:7b");
    assert_eq!(config.oracle.local.num_thread, 12);
    assert!(config.oracle.remote.api_key.is_empty());
    assert!(config.oracle.remote.api_base.is_none());
    assert_eq!(config.oracle.remote.model, "google/gemini-2.0-flash-001");

    // Sandbox defaults
    assert_eq!(config.sandbox.backend, SandboxBackend::Docker);
    assert_eq!(config.sandbox.image, "ndrill-agent-tools");
    assert_eq!(config.sandbox.memory, "1g");
    assert_eq!(config.sandbox.cpus, "1.0");
    assert_eq!(config.sandbox.command_timeout(), Duration::from_secs(600));
    assert_eq!(config.sandbox.provision_attempts, 2);

    // Assessment defaults
    assert_eq!(config.assessment.decision_attempts, 3);
    assert_eq!(config.assessment.scan_iterations, 5);
    assert_eq!(config.assessment.min_scan_iterations, 2);
    assert_eq!(config.assessment.history_output_chars, 800);
    assert_eq!(config.assessment.exploit_attempts, 10);
    assert_eq!(config.assessment.feedback_output_chars, 5000);
    assert_eq!(config.assessment.cycle_backoff(), Duration::from_secs(2));
    assert!(config.assessment.max_cycles.is_none());
    assert_eq!(
        config.assessment.success_markers.len(),
        DEFAULT_SUCCESS_MARKERS.len()
    );
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{"sandbox": {"backend": "host", "command_timeout_secs": 5}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.sandbox.backend, SandboxBackend::Host);
    assert_eq!(config.sandbox.command_timeout_secs, 5);
    assert_eq!(config.sandbox.image, "ndrill-agent-tools");
    assert_eq!(config.assessment.exploit_attempts, 10);
}

#[test]
fn test_empty_json_is_default() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.oracle.max_tokens, 4096);
    assert_eq!(config.assessment.report_dir, ".");
}

#[tokio::test]
async fn test_save_and_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.oracle.remote.api_key = "sk-or-test".to_string();
    config.assessment.max_cycles = Some(3);
    config.sandbox.backend = SandboxBackend::Host;
    config.save_to(&path).await.unwrap();

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.oracle.remote.api_key, "sk-or-test");
    assert_eq!(loaded.assessment.max_cycles, Some(3));
    assert_eq!(loaded.sandbox.backend, SandboxBackend::Host);
}

#[tokio::test]
async fn test_load_missing_file_uses_defaults() {
    let dir = temp_dir();
    let config = Config::load_from(&dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(config.assessment.decision_attempts, 3);
}

#[tokio::test]
async fn test_load_required_missing_file_errors() {
    let dir = temp_dir();
    let path = dir.path().join("absent.json");
    match Config::load_required(&path).await {
        Err(ConfigError::NotFound(p)) => assert_eq!(p, path),
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_load_invalid_json_errors() {
    let dir = temp_dir();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::Json(_)));
    assert!(err.to_string().contains("CONFIG PARSE FAILED"));
}
