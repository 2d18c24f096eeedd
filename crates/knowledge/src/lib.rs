//! Run-scoped knowledge base
//!
//! Accumulates every phase result of one assessment. The orchestrator is the
//! only writer; agents and the report read it.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use ndrill_sandbox::ExecutionResult;

pub mod report;

pub use report::{report_filename, render_report, write_report, RunOutcome};

/// Failures shown to agents in the context summary
const RECENT_FAILURES: usize = 3;
const SUMMARY_OUTPUT_CHARS: usize = 600;

/// Knowledge base errors
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("REPORT IO ERROR: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KnowledgeError>;

/// One executed (or syntax-rejected) exploitation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitAttempt {
    pub cycle: u32,
    pub attempt: u32,
    #[serde(default)]
    pub rationale: String,
    pub script: String,
    /// Absent when the payload never reached the sandbox
    pub result: Option<ExecutionResult>,
    pub output: String,
    pub at: DateTime<Local>,
}

/// A payload that did not reach the objective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub script: String,
    pub output: String,
}

/// Everything learned during one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub target: String,
    pub mission: String,
    pub started_at: DateTime<Local>,
    pub recon: Option<Value>,
    pub service_discovery: Option<String>,
    pub scan_reports: Vec<Value>,
    pub exploit_attempts: Vec<ExploitAttempt>,
    pub failures: Vec<FailureRecord>,
    /// Output of the most recent executed payload
    pub last_result: Option<String>,
    /// Output that satisfied the objective
    pub success: Option<String>,
}

impl KnowledgeBase {
    pub fn new(target: impl Into<String>, mission: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mission: mission.into(),
            started_at: Local::now(),
            recon: None,
            service_discovery: None,
            scan_reports: Vec::new(),
            exploit_attempts: Vec::new(),
            failures: Vec::new(),
            last_result: None,
            success: None,
        }
    }

    pub fn record_recon(&mut self, report: Value) {
        debug!("◆ KB: RECON RECORDED");
        self.recon = Some(report);
    }

    pub fn record_service_discovery(&mut self, output: impl Into<String>) {
        debug!("◆ KB: SERVICE DISCOVERY RECORDED");
        self.service_discovery = Some(output.into());
    }

    /// Append a scan report. Empty objects carry nothing and are skipped.
    pub fn push_scan_report(&mut self, report: Value) -> bool {
        let empty = match &report {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if !empty {
            self.scan_reports.push(report);
        }
        !empty
    }

    pub fn record_attempt(&mut self, attempt: ExploitAttempt) {
        if attempt.result.is_some() {
            self.last_result = Some(attempt.output.clone());
        }
        self.exploit_attempts.push(attempt);
    }

    pub fn record_failure(&mut self, script: impl Into<String>, output: impl Into<String>) {
        self.failures.push(FailureRecord {
            script: script.into(),
            output: output.into(),
        });
    }

    pub fn record_success(&mut self, output: impl Into<String>) {
        let output = output.into();
        self.last_result = Some(output.clone());
        self.success = Some(output);
    }

    pub fn is_achieved(&self) -> bool {
        self.success.is_some()
    }

    pub fn latest_scan_report(&self) -> Option<&Value> {
        self.scan_reports.last()
    }

    /// Compact view handed to agents
    pub fn context_summary(&self) -> Value {
        let recent_failures: Vec<Value> = self
            .failures
            .iter()
            .rev()
            .take(RECENT_FAILURES)
            .rev()
            .map(|f| {
                json!({
                    "script": truncate_chars(&f.script, SUMMARY_OUTPUT_CHARS),
                    "output": truncate_chars(&f.output, SUMMARY_OUTPUT_CHARS),
                })
            })
            .collect();

        json!({
            "target": self.target,
            "mission": self.mission,
            "recon": self.recon,
            "service_discovery": self.service_discovery,
            "scan_reports": self.scan_reports.len(),
            "exploit_attempts": self.exploit_attempts.len(),
            "recent_failures": recent_failures,
        })
    }
}

/// First `max` characters of `text`, never splitting a UTF-8 sequence
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(output: &str, executed: bool) -> ExploitAttempt {
        ExploitAttempt {
            cycle: 1,
            attempt: 1,
            rationale: String::new(),
            script: "print('x')".to_string(),
            result: executed.then(|| ExecutionResult::unavailable("python3", "n/a")),
            output: output.to_string(),
            at: Local::now(),
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_new_is_empty() {
        let kb = KnowledgeBase::new("http://t", "mission");
        assert!(kb.recon.is_none());
        assert!(kb.scan_reports.is_empty());
        assert!(!kb.is_achieved());
    }

    #[test]
    fn test_empty_scan_reports_skipped() {
        let mut kb = KnowledgeBase::new("t", "m");
        assert!(!kb.push_scan_report(json!({})));
        assert!(!kb.push_scan_report(Value::Null));
        assert!(kb.push_scan_report(json!({"findings": []})));
        assert_eq!(kb.scan_reports.len(), 1);
        assert_eq!(kb.latest_scan_report(), Some(&json!({"findings": []})));
    }

    #[test]
    fn test_last_result_tracks_executed_attempts_only() {
        let mut kb = KnowledgeBase::new("t", "m");
        kb.record_attempt(attempt("executed", true));
        kb.record_attempt(attempt("syntax rejected", false));
        assert_eq!(kb.last_result.as_deref(), Some("executed"));
        assert_eq!(kb.exploit_attempts.len(), 2);
    }

    #[test]
    fn test_record_success() {
        let mut kb = KnowledgeBase::new("t", "m");
        kb.record_success("uid=0(root)");
        assert!(kb.is_achieved());
        assert_eq!(kb.last_result.as_deref(), Some("uid=0(root)"));
    }

    #[test]
    fn test_context_summary_keeps_recent_failures() {
        let mut kb = KnowledgeBase::new("t", "m");
        for i in 0..5 {
            kb.record_failure(format!("script {}", i), "x".repeat(2000));
        }
        let summary = kb.context_summary();
        let failures = summary["recent_failures"].as_array().unwrap();
        assert_eq!(failures.len(), 3);
        assert_eq!(failures[0]["script"], "script 2");
        assert_eq!(failures[2]["script"], "script 4");
        assert_eq!(
            failures[0]["output"].as_str().unwrap().len(),
            SUMMARY_OUTPUT_CHARS
        );
    }
}
