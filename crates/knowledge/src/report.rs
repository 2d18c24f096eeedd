//! Markdown report artifact

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use ndrill_config::paths::safe_filename;

use crate::{truncate_chars, KnowledgeBase, Result};

const REPORT_OUTPUT_CHARS: usize = 5000;

/// How the run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    ObjectiveAchieved,
    Cancelled,
    Exhausted { cycles: u32 },
    Failed { reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::ObjectiveAchieved)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::ObjectiveAchieved => write!(f, "Objective achieved"),
            RunOutcome::Cancelled => write!(f, "Incomplete (cancelled by user)"),
            RunOutcome::Exhausted { cycles } => {
                write!(f, "Incomplete (stopped after {} cycles)", cycles)
            }
            RunOutcome::Failed { reason } => write!(f, "Incomplete (fatal error: {})", reason),
        }
    }
}

/// `ndrill_assessment_report_<sanitized target>.md`
pub fn report_filename(target: &str) -> String {
    format!("ndrill_assessment_report_{}.md", safe_filename(target))
}

/// Render the report from a finished knowledge base
pub fn render_report(kb: &KnowledgeBase, outcome: &RunOutcome) -> String {
    let result = kb
        .success
        .as_deref()
        .or(kb.last_result.as_deref())
        .map(|r| truncate_chars(r, REPORT_OUTPUT_CHARS))
        .unwrap_or_else(|| "Incomplete".to_string());

    let mut out = String::new();
    out.push_str(&format!(
        "# nDrill Security Assessment Report: {}\n",
        kb.target
    ));
    out.push_str(&format!("## Mission: {}\n", kb.mission));
    out.push_str(&format!("## Status: {}\n", outcome));
    out.push_str(&format!("## Result: {}\n", result));
    out.push_str(&format!(
        "\n- Started: {}\n- Scan reports: {}\n- Exploitation attempts: {}\n- Failed attempts: {}\n",
        kb.started_at.format("%Y-%m-%d %H:%M:%S"),
        kb.scan_reports.len(),
        kb.exploit_attempts.len(),
        kb.failures.len()
    ));

    if let Some(recon) = &kb.recon {
        out.push_str("\n## Reconnaissance\n\n```json\n");
        out.push_str(&serde_json::to_string_pretty(recon).unwrap_or_default());
        out.push_str("\n```\n");
    }

    if !kb.scan_reports.is_empty() {
        out.push_str("\n## Scan Reports\n");
        for (i, report) in kb.scan_reports.iter().enumerate() {
            out.push_str(&format!("\n### Cycle report {}\n\n```json\n", i + 1));
            out.push_str(&serde_json::to_string_pretty(report).unwrap_or_default());
            out.push_str("\n```\n");
        }
    }

    out
}

/// Write the report into `dir`, returning its path
pub async fn write_report(
    dir: &Path,
    kb: &KnowledgeBase,
    outcome: &RunOutcome,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_filename(&kb.target));
    tokio::fs::write(&path, render_report(kb, outcome)).await?;
    info!("◆ REPORT WRITTEN TO {:?}", path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_filename() {
        assert_eq!(
            report_filename("http://example.test"),
            "ndrill_assessment_report_http___example_test.md"
        );
    }

    #[test]
    fn test_render_incomplete() {
        let kb = KnowledgeBase::new("http://example.test", "Check the login form");
        let report = render_report(&kb, &RunOutcome::Cancelled);

        assert!(report.starts_with("# nDrill Security Assessment Report: http://example.test\n"));
        assert!(report.contains("## Mission: Check the login form"));
        assert!(report.contains("## Status: Incomplete (cancelled by user)"));
        assert!(report.contains("## Result: Incomplete"));
        assert!(!report.contains("## Scan Reports"));
    }

    #[test]
    fn test_render_success_prefers_success_output() {
        let mut kb = KnowledgeBase::new("t", "m");
        kb.last_result = Some("older".to_string());
        kb.record_success("uid=0(root) gid=0(root)");
        kb.push_scan_report(json!({"open_ports": [80]}));

        let report = render_report(&kb, &RunOutcome::ObjectiveAchieved);
        assert!(report.contains("## Status: Objective achieved"));
        assert!(report.contains("## Result: uid=0(root) gid=0(root)"));
        assert!(report.contains("### Cycle report 1"));
        assert!(report.contains("\"open_ports\""));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            RunOutcome::Exhausted { cycles: 4 }.to_string(),
            "Incomplete (stopped after 4 cycles)"
        );
        assert!(RunOutcome::Failed {
            reason: "no sandbox".to_string()
        }
        .to_string()
        .contains("no sandbox"));
        assert!(RunOutcome::ObjectiveAchieved.is_success());
        assert!(!RunOutcome::Cancelled.is_success());
    }
}
