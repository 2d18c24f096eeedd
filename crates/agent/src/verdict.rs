//! Outcome classification and attempt accounting

use ndrill_knowledge::truncate_chars;

const TRUNCATION_NOTICE: &str = "... [Output Truncated]";

/// Explicit attempt counter for bounded retry loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    cap: u32,
    used: u32,
}

impl AttemptBudget {
    pub fn new(cap: u32) -> Self {
        Self { cap, used: 0 }
    }

    /// Claim the next attempt, 1-based. `None` once the cap is reached.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<u32> {
        if self.used >= self.cap {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.cap - self.used
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.cap
    }
}

/// Whether an executed payload reached the objective
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    MarkerFound(String),
    ClaimedByOracle,
    NotAchieved,
}

impl Verdict {
    pub fn is_achieved(&self) -> bool {
        !matches!(self, Verdict::NotAchieved)
    }
}

/// Achieved when the output contains a success marker (case-insensitive) or
/// the oracle claimed success for this payload.
pub fn classify(claimed: bool, output: &str, markers: &[String]) -> Verdict {
    let lowered = output.to_lowercase();
    if let Some(marker) = markers
        .iter()
        .filter(|m| !m.is_empty())
        .find(|m| lowered.contains(&m.to_lowercase()))
    {
        return Verdict::MarkerFound(marker.clone());
    }

    if claimed {
        Verdict::ClaimedByOracle
    } else {
        Verdict::NotAchieved
    }
}

/// Heuristic hints derived from a failed payload's output
pub fn failure_hints(output: &str) -> Vec<&'static str> {
    let lowered = output.to_lowercase();
    let mut hints = Vec::new();

    if lowered.contains("connection refused") || lowered.contains("timed out") {
        hints.push("Connection refused or timed out: the port may be closed or filtered.");
    }
    if lowered.contains("syntaxerror") {
        hints.push("SyntaxError: fix the Python code before anything else.");
    }
    if lowered.contains("404") || lowered.contains("403") {
        hints.push("HTTP 404/403: check the URL path and required headers.");
    }
    if lowered.contains("modulenotfounderror") {
        hints.push("Missing module: use only the Python standard library or installed tools.");
    }
    if hints.is_empty() {
        hints.push("The objective was not reached: adjust the approach.");
    }
    hints
}

/// Cap output for feedback, marking the cut
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if output.chars().count() > max_chars {
        format!("{}\n{}", truncate_chars(output, max_chars), TRUNCATION_NOTICE)
    } else {
        output.to_string()
    }
}

/// Feedback message sent after a failed payload
pub fn failure_feedback(output: &str, max_chars: usize) -> String {
    let mut message = format!(
        "EXECUTION OUTPUT:\n{}\n\nANALYSIS: The script did not achieve the objective.\n",
        truncate_output(output, max_chars)
    );
    for hint in failure_hints(output) {
        message.push_str("- ");
        message.push_str(hint);
        message.push('\n');
    }
    message.push_str("Generate the NEXT script as JSON. DO NOT USE PLACEHOLDERS.");
    message
}
