//! Structured decision protocol
//!
//! Every oracle call goes through here: send the transcript, pull a JSON
//! object out of the reply, and on failure append a corrective message and
//! retry within a fixed budget.

use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use ndrill_provider::Message;

use crate::oracle::DecisionOracle;
use crate::verdict::AttemptBudget;
use crate::DecisionProtocolError;

/// Caller role, used for logging and the default exhaustion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Reconnaissance,
    Scanning,
    Exploitation,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Reconnaissance => "RECON",
            AgentRole::Scanning => "SCANNER",
            AgentRole::Exploitation => "EXPLOIT",
        }
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        match self {
            AgentRole::Reconnaissance => ExhaustionPolicy::Fail,
            AgentRole::Scanning | AgentRole::Exploitation => ExhaustionPolicy::Empty,
        }
    }
}

/// What to do once the attempt budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Return `DecisionProtocolError::Exhausted`
    Fail,
    /// Return an empty decision
    Empty,
}

/// A parsed decision together with the text it came from
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub raw: String,
    pub value: Map<String, Value>,
}

impl Reply {
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.value)
    }
}

/// Self-repairing JSON exchange with the oracle
#[derive(Clone)]
pub struct DecisionProtocol {
    oracle: Arc<dyn DecisionOracle>,
    max_attempts: u32,
}

impl DecisionProtocol {
    /// `max_attempts` is clamped to at least one call
    pub fn new(oracle: Arc<dyn DecisionOracle>, max_attempts: u32) -> Self {
        Self {
            oracle,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Request one decision using the role's default policy
    pub async fn request(
        &self,
        role: AgentRole,
        transcript: &mut Vec<Message>,
    ) -> Result<Reply, DecisionProtocolError> {
        self.request_with_policy(role, transcript, role.policy()).await
    }

    /// Request one decision.
    ///
    /// Makes at most `max_attempts` oracle calls. After a malformed reply the
    /// assistant text and a corrective user message are appended to
    /// `transcript`, but only when another attempt follows.
    pub async fn request_with_policy(
        &self,
        role: AgentRole,
        transcript: &mut Vec<Message>,
        policy: ExhaustionPolicy,
    ) -> Result<Reply, DecisionProtocolError> {
        let mut budget = AttemptBudget::new(self.max_attempts);
        let mut last_error = String::new();
        let mut last_raw = String::new();

        while let Some(attempt) = budget.next() {
            info!(
                "◆ {} AWAITING DECISION (ATTEMPT {}/{})",
                role.as_str(),
                attempt,
                self.max_attempts
            );

            let raw = self.oracle.send(transcript.as_slice()).await?;
            debug!("◆ {} RAW REPLY: {}", role.as_str(), raw);

            match parse_decision(&raw) {
                Ok(value) => return Ok(Reply { raw, value }),
                Err(e) => {
                    warn!(
                        "◆ {} MALFORMED DECISION (ATTEMPT {}): {} | RAW: {}",
                        role.as_str(),
                        attempt,
                        e,
                        raw
                    );
                    if !budget.is_exhausted() {
                        transcript.push(Message::assistant(raw.clone()));
                        transcript.push(Message::user(repair_message(&e)));
                    }
                    last_error = e;
                    last_raw = raw;
                }
            }
        }

        match policy {
            ExhaustionPolicy::Fail => Err(DecisionProtocolError::Exhausted {
                attempts: self.max_attempts,
                last_error,
                raw: last_raw,
            }),
            ExhaustionPolicy::Empty => {
                warn!(
                    "◆ {} GAVE UP AFTER {} ATTEMPTS, USING EMPTY DECISION",
                    role.as_str(),
                    self.max_attempts
                );
                Ok(Reply {
                    raw: last_raw,
                    value: Map::new(),
                })
            }
        }
    }
}

/// Corrective message appended after a malformed reply
pub fn repair_message(error: &str) -> String {
    format!(
        "SYSTEM: Fix JSON Error: {}. Return VALID JSON ONLY. Use the actual target, no placeholders.",
        error
    )
}

fn fence_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"```(?:json)?\s*").unwrap())
}

/// Strip code fences and cut from the first `{` to the last `}`.
///
/// Without a usable brace pair the cleaned text is returned whole.
pub fn extract_candidate(raw: &str) -> String {
    let cleaned = fence_regex().replace_all(raw, "");
    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => cleaned[start..=end].to_string(),
        _ => cleaned.trim().to_string(),
    }
}

/// Parse a candidate, tolerating raw control characters inside strings.
pub fn parse_relaxed(candidate: &str) -> Result<Map<String, Value>, String> {
    let escaped = escape_control_chars(candidate);
    match serde_json::from_str::<Value>(&escaped) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, found {}", kind_of(&other))),
        Err(e) => Err(e.to_string()),
    }
}

/// Extract and parse one decision object out of raw reply text.
///
/// An empty object is rejected like malformed text, so the `{}` a failed
/// remote request answers with goes through the repair path.
pub fn parse_decision(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Err("empty reply".to_string());
    }
    let map = parse_relaxed(&extract_candidate(raw))?;
    if map.is_empty() {
        return Err("empty decision object".to_string());
    }
    Ok(map)
}

fn escape_control_chars(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|c| c.is_control()) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
