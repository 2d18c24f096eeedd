//! Typed view over a parsed oracle reply

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One command to run in the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.tool.clone()
        } else {
            format!("{} {}", self.tool, self.args.join(" "))
        }
    }
}

/// Fields agents read from a decision. Unknown fields are ignored and every
/// field is optional; wrong JSON types degrade to the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub rationale: String,
    pub tool_name: String,
    pub args: Vec<String>,
    pub is_satisfied: bool,
    pub is_goal_achieved: bool,
    pub exploit_script: Option<String>,
    pub error: Option<String>,
}

impl Decision {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let rationale = object
            .get("rationale")
            .or_else(|| object.get("thought"))
            .map(text_of)
            .unwrap_or_default();

        Self {
            rationale,
            tool_name: object
                .get("tool_name")
                .map(text_of)
                .unwrap_or_default()
                .trim()
                .to_string(),
            args: object.get("args").map(normalize_args).unwrap_or_default(),
            is_satisfied: object.get("is_satisfied").map(truthy).unwrap_or(false),
            is_goal_achieved: object.get("is_goal_achieved").map(truthy).unwrap_or(false),
            exploit_script: object
                .get("exploit_script")
                .map(text_of)
                .filter(|s| !s.trim().is_empty()),
            error: object
                .get("error")
                .filter(|v| !v.is_null())
                .map(text_of),
        }
    }

    /// The requested tool, if any
    pub fn invocation(&self) -> Option<ToolInvocation> {
        if self.tool_name.is_empty() {
            None
        } else {
            Some(ToolInvocation::new(&self.tool_name, self.args.clone()))
        }
    }
}

/// Normalize an `args` field to an argument vector.
///
/// Arrays keep their elements (non-strings are stringified), a string is split
/// shell-style, null yields no arguments.
pub fn normalize_args(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().map(text_of).collect(),
        Value::String(s) => shell_words::split(s)
            .unwrap_or_else(|_| s.split_whitespace().map(str::to_string).collect()),
        other => vec![other.to_string()],
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}
