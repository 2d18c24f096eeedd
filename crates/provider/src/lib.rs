//! Oracle backends
//!
//! Chat-completion providers that turn a role-tagged transcript into raw text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use thiserror::Error;
use tracing::{debug, trace};

pub mod ollama;
pub mod openrouter;

pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

/// Backend errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("TRANSPORT FAILURE: {0}")]
    Request(#[from] reqwest::Error),

    #[error("MALFORMED PAYLOAD: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BACKEND REJECTED: {0}")]
    Api(String),

    #[error("NO CREDENTIAL CONFIGURED")]
    NoApiKey,

    #[error("INVALID RESPONSE SHAPE")]
    InvalidResponse,

    #[error("RATE LIMITED")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Transcript role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Backend response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Content or the empty string
    pub fn into_text(self) -> String {
        self.content.unwrap_or_default()
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Chat-completion backend
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Serialize a transcript into the `[{role, content}]` wire shape both
/// backends accept.
pub(crate) fn wire_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let wire: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": &m.content }))
        .collect();
    trace!("◆ {} MESSAGES ON THE WIRE", wire.len());
    wire
}

pub(crate) fn log_completion(backend: &str, response: &ChatResponse) {
    debug!(
        "◆ {} RESPONSE: {} CHARS, {} TOKENS",
        backend,
        response.content.as_deref().map(str::len).unwrap_or(0),
        response.usage.total_tokens
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(
            ProviderError::NoApiKey.to_string(),
            "NO CREDENTIAL CONFIGURED"
        );
        assert_eq!(
            ProviderError::Api("bad model".to_string()).to_string(),
            "BACKEND REJECTED: bad model"
        );
        assert_eq!(ProviderError::RateLimited.to_string(), "RATE LIMITED");
    }

    #[test]
    fn test_message_builders() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        let msg = Message::assistant("a");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "a");
    }

    #[test]
    fn test_message_serialization() {
        let json_str = serde_json::to_string(&Message::user("Hello")).unwrap();
        assert_eq!(json_str, r#"{"role":"user","content":"Hello"}"#);
    }

    #[test]
    fn test_message_deserialization() {
        let msg: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"Hi there"}"#).unwrap();
        assert_eq!(msg, Message::assistant("Hi there"));
    }

    #[test]
    fn test_wire_messages_keeps_order() {
        let wire = wire_messages(&[Message::system("a"), Message::user("b")]);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[1]["content"], "b");
    }

    #[test]
    fn test_chat_response_into_text() {
        assert_eq!(ChatResponse::text("x").into_text(), "x");
        let empty = ChatResponse {
            content: None,
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        };
        assert_eq!(empty.into_text(), "");
    }

    #[test]
    fn test_chat_params_default() {
        let params = ChatParams::default();
        assert!(params.model.is_empty());
        assert_eq!(params.max_tokens, 4096);
        assert_eq!(params.temperature, 0.7);
    }
}
