//! Local inference backend
//!
//! Ollama-style `/api/chat`, non-streaming, no credential.

use crate::*;
use reqwest::Client;
use serde_json::json;

const OLLAMA_API_BASE: &str = "http://localhost:11434";

/// Local inference service
pub struct OllamaProvider {
    client: Client,
    api_base: String,
    default_model: String,
    num_thread: u32,
}

impl OllamaProvider {
    pub fn new(api_base: Option<String>, default_model: impl Into<String>, num_thread: u32) -> Self {
        let api_base = api_base
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| OLLAMA_API_BASE.to_string());

        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            num_thread,
        }
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        json!({
            "model": model,
            "messages": wire_messages(&params.messages),
            "stream": false,
            "options": {
                "num_thread": self.num_thread,
                "temperature": params.temperature,
                "num_predict": params.max_tokens,
            }
        })
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse> {
        let content = json["message"]["content"]
            .as_str()
            .ok_or(ProviderError::InvalidResponse)?
            .to_string();

        let prompt_tokens = json["prompt_eval_count"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = json["eval_count"].as_u64().unwrap_or(0) as u32;

        Ok(ChatResponse {
            content: Some(content),
            finish_reason: json["done_reason"].as_str().unwrap_or("stop").to_string(),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }
}

#[async_trait::async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        trace!("◆ LOCAL REQUEST TO {}", self.api_base);

        let url = format!("{}/api/chat", self.api_base);
        let body = self.build_request(&params);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let json: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let error = json["error"]
                .as_str()
                .unwrap_or("UNKNOWN ERROR")
                .to_string();
            return Err(ProviderError::Api(error));
        }

        let parsed = self.parse_response(json)?;
        log_completion("LOCAL", &parsed);
        Ok(parsed)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.default_model.is_empty()
    }
}
