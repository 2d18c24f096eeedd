//! Decision oracle seam

use async_trait::async_trait;
use tracing::{debug, warn};

use ndrill_config::{OracleBackend, OracleConfig};
use ndrill_provider::{
    ChatParams, Message, OllamaProvider, OpenRouterProvider, Provider, ProviderError,
};

/// Reply returned by the remote backend when the request itself failed
pub const EMPTY_DECISION: &str = "{}";

/// Turns a transcript into raw reply text
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn send(&self, transcript: &[Message]) -> Result<String, ProviderError>;
}

/// Oracle backed by a chat-completion provider
pub struct ProviderOracle<P: Provider> {
    provider: P,
    model: String,
    max_tokens: u32,
    temperature: f32,
    fallback_on_error: bool,
}

impl<P: Provider> ProviderOracle<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.7,
            fallback_on_error: false,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Answer `{}` instead of failing when the backend errors
    pub fn with_empty_fallback(mut self) -> Self {
        self.fallback_on_error = true;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl<P: Provider> DecisionOracle for ProviderOracle<P> {
    async fn send(&self, transcript: &[Message]) -> Result<String, ProviderError> {
        let params = ChatParams {
            model: self.model.clone(),
            messages: transcript.to_vec(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        match self.provider.chat(params).await {
            Ok(response) => {
                let text = response.into_text();
                debug!("◆ ORACLE REPLIED ({} chars)", text.len());
                Ok(text)
            }
            Err(e) if self.fallback_on_error => {
                warn!("◆ ORACLE REQUEST FAILED, ANSWERING EMPTY: {}", e);
                Ok(EMPTY_DECISION.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

/// Build the oracle for the selected backend
pub fn build_oracle(backend: &OracleBackend, config: &OracleConfig) -> Box<dyn DecisionOracle> {
    match backend {
        OracleBackend::Remote {
            api_key,
            api_base,
            model,
        } => {
            let provider =
                OpenRouterProvider::new(api_key.clone(), api_base.clone(), Some(model.clone()));
            Box::new(
                ProviderOracle::new(provider, model.clone())
                    .with_sampling(config.max_tokens, config.temperature)
                    .with_empty_fallback(),
            )
        }
        OracleBackend::Local {
            api_base,
            model,
            num_thread,
        } => {
            let provider =
                OllamaProvider::new(Some(api_base.clone()), model.clone(), *num_thread);
            Box::new(
                ProviderOracle::new(provider, model.clone())
                    .with_sampling(config.max_tokens, config.temperature),
            )
        }
    }
}
