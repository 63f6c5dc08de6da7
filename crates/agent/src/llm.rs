use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use shopdesk_core::config::GenerationConfig;
use thiserror::Error;
use tracing::debug;

/// Phrases that end generation early; the service cuts output at the first hit.
pub const STOP_SEQUENCES: [&str; 29] = [
    "USER:", "User:", "user:", "---", "===", "Please", "If you", "For more", "Thank you",
    "Feel free", "Let me", "Happy to", "I'm here", "Additionally", "However", "Note:",
    "CRITICAL:", "Remember,", "PolicyID", "Could you", "Would you like", "Do you need",
    "Is there anything else", "Let me know if", "Absolutely!", "Sure thing!", "Of course!",
    "I'd be happy", "More details",
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            temperature: 0.1,
            top_p: 0.7,
            repetition_penalty: 1.2,
            stop: STOP_SEQUENCES.iter().map(|stop| stop.to_string()).collect(),
        }
    }
}

impl GenerationOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
            ..Self::default()
        }
    }
}

/// Request body posted to `{endpoint}/generate`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: GenerationOptions,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    Disabled,
    #[error("text generation timed out")]
    Timeout,
    #[error("text generation service returned status {0}")]
    Status(u16),
    #[error("text generation transport error: {0}")]
    Transport(String),
    #[error("text generation payload could not be decoded: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GenerationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Used when no endpoint is configured; every call reports [`GenerationError::Disabled`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlmClient;

#[async_trait]
impl LlmClient for DisabledLlmClient {
    async fn complete(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    text: Option<String>,
    response: Option<String>,
}

impl GenerationResponse {
    fn into_text(self) -> String {
        self.text.filter(|text| !text.is_empty()).or(self.response).unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct HttpLlmClient {
    client: Client,
    url: String,
    api_key: Option<secrecy::SecretString>,
}

impl HttpLlmClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or(GenerationError::Disabled)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GenerationError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/generate", endpoint.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        debug!(
            event_name = "assistant.generation.request",
            prompt_chars = request.prompt.len(),
            max_tokens = request.options.max_tokens,
            "calling text generation service"
        );

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let payload: GenerationResponse = serde_json::from_slice(&body)
            .map_err(|error| GenerationError::Decode(error.to_string()))?;
        Ok(payload.into_text())
    }
}
