// ABOUTME: AI service for generating report section prose via Anthropic Claude
// ABOUTME: Handles API requests, response parsing, and usage accounting

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default per-request timeout. Section generation is bounded so a hung
/// upstream cannot pin a report in `generating` forever.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid response format")]
    InvalidResponse,
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[allow(dead_code)]
    id: String,
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One prose-generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub usage: Usage,
}

/// Seam between report generation and the model provider. Production
/// uses [`AIService`]; tests inject a scripted implementation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, request: GenerationRequest) -> AIServiceResult<GeneratedText>;
}

/// Anthropic-backed text generation service.
pub struct AIService {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

impl AIService {
    /// Create HTTP client with timeout configuration
    fn create_client(timeout_secs: u64) -> AIServiceResult<Client> {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(AIServiceError::RequestFailed)
    }

    /// Creates a new AI service instance with the given key and timeout.
    /// Model can be overridden with ANTHROPIC_MODEL.
    pub fn new(api_key: Option<String>, timeout_secs: u64) -> AIServiceResult<Self> {
        let model = env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        if model != DEFAULT_MODEL {
            info!("Using custom Anthropic model: {}", model);
        }

        Ok(Self {
            client: Self::create_client(timeout_secs)?,
            api_key,
            model,
            base_url: ANTHROPIC_API_URL.to_string(),
            timeout_secs,
        })
    }

    /// API key from ANTHROPIC_API_KEY, default timeout.
    pub fn from_env() -> AIServiceResult<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").ok();
        if api_key.is_none() {
            info!("ANTHROPIC_API_KEY not set - section generation will fail until configured");
        }
        Self::new(api_key, DEFAULT_TIMEOUT_SECS)
    }

    /// Get the model being used by this service
    pub fn model(&self) -> &str {
        &self.model
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn call(&self, request: GenerationRequest) -> AIServiceResult<GeneratedText> {
        let api_key = self.api_key.as_ref().ok_or(AIServiceError::NoApiKey)?;

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt,
            }],
            system: request.system,
        };

        info!(
            "Making Anthropic API request: model={}, max_tokens={}, timeout={}s",
            body.model, body.max_tokens, self.timeout_secs
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(
                        "Anthropic API request timed out after {} seconds",
                        self.timeout_secs
                    );
                    AIServiceError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!("Connection failed: {}", e))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::ApiError(format!(
                "API returned {}: {}",
                status, error_text
            )));
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AIServiceError::ParseError(e.to_string()))?;

        // Extract text from the first content block
        let text = anthropic_response
            .content
            .first()
            .ok_or(AIServiceError::InvalidResponse)?
            .text
            .clone();

        Ok(GeneratedText {
            text: strip_enclosing_fence(&text),
            usage: anthropic_response.usage,
        })
    }
}

#[async_trait]
impl TextGenerator for AIService {
    async fn generate_text(&self, request: GenerationRequest) -> AIServiceResult<GeneratedText> {
        self.call(request).await
    }
}

/// Models occasionally wrap the whole reply in a markdown code fence.
/// The section body should be the markdown itself, not a fenced block.
fn strip_enclosing_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    let start = trimmed.find('\n').map(|i| i + 1).unwrap_or(0);
    let end = trimmed[start..]
        .rfind("```")
        .map(|i| i + start)
        .unwrap_or(trimmed.len());
    trimmed[start..end].trim().to_string()
}
