// ABOUTME: AI text generation for Vantage
// ABOUTME: Anthropic API client behind the TextGenerator trait

pub mod service;

// Re-export service types
pub use service::{
    AIService, AIServiceError, AIServiceResult, GeneratedText, GenerationRequest, TextGenerator,
    Usage, DEFAULT_TIMEOUT_SECS,
};
