//! LLM client and providers
//!
//! Two external services are used: a text-generation API that answers chat
//! turns, and a vision API that turns photos into text descriptions.

/// Shared helpers for request building and response parsing
pub mod common;
/// JSON-over-HTTP request helpers
pub mod http_utils;
/// Concrete provider implementations
pub mod providers;

use crate::config::{ChatProvider, Settings};
use crate::transcript::{Message, Transcript};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by LLM providers
#[derive(Debug, Error)]
pub enum LlmError {
    /// The remote API returned an error
    #[error("API error: {0}")]
    ApiError(String),
    /// Request could not be delivered
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Response body was not valid JSON
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Provider is not configured
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Anything else
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// An image passed inline to the vision API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/jpeg`
    pub mime_type: String,
}

impl ImageInput {
    /// JPEG image; Telegram re-encodes photos as JPEG
    #[must_use]
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg".to_string(),
        }
    }
}

/// Sampling parameters for image descriptions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionParams {
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling mass
    pub top_p: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Output token limit
    pub max_output_tokens: u32,
}

impl Default for VisionParams {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_p: 1.0,
            top_k: 32,
            max_output_tokens: 4096,
        }
    }
}

/// Interface for LLM providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a reply for an ordered list of messages
    async fn chat_completion(&self, messages: &[Message], model_id: &str)
        -> Result<String, LlmError>;

    /// Describe one or more images in text
    async fn describe_image(
        &self,
        prompt: &str,
        images: &[ImageInput],
        model_id: &str,
        params: &VisionParams,
    ) -> Result<String, LlmError>;
}

/// Routes chat turns and image descriptions to their providers
pub struct LlmClient {
    chat: Option<Arc<dyn LlmProvider>>,
    chat_model: String,
    vision: Option<Arc<dyn LlmProvider>>,
    vision_model: String,
    vision_params: VisionParams,
}

impl LlmClient {
    /// Create a client from settings. Providers without an API key are left
    /// unconfigured and fail with [`LlmError::MissingConfig`] on use.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let gemini = settings
            .gemini_api_key
            .as_ref()
            .map(|k| Arc::new(providers::GeminiProvider::new(k.clone())) as Arc<dyn LlmProvider>);

        let chat = match settings.chat_provider {
            ChatProvider::Groq => settings
                .groq_api_key
                .as_ref()
                .map(|k| Arc::new(providers::GroqProvider::new(k.clone())) as Arc<dyn LlmProvider>),
            ChatProvider::Gemini => gemini.clone(),
        };

        info!(
            "LLM routing: chat={:?} ({}), vision=gemini ({}), chat configured: {}, vision configured: {}",
            settings.chat_provider,
            settings.chat_model,
            settings.vision_model,
            chat.is_some(),
            gemini.is_some()
        );

        Self {
            chat,
            chat_model: settings.chat_model.clone(),
            vision: gemini,
            vision_model: settings.vision_model.clone(),
            vision_params: VisionParams::default(),
        }
    }

    /// Create a client from explicit providers
    #[must_use]
    pub fn with_providers(
        chat: Option<Arc<dyn LlmProvider>>,
        chat_model: impl Into<String>,
        vision: Option<Arc<dyn LlmProvider>>,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            chat_model: chat_model.into(),
            vision,
            vision_model: vision_model.into(),
            vision_params: VisionParams::default(),
        }
    }

    /// Whether photos can be handled
    #[must_use]
    pub fn is_vision_available(&self) -> bool {
        self.vision.is_some()
    }

    /// Send the whole transcript to the chat model
    ///
    /// # Errors
    ///
    /// Returns an error if no chat provider is configured or the call fails.
    pub async fn chat_completion(&self, transcript: &Transcript) -> Result<String, LlmError> {
        let provider = self
            .chat
            .as_ref()
            .ok_or_else(|| LlmError::MissingConfig("chat provider".to_string()))?;
        debug!(
            "Chat completion with {} ({} messages)",
            self.chat_model,
            transcript.len()
        );
        provider
            .chat_completion(crate::prompt::to_chat_messages(transcript), &self.chat_model)
            .await
    }

    /// Ask the vision model for a description of `images`
    ///
    /// # Errors
    ///
    /// Returns an error if no vision provider is configured or the call fails.
    pub async fn describe_image(
        &self,
        prompt: &str,
        images: &[ImageInput],
    ) -> Result<String, LlmError> {
        let provider = self
            .vision
            .as_ref()
            .ok_or_else(|| LlmError::MissingConfig("gemini".to_string()))?;
        debug!(
            "Describing {} image(s) with {}",
            images.len(),
            self.vision_model
        );
        provider
            .describe_image(prompt, images, &self.vision_model, &self.vision_params)
            .await
    }
}
