use crate::llm::common::{build_openai_messages, extract_openai_response};
use crate::llm::http_utils::create_http_client;
use crate::llm::{ImageInput, LlmError, LlmProvider, VisionParams};
use crate::transcript::Message;
use async_openai::types::chat::CreateChatCompletionRequestArgs;
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// LLM provider implementation for Groq
pub struct GroqProvider {
    client: Client<OpenAIConfig>,
}

impl GroqProvider {
    /// Create a new Groq provider instance
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self::with_http_client(api_key, GROQ_API_BASE, create_http_client())
    }

    /// Groq-compatible provider at `api_base` sending through `http`.
    /// The request timeout is whatever `http` was built with.
    #[must_use]
    pub fn with_http_client(api_key: String, api_base: &str, http: HttpClient) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: Client::with_config(config).with_http_client(http),
        }
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat_completion(
        &self,
        messages: &[Message],
        model_id: &str,
    ) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model_id)
            .messages(build_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        debug!("Groq request: model={model_id}, messages={}", messages.len());

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        extract_openai_response(&response)
    }

    async fn describe_image(
        &self,
        _prompt: &str,
        _images: &[ImageInput],
        _model_id: &str,
        _params: &VisionParams,
    ) -> Result<String, LlmError> {
        Err(LlmError::Unknown("Not implemented for Groq".to_string()))
    }
}
