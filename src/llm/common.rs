//! Common utilities for LLM providers
//!
//! Shared helper functions for building messages, handling errors,
//! and parsing responses across providers.

use super::LlmError;
use crate::transcript::{Message, Role};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionResponse,
};
use reqwest::StatusCode;

/// Build a list of chat messages for OpenAI-compatible APIs, preserving
/// the order and roles of the transcript.
///
/// # Errors
///
/// Returns `LlmError::Unknown` if message building fails.
pub fn build_openai_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    messages
        .iter()
        .map(|msg| -> Result<ChatCompletionRequestMessage, LlmError> {
            let built = match msg.role {
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(msg.content.clone())
                    .build()
                    .map_err(|e| LlmError::Unknown(e.to_string()))?
                    .into(),
            };
            Ok(built)
        })
        .collect()
}

/// Extract text content from an OpenAI-compatible chat completion response
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the response is empty.
pub fn extract_openai_response(
    response: &CreateChatCompletionResponse,
) -> Result<String, LlmError> {
    response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| LlmError::ApiError("Empty response".to_string()))
}

/// Create an `LlmError` from HTTP response status and body
#[must_use]
pub fn handle_http_error(provider: &str, status: StatusCode, body: &str) -> LlmError {
    LlmError::ApiError(format!("{provider} API error: {status} - {body}"))
}

/// Extract text content from a JSON response using a path
///
/// # Arguments
/// * `response` - The JSON value to extract from
/// * `path` - Array of keys to traverse (e.g., `["choices", "0", "message", "content"]`)
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the path does not exist or content is not a string.
pub fn extract_json_content(
    response: &serde_json::Value,
    path: &[&str],
) -> Result<String, LlmError> {
    let mut current = response;

    for key in path {
        current = key
            .parse::<usize>()
            .map_or_else(|_| &current[key], |index| &current[index]);
    }

    current
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| LlmError::ApiError(format!("Invalid response format: {response:?}")))
}
