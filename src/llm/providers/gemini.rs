use crate::llm::common::extract_json_content;
use crate::llm::http_utils::{create_http_client, send_json_request};
use crate::llm::{ImageInput, LlmError, LlmProvider, VisionParams};
use crate::transcript::{Message, Role};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const TEXT_PATH: [&str; 6] = ["candidates", "0", "content", "parts", "0", "text"];

/// LLM provider implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    #[must_use]
    pub fn new(api_key: String) -> Self {
        Self {
            http_client: create_http_client(),
            api_key,
        }
    }

    fn url(&self, model_id: &str) -> String {
        format!(
            "{GEMINI_API_BASE}/{model_id}:generateContent?key={}",
            self.api_key
        )
    }
}

fn safety_settings() -> Value {
    json!([
        {"category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE"},
        {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE"}
    ])
}

/// Request body for a chat turn. System messages become the system
/// instruction, assistant turns are sent with the `model` role.
pub(crate) fn chat_request_body(messages: &[Message]) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::User { "user" } else { "model" };
            json!({
                "role": role,
                "parts": [{"text": m.content}]
            })
        })
        .collect();

    let mut body = json!({
        "contents": contents,
        "safetySettings": safety_settings()
    });
    if !system.is_empty() {
        body["system_instruction"] = json!({
            "parts": [{"text": system.join("\n\n")}]
        });
    }
    body
}

/// Request body for an image description: the prompt followed by every image
/// inline.
pub(crate) fn vision_request_body(
    prompt: &str,
    images: &[ImageInput],
    params: &VisionParams,
) -> Value {
    let mut parts = vec![json!({"text": prompt})];
    parts.extend(images.iter().map(|image| {
        json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": BASE64.encode(&image.bytes)
            }
        })
    }));

    json!({
        "contents": [{"parts": parts}],
        "generationConfig": {
            "temperature": params.temperature,
            "topP": params.top_p,
            "topK": params.top_k,
            "maxOutputTokens": params.max_output_tokens
        },
        "safetySettings": safety_settings()
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat_completion(
        &self,
        messages: &[Message],
        model_id: &str,
    ) -> Result<String, LlmError> {
        let body = chat_request_body(messages);
        debug!("Gemini chat: model={model_id}, messages={}", messages.len());
        let res_json =
            send_json_request(&self.http_client, "Gemini", &self.url(model_id), &body).await?;
        extract_json_content(&res_json, &TEXT_PATH)
    }

    async fn describe_image(
        &self,
        prompt: &str,
        images: &[ImageInput],
        model_id: &str,
        params: &VisionParams,
    ) -> Result<String, LlmError> {
        if images.is_empty() {
            return Err(LlmError::Unknown("No images to describe".to_string()));
        }
        let body = vision_request_body(prompt, images, params);
        debug!("Gemini vision: model={model_id}, images={}", images.len());
        let res_json =
            send_json_request(&self.http_client, "Gemini", &self.url(model_id), &body).await?;
        extract_json_content(&res_json, &TEXT_PATH)
    }
}
