//! HTTP helpers for providers that talk plain JSON over reqwest

use super::common::handle_http_error;
use crate::config::LLM_HTTP_TIMEOUT_SECS;
use crate::llm::LlmError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Longest error body kept in an [`LlmError`]
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client with the model API timeout.
#[must_use]
pub fn create_http_client() -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(LLM_HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends a JSON POST and parses the JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on
/// non-success status codes, or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    provider: &str,
    url: &str,
    body: &Value,
) -> Result<Value, LlmError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(handle_http_error(provider, status, &clean_error_body(&error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Drops proxy HTML pages and truncates long bodies
fn clean_error_body(body: &str) -> String {
    let trimmed = body.trim_start();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.to_ascii_lowercase().starts_with("<html") {
        return "(server returned HTML error page)".to_string();
    }
    if body.chars().count() > MAX_ERROR_BODY_CHARS {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{head}... (truncated)")
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_bodies_are_hidden() {
        assert_eq!(
            clean_error_body("<html><body>502</body></html>"),
            "(server returned HTML error page)"
        );
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 10);
        let cleaned = clean_error_body(&body);
        assert!(cleaned.ends_with("... (truncated)"));
        assert_eq!(cleaned.chars().filter(|c| *c == 'x').count(), MAX_ERROR_BODY_CHARS);
    }
}
