//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked LLM and storage providers.

use crate::llm::{LlmClient, LlmError, MockLlmProvider};
use crate::storage::MockHistoryStore;
use crate::transcript::Transcript;
use mockall::predicate::always;
use std::sync::Arc;

/// A mock provider answering every chat call with `response_text`.
/// Image descriptions fail.
#[must_use]
pub fn mock_llm_simple(response_text: &str) -> MockLlmProvider {
    let response_text = response_text.to_string();
    let mut mock = MockLlmProvider::new();
    mock.expect_chat_completion()
        .with(always(), always())
        .returning(move |_, _| Ok(response_text.clone()));

    mock.expect_describe_image()
        .returning(|_, _, _, _| Err(LlmError::Unknown("Not implemented".to_string())));

    mock
}

/// An [`LlmClient`] whose chat model always answers `response_text` and
/// which has no vision model.
#[must_use]
pub fn mock_chat_reply(response_text: &str) -> LlmClient {
    LlmClient::with_providers(
        Some(Arc::new(mock_llm_simple(response_text))),
        "test-chat",
        None,
        "test-vision",
    )
}

/// A mock store where every user starts with a seed-only transcript.
///
/// `save` and `clear` carry no expectations; tests set their own.
#[must_use]
pub fn mock_store_seeded(seed: &str) -> MockHistoryStore {
    let seed = seed.to_string();
    let mut mock = MockHistoryStore::new();
    mock.expect_load()
        .returning(move |_| Ok(Transcript::seeded(seed.clone())));
    mock.expect_check_connection().returning(|| Ok(()));
    mock
}
