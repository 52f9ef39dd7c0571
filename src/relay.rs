//! One conversation turn, independent of the transport
//!
//! load → append → infer → append reply → save → format → count. Any failure
//! abandons the turn without touching the stored transcript.

use crate::config::{Settings, APOLOGY_TEXT, REMINDER_TEXT};
use crate::formatter::format_reply;
use crate::llm::{ImageInput, LlmClient, LlmError};
use crate::locks::UserLocks;
use crate::prompt;
use crate::storage::{HistoryStore, StorageError};
use crate::transcript::Transcript;
use crate::turns::TurnCounter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Result of a turn as seen by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered
    Reply {
        /// Formatted HTML reply
        text: String,
        /// Reply-length reminder, sent after the reply when due
        reminder: Option<String>,
    },
    /// The turn was abandoned
    Failed {
        /// Plain-text notice for the user
        notice: String,
    },
}

#[derive(Debug, Error)]
enum TurnError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("inference: {0}")]
    Llm(#[from] LlmError),
}

/// Shared state for all turns
pub struct ChatRelay {
    store: Arc<dyn HistoryStore>,
    llm: Arc<LlmClient>,
    counter: TurnCounter,
    locks: UserLocks,
    token_warning: usize,
}

impl ChatRelay {
    /// Create a relay with a fresh turn counter
    #[must_use]
    pub fn new(
        store: Arc<dyn HistoryStore>,
        llm: Arc<LlmClient>,
        reminder_interval: u64,
        token_warning: usize,
    ) -> Self {
        Self {
            store,
            llm,
            counter: TurnCounter::new(reminder_interval),
            locks: UserLocks::default(),
            token_warning,
        }
    }

    /// Create a relay using the intervals from settings
    #[must_use]
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn HistoryStore>,
        llm: Arc<LlmClient>,
    ) -> Self {
        Self::new(
            store,
            llm,
            settings.reminder_interval,
            settings.history_token_warning,
        )
    }

    /// The history store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Whether photos can be described
    #[must_use]
    pub fn is_vision_available(&self) -> bool {
        self.llm.is_vision_available()
    }

    /// Relay a text message
    pub async fn handle_text(&self, user_id: i64, text: &str) -> TurnOutcome {
        let _guard = self.locks.acquire(user_id).await;
        let result = async {
            let mut transcript = self.store.load(user_id).await?;
            prompt::append_user_turn(&mut transcript, text);
            self.complete_turn(user_id, transcript).await
        }
        .await;
        self.finish(user_id, result)
    }

    /// Relay a photo, with its optional caption, as a text turn
    pub async fn handle_image(
        &self,
        user_id: i64,
        caption: Option<&str>,
        image: ImageInput,
    ) -> TurnOutcome {
        let _guard = self.locks.acquire(user_id).await;
        let result = async {
            let mut transcript = self.store.load(user_id).await?;
            prompt::append_image_turn(&mut transcript, &self.llm, caption, image).await?;
            self.complete_turn(user_id, transcript).await
        }
        .await;
        self.finish(user_id, result)
    }

    /// Delete a user's transcript
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn clear(&self, user_id: i64) -> Result<(), StorageError> {
        let _guard = self.locks.acquire(user_id).await;
        self.store.clear(user_id).await?;
        info!("Cleared history for user {user_id}");
        Ok(())
    }

    async fn complete_turn(
        &self,
        user_id: i64,
        mut transcript: Transcript,
    ) -> Result<String, TurnError> {
        let tokens = transcript.estimated_tokens();
        debug!(
            "User {user_id}: {} messages, ~{tokens} tokens",
            transcript.len()
        );
        if tokens > self.token_warning {
            warn!("History for user {user_id} is large: ~{tokens} tokens");
        }

        let reply = self.llm.chat_completion(&transcript).await?;
        prompt::append_assistant_turn(&mut transcript, reply.clone());
        self.store.save(user_id, &transcript).await?;
        Ok(reply)
    }

    fn finish(&self, user_id: i64, result: Result<String, TurnError>) -> TurnOutcome {
        match result {
            Ok(raw) => {
                let reminder = self
                    .counter
                    .record_turn()
                    .then(|| REMINDER_TEXT.to_string());
                if reminder.is_some() {
                    info!(
                        "Turn {} reached, sending reminder to user {user_id}",
                        self.counter.completed()
                    );
                }
                TurnOutcome::Reply {
                    text: format_reply(&raw),
                    reminder,
                }
            }
            Err(e) => {
                error!("Turn failed for user {user_id}: {e}");
                TurnOutcome::Failed {
                    notice: APOLOGY_TEXT.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockHistoryStore;
    use crate::testing::{mock_chat_reply, mock_store_seeded};
    use crate::transcript::{Message, Role};

    fn relay(store: MockHistoryStore, llm: LlmClient) -> ChatRelay {
        ChatRelay::new(Arc::new(store), Arc::new(llm), 10, 6000)
    }

    #[tokio::test]
    async fn test_text_turn_saves_user_and_raw_reply() {
        let mut store = mock_store_seeded("seed");
        store
            .expect_save()
            .withf(|id, t| {
                *id == 7
                    && t.messages()
                        == [
                            Message::system("seed"),
                            Message::user("hello"),
                            Message::assistant("\\bows\\ Greetings"),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let relay = relay(store, mock_chat_reply("\\bows\\ Greetings"));
        let outcome = relay.handle_text(7, "hello").await;
        assert_eq!(
            outcome,
            TurnOutcome::Reply {
                text: "<i>bows</i> Greetings".to_string(),
                reminder: None
            }
        );
    }

    #[tokio::test]
    async fn test_inference_failure_saves_nothing() {
        let mut store = mock_store_seeded("seed");
        store.expect_save().never();

        let mut chat = crate::llm::MockLlmProvider::new();
        chat.expect_chat_completion()
            .returning(|_, _| Err(LlmError::ApiError("rate limited".to_string())));
        let llm = LlmClient::with_providers(Some(Arc::new(chat)), "m", None, "v");

        let relay = relay(store, llm);
        let outcome = relay.handle_text(1, "hi").await;
        assert_eq!(
            outcome,
            TurnOutcome::Failed {
                notice: APOLOGY_TEXT.to_string()
            }
        );
        assert_eq!(relay.counter.completed(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_and_not_counted() {
        let mut store = mock_store_seeded("seed");
        store
            .expect_save()
            .returning(|_, _| Err(StorageError::Config("disk full".to_string())));

        let relay = relay(store, mock_chat_reply("ok"));
        assert!(matches!(
            relay.handle_text(1, "hi").await,
            TurnOutcome::Failed { .. }
        ));
        assert_eq!(relay.counter.completed(), 0);
    }

    #[tokio::test]
    async fn test_reminder_on_tenth_turn() {
        let mut store = mock_store_seeded("seed");
        store.expect_save().returning(|_, _| Ok(()));
        let relay = relay(store, mock_chat_reply("fine"));

        for turn in 1..=10 {
            let outcome = relay.handle_text(turn % 3, "msg").await;
            let TurnOutcome::Reply { reminder, .. } = outcome else {
                panic!("turn {turn} failed");
            };
            assert_eq!(reminder.is_some(), turn == 10, "turn {turn}");
        }
    }

    #[tokio::test]
    async fn test_image_turn_stores_description_block() {
        let mut store = mock_store_seeded("seed");
        store
            .expect_save()
            .withf(|_, t| {
                t.last().is_some_and(|m| m.role == Role::Assistant)
                    && t.messages()[1].content == "[Image] (no caption)\n[Image description] A red car."
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut chat = crate::llm::MockLlmProvider::new();
        chat.expect_chat_completion()
            .returning(|_, _| Ok("Nice car.".to_string()));
        let mut vision = crate::llm::MockLlmProvider::new();
        vision
            .expect_describe_image()
            .returning(|_, _, _, _| Ok("A red car.".to_string()));
        let llm = LlmClient::with_providers(
            Some(Arc::new(chat)),
            "m",
            Some(Arc::new(vision)),
            "v",
        );

        let relay = relay(store, llm);
        let outcome = relay.handle_image(5, None, ImageInput::jpeg(vec![9])).await;
        assert!(matches!(outcome, TurnOutcome::Reply { .. }));
    }

    #[tokio::test]
    async fn test_vision_failure_saves_nothing() {
        let mut store = mock_store_seeded("seed");
        store.expect_save().never();
        let relay = relay(store, LlmClient::with_providers(None, "m", None, "v"));

        let outcome = relay.handle_image(5, Some("hi"), ImageInput::jpeg(vec![9])).await;
        assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_clear_delegates_to_store() {
        let mut store = MockHistoryStore::new();
        store
            .expect_clear()
            .withf(|id| *id == 3)
            .times(1)
            .returning(|_| Ok(()));
        let relay = relay(store, LlmClient::with_providers(None, "m", None, "v"));
        assert!(relay.clear(3).await.is_ok());
    }
}
