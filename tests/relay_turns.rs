use persona_relay::config::{CorruptRecordPolicy, APOLOGY_TEXT, REMINDER_TEXT};
use persona_relay::llm::{ImageInput, LlmClient, LlmError, LlmProvider, VisionParams};
use persona_relay::relay::{ChatRelay, TurnOutcome};
use persona_relay::storage::{FileBackend, HistoryStore, TranscriptStore};
use persona_relay::transcript::{Message, Role};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Answers with the number of messages it was given, slowly
struct CountingMock {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl LlmProvider for CountingMock {
    async fn chat_completion(
        &self,
        messages: &[Message],
        _model_id: &str,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(format!("\\counts\\ {} messages", messages.len()))
    }

    async fn describe_image(
        &self,
        _prompt: &str,
        images: &[ImageInput],
        _model_id: &str,
        _params: &VisionParams,
    ) -> Result<String, LlmError> {
        Ok(format!("{} image(s) of a lighthouse", images.len()))
    }
}

struct FailingMock;

#[async_trait::async_trait]
impl LlmProvider for FailingMock {
    async fn chat_completion(
        &self,
        _messages: &[Message],
        _model_id: &str,
    ) -> Result<String, LlmError> {
        Err(LlmError::NetworkError("connection reset".to_string()))
    }

    async fn describe_image(
        &self,
        _prompt: &str,
        _images: &[ImageInput],
        _model_id: &str,
        _params: &VisionParams,
    ) -> Result<String, LlmError> {
        Err(LlmError::ApiError("quota exceeded".to_string()))
    }
}

async fn file_store(dir: &TempDir) -> Arc<dyn HistoryStore> {
    let backend = FileBackend::new(dir.path()).await.expect("backend");
    Arc::new(TranscriptStore::new(
        backend,
        "seed persona",
        CorruptRecordPolicy::Delete,
    ))
}

fn client(provider: Arc<dyn LlmProvider>) -> Arc<LlmClient> {
    Arc::new(LlmClient::with_providers(
        Some(Arc::clone(&provider)),
        "chat-model",
        Some(provider),
        "vision-model",
    ))
}

#[tokio::test]
async fn successful_turns_grow_transcript_by_two() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = file_store(&dir).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = ChatRelay::new(
        Arc::clone(&store),
        client(Arc::new(CountingMock {
            calls: Arc::clone(&calls),
        })),
        10,
        6000,
    );

    let outcome = relay.handle_text(11, "hello").await;
    assert_eq!(
        outcome,
        TurnOutcome::Reply {
            text: "<i>counts</i> 2 messages".to_string(),
            reminder: None
        }
    );
    relay.handle_text(11, "again").await;

    let t = store.load(11).await.expect("load");
    let roles: Vec<Role> = t.messages().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(t.messages()[4].content, "\\counts\\ 4 messages");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_turn_leaves_store_untouched() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = file_store(&dir).await;
    let relay = ChatRelay::new(Arc::clone(&store), client(Arc::new(FailingMock)), 10, 6000);

    let outcome = relay.handle_text(12, "hello").await;
    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            notice: APOLOGY_TEXT.to_string()
        }
    );
    assert!(!dir.path().join("12.json").exists());

    let outcome = relay
        .handle_image(12, Some("look"), ImageInput::jpeg(vec![0xff]))
        .await;
    assert!(matches!(outcome, TurnOutcome::Failed { .. }));
    assert!(!dir.path().join("12.json").exists());
}

#[tokio::test]
async fn image_turn_is_stored_as_text() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = file_store(&dir).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = ChatRelay::new(
        Arc::clone(&store),
        client(Arc::new(CountingMock { calls })),
        10,
        6000,
    );

    relay
        .handle_image(13, None, ImageInput::jpeg(vec![1, 2, 3]))
        .await;

    let t = store.load(13).await.expect("load");
    assert_eq!(
        t.messages()[1].content,
        "[Image] (no caption)\n[Image description] 1 image(s) of a lighthouse"
    );
}

#[tokio::test]
async fn reminder_counts_turns_across_users() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = ChatRelay::new(
        file_store(&dir).await,
        client(Arc::new(CountingMock { calls })),
        3,
        6000,
    );

    let mut reminders = Vec::new();
    for turn in 1..=7_i64 {
        if let TurnOutcome::Reply {
            reminder: Some(text),
            ..
        } = relay.handle_text(turn, "hi").await
        {
            assert_eq!(text, REMINDER_TEXT);
            reminders.push(turn);
        }
    }
    assert_eq!(reminders, vec![3, 6]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_turns_for_one_user_are_not_lost() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = file_store(&dir).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let relay = Arc::new(ChatRelay::new(
        Arc::clone(&store),
        client(Arc::new(CountingMock { calls })),
        10,
        6000,
    ));

    let mut handles = Vec::new();
    for i in 0..6 {
        let relay = Arc::clone(&relay);
        handles.push(tokio::spawn(async move {
            relay.handle_text(21, &format!("message {i}")).await
        }));
    }
    for handle in handles {
        let outcome = handle.await.expect("task panicked");
        assert!(matches!(outcome, TurnOutcome::Reply { .. }));
    }

    assert_eq!(store.load(21).await.expect("load").len(), 1 + 6 * 2);
}
