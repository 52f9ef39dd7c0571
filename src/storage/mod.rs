//! Storage layer for conversation transcripts
//!
//! One record per user identifier, holding the whole transcript as
//! pretty-printed JSON. Records live either in a local directory or in an
//! R2 / S3 bucket; both are driven by the same [`TranscriptStore`].

mod file;
mod r2;

pub use file::FileBackend;
pub use r2::R2Backend;

use crate::config::{CorruptRecordPolicy, HistoryBackend, Settings};
use crate::transcript::{Message, Transcript};
use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error retrieving object from S3
    #[error("S3 Get error: {0}")]
    S3Get(Box<SdkError<GetObjectError>>),
    /// Error putting or deleting an object in S3
    #[error("S3 put error: {0}")]
    S3Put(String),
    /// Error during JSON serialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error (missing credentials, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Persistence of per-user transcripts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the transcript for a user.
    ///
    /// A missing or unreadable record yields a fresh seed-only transcript.
    async fn load(&self, user_id: i64) -> Result<Transcript, StorageError>;
    /// Overwrite the whole record for a user
    async fn save(&self, user_id: i64, transcript: &Transcript) -> Result<(), StorageError>;
    /// Delete the record for a user
    async fn clear(&self, user_id: i64) -> Result<(), StorageError>;
    /// Check that the backend is reachable
    async fn check_connection(&self) -> Result<(), String>;
}

/// Raw keyed blob storage underneath a [`TranscriptStore`]
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Storage key for a user's record
    fn key_for(&self, user_id: i64) -> String;
    /// Read a record; `Ok(None)` when it does not exist
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// Replace a record
    async fn write(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;
    /// Remove a record; removing a missing record succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Check that the backend is reachable
    async fn check_connection(&self) -> Result<(), String>;
}

/// History store that seeds, validates and serializes transcripts on top of
/// a [`RecordBackend`].
pub struct TranscriptStore<B> {
    backend: B,
    seed: String,
    policy: CorruptRecordPolicy,
}

impl<B: RecordBackend> TranscriptStore<B> {
    /// Create a store that seeds new transcripts with `seed`
    pub fn new(backend: B, seed: impl Into<String>, policy: CorruptRecordPolicy) -> Self {
        Self {
            backend,
            seed: seed.into(),
            policy,
        }
    }

    /// The underlying backend
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    fn fresh(&self) -> Transcript {
        Transcript::seeded(self.seed.clone())
    }
}

/// Parse a stored record into a transcript.
///
/// # Errors
///
/// Returns a description of why the record is unusable.
pub fn decode_transcript(bytes: &[u8]) -> Result<Transcript, String> {
    let messages: Vec<Message> = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    Transcript::from_messages(messages)
        .ok_or_else(|| "transcript does not start with a system message".to_string())
}

#[async_trait]
impl<B: RecordBackend> HistoryStore for TranscriptStore<B> {
    async fn load(&self, user_id: i64) -> Result<Transcript, StorageError> {
        let key = self.backend.key_for(user_id);
        let Some(bytes) = self.backend.read(&key).await? else {
            debug!("No history for user {user_id}, starting from seed.");
            return Ok(self.fresh());
        };

        match decode_transcript(&bytes) {
            Ok(transcript) => Ok(transcript),
            Err(reason) => {
                warn!("Unreadable history for user {user_id} ({key}): {reason}. Resetting to seed.");
                if self.policy == CorruptRecordPolicy::Delete {
                    if let Err(e) = self.backend.delete(&key).await {
                        error!("Failed to delete unreadable history {key}: {e}");
                    }
                }
                Ok(self.fresh())
            }
        }
    }

    async fn save(&self, user_id: i64, transcript: &Transcript) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(transcript)?;
        self.backend
            .write(&self.backend.key_for(user_id), body.into_bytes())
            .await
    }

    async fn clear(&self, user_id: i64) -> Result<(), StorageError> {
        self.backend.delete(&self.backend.key_for(user_id)).await
    }

    async fn check_connection(&self) -> Result<(), String> {
        self.backend.check_connection().await
    }
}

/// Build the history store selected by the settings
///
/// # Errors
///
/// Returns an error if the backend cannot be initialized.
pub async fn init_history_store(settings: &Settings) -> Result<Arc<dyn HistoryStore>, StorageError> {
    let seed = settings.persona_prompt();
    let policy = settings.corrupt_record_policy;
    let store: Arc<dyn HistoryStore> = match settings.history_backend {
        HistoryBackend::File => {
            let backend = FileBackend::new(&settings.history_dir).await?;
            Arc::new(TranscriptStore::new(backend, seed, policy))
        }
        HistoryBackend::R2 => {
            let backend = R2Backend::new(settings).await?;
            Arc::new(TranscriptStore::new(backend, seed, policy))
        }
    };
    Ok(store)
}
