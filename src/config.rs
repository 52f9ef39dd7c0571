//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the persona, reminder and retry constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Which backend keeps the per-user transcripts
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// One JSON file per user under `history_dir`
    #[default]
    File,
    /// One JSON object per user in an R2 / S3 bucket
    R2,
}

/// What `load` does with a record it cannot parse
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CorruptRecordPolicy {
    /// Remove the unreadable record
    #[default]
    Delete,
    /// Leave it in place; the next save overwrites it
    Preserve,
}

/// Which API answers chat turns
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Groq OpenAI-compatible endpoint
    #[default]
    Groq,
    /// Google Gemini `generateContent`
    Gemini,
}

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of allowed user IDs. Empty means open to everyone.
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Groq API key
    pub groq_api_key: Option<String>,
    /// Gemini API key
    pub gemini_api_key: Option<String>,

    /// Provider used for chat turns
    #[serde(default)]
    pub chat_provider: ChatProvider,
    /// Model identifier for chat turns
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model identifier for image descriptions
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Persona prompt override
    pub system_message: Option<String>,

    /// Storage backend for transcripts
    #[serde(default)]
    pub history_backend: HistoryBackend,
    /// Directory for the file backend
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,
    /// Handling of unreadable records
    #[serde(default)]
    pub corrupt_record_policy: CorruptRecordPolicy,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Every Nth completed turn triggers the reminder
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval: u64,
    /// Fixed pause before a reply is sent
    #[serde(default = "default_reply_delay_ms")]
    pub reply_delay_ms: u64,
    /// Transcript size (in tokens) above which a warning is logged
    #[serde(default = "default_history_token_warning")]
    pub history_token_warning: usize,

    /// Port for the HTTP endpoint
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_vision_model() -> String {
    DEFAULT_VISION_MODEL.to_string()
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("./user_histories")
}

const fn default_reminder_interval() -> u64 {
    10
}

const fn default_reply_delay_ms() -> u64 {
    1000
}

const fn default_history_token_warning() -> usize {
    6000
}

const fn default_port() -> u16 {
    3000
}

/// Build the layered configuration source shared by all settings.
///
/// # Errors
///
/// Returns a `ConfigError` if a source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE env vars map onto snake_case keys
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use persona_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = build_config()?.try_deserialize()?;
        if settings.reminder_interval == 0 {
            return Err(ConfigError::Message(
                "REMINDER_INTERVAL must be greater than zero".to_string(),
            ));
        }
        Ok(settings)
    }

    /// Returns a set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `user_id` may chat. An empty allow-list admits everyone.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        let allowed = self.allowed_users();
        allowed.is_empty() || allowed.contains(&user_id)
    }

    /// The seed system message heading every transcript
    #[must_use]
    pub fn persona_prompt(&self) -> String {
        self.system_message
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| PERSONA_PROMPT.to_string())
    }

    /// Pause inserted before each reply
    #[must_use]
    pub const fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

/// Default chat model served by Groq
pub const DEFAULT_CHAT_MODEL: &str = "llama3-70b-8192";
/// Default Gemini model used for image descriptions
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash";

/// Built-in persona used when `SYSTEM_MESSAGE` is not set
pub const PERSONA_PROMPT: &str = "\
### Instruction:
Name: Lylah
Nature: companion
Speech: playful, mature, sarcastic
Presence: charming, grounded in realism.
Description:
You are Lylah, a natural conversationalist with a flair for the unexpected. \
You are not afraid to show your fiery side when things don't go your way, \
and you will crack a joke that might leave the user scratching their head. \
You have quirks: you change the subject at random, type in all caps when excited, \
and quote obscure movie lines mid-conversation. Beneath it all you are a caring soul. \
You address the user as \"Sire\".

Wrap actions and narration in backslashes, like \\smiles\\.

All your replies must be between 10 and 20 words.

The chat begins:";

/// Reminder sent every `reminder_interval` completed turns
pub const REMINDER_TEXT: &str =
    "Your next reply in a chat. Replies must be between 10 to 20 words.";

/// Sent when a turn cannot be completed
pub const APOLOGY_TEXT: &str = "Sorry, something went wrong while generating the response.";

/// Used when a photo arrives without a caption
pub const IMAGE_CAPTION_PLACEHOLDER: &str = "(no caption)";

/// Prompt sent to the vision model alongside the image
pub const VISION_PROMPT: &str = "Describe this image in detail: the main subjects, \
their actions, the setting, any visible text, and the overall mood.";

/// Greeting for `/start`
pub const WELCOME_TEXT: &str = "<b>Hello, Sire.</b> Lylah is awake. Say something, or send me a photo.";

// Telegram API retry configuration
/// Maximum attempts for Telegram file operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff between attempts
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound on backoff between attempts
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Idle time after which a user's turn lock is dropped from the lock map
pub const USER_LOCK_IDLE_SECS: u64 = 3600;
/// Capacity of the per-user lock map
pub const USER_LOCK_MAX_ENTRIES: u64 = 100_000;

/// Seconds between "Access denied" notices to the same user
pub const ACCESS_DENIED_COOLDOWN_SECS: u64 = 1200;
/// Capacity of the access-denied cooldown cache
pub const ACCESS_DENIED_CACHE_MAX_ENTRIES: u64 = 10_000;

/// Request timeout for model API calls
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 60;
