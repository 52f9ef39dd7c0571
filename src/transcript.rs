//! Transcript and message types
//!
//! A transcript is the literal chat history replayed to the model each turn.
//! Its first element is always the seed system message.

use serde::{Deserialize, Serialize};
use std::fmt;
use tiktoken_rs::cl100k_base_singleton;

/// Author of a message
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Persona / instruction message
    System,
    /// End user
    User,
    /// Model reply
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    /// Author of the message
    pub role: Role,
    /// Text content
    pub content: String,
}

impl Message {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered conversation history for one user
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// A fresh transcript holding only the seed system message
    pub fn seeded(seed: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(seed)],
        }
    }

    /// Wrap stored messages, rejecting anything that does not start with a
    /// system message.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Option<Self> {
        match messages.first() {
            Some(first) if first.role == Role::System => Some(Self { messages }),
            _ => None,
        }
    }

    /// All messages, seed first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The seed system message
    #[must_use]
    pub fn seed(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// The most recent message
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages including the seed
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true for a well-formed transcript
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Approximate token count of the whole transcript (cl100k tokenizer)
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        let bpe = cl100k_base_singleton();
        self.messages
            .iter()
            .map(|m| bpe.encode_with_special_tokens(&m.content).len())
            .sum()
    }
}
