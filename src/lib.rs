#![deny(missing_docs)]
//! Persona Relay
//!
//! A Telegram bot that relays a user's messages, together with the stored
//! conversation, to a text-generation API and sends the reply back.

/// Telegram transport
pub mod bot;
/// Configuration management
pub mod config;
/// Response formatting for the display surface
pub mod formatter;
/// LLM providers and client
pub mod llm;
/// Per-user turn serialization
pub mod locks;
/// Prompt assembly on top of the stored transcript
pub mod prompt;
/// Turn orchestration independent of the transport
pub mod relay;
/// Minimal HTTP endpoint
pub mod server;
/// History storage (local files or R2)
pub mod storage;
/// Transcript and message types
pub mod transcript;
/// Global turn counter and reminder trigger
pub mod turns;
/// Utility functions
pub mod utils;

/// Mock constructors for unit tests
#[cfg(test)]
pub mod testing;
