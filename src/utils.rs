//! Utility functions for message splitting, truncation and Telegram retries.

use anyhow::Result;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;
use unicode_segmentation::UnicodeSegmentation;

const OPEN_TAG: &str = "<i>";
const CLOSE_TAG: &str = "</i>";

/// Splits formatted HTML into parts of at most `max_length` characters.
///
/// Breaks at newlines first, then at whitespace, then between grapheme
/// clusters, never inside an HTML entity or tag. An italic span crossing a
/// boundary is closed at the end of one part and reopened in the next, which
/// can add up to seven characters per part; callers keep `max_length` below
/// the Telegram limit to leave room for that.
///
/// # Examples
///
/// ```
/// use persona_relay::utils::split_long_message;
/// let parts = split_long_message("one\ntwo", 4);
/// assert_eq!(parts, vec!["one", "two"]);
/// ```
#[must_use]
pub fn split_long_message(message: &str, max_length: usize) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    let max_length = max_length.max(1);
    if message.chars().count() <= max_length {
        return vec![message.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in message.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if needed <= max_length {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        if !current.trim().is_empty() {
            parts.push(current.trim_end().to_string());
        }

        let mut pieces = split_line(line, max_length);
        let last = pieces.pop().unwrap_or_default();
        // Telegram rejects blank messages
        parts.extend(pieces.into_iter().filter(|p| !p.trim().is_empty()));
        current_len = last.chars().count();
        current = last;
    }

    if !current.trim().is_empty() {
        parts.push(current.trim_end().to_string());
    }

    carry_italics(parts)
}

fn split_line(line: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chunk: Vec<&str> = Vec::new();
    let mut chunk_len = 0;

    for grapheme in line.graphemes(true) {
        let grapheme_len = grapheme.chars().count();
        while !chunk.is_empty() && chunk_len + grapheme_len > max_length {
            let rest = chunk.split_off(cut_point(&chunk));
            chunks.push(chunk.concat().trim_end().to_string());
            chunk_len = rest.iter().map(|g| g.chars().count()).sum();
            chunk = rest;
        }
        chunk.push(grapheme);
        chunk_len += grapheme_len;
    }
    chunks.push(chunk.concat());
    chunks
}

/// Index in `chunk` where the next part should begin
fn cut_point(chunk: &[&str]) -> usize {
    if let Some(i) = chunk
        .iter()
        .rposition(|g| g.chars().all(char::is_whitespace))
        .filter(|&i| i > 0)
    {
        return i + 1;
    }
    // keep `&amp;` and `<i>` in one piece
    for (opener, closer) in [("&", ";"), ("<", ">")] {
        if let Some(i) = chunk.iter().rposition(|g| *g == opener) {
            let terminated = chunk[i..].iter().any(|g| *g == closer);
            if !terminated && i > 0 {
                return i;
            }
        }
    }
    chunk.len()
}

fn carry_italics(parts: Vec<String>) -> Vec<String> {
    let mut carry = false;
    parts
        .into_iter()
        .map(|part| {
            let mut part = if carry {
                format!("{OPEN_TAG}{part}")
            } else {
                part
            };
            if let Some(rest) = part.strip_prefix("<i></i>") {
                part = rest.to_string();
            }
            let opens = part.matches(OPEN_TAG).count();
            let closes = part.matches(CLOSE_TAG).count();
            carry = opens > closes;
            if carry {
                part.push_str(CLOSE_TAG);
            }
            part
        })
        .collect()
}

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use persona_relay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retry a Telegram API operation with exponential backoff and jitter.
///
/// Used for photo downloads (`get_file` + `download_file`), which fail on
/// transient network errors. Backoff starts at 500ms, is capped at 4s, and
/// gives up after three retries (see the constants in `config.rs`).
///
/// # Errors
///
/// Returns the last error if every attempt fails.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} attempts: {}",
            TELEGRAM_API_MAX_RETRIES + 1,
            e
        );
        e
    })
}
