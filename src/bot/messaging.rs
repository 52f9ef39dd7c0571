//! Reply delivery for Telegram.
//!
//! Replies go out as HTML split below the Telegram limit, reminders as
//! escaped `MarkdownV2`, notices as plain text. Every send is retried on
//! transient network errors.

use crate::relay::TurnOutcome;
use crate::utils;
use anyhow::Result;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, ParseMode};
use teloxide::utils::markdown;
use tracing::{debug, warn};

/// Maximum message length for Telegram with safety margin.
/// Telegram's official limit is 4096; the margin leaves room for italic tags
/// reopened across parts.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Send a message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let text = text.into();
    utils::retry_telegram_operation(|| async {
        let mut req = bot.send_message(chat_id, text.clone());
        if let Some(pm) = parse_mode {
            req = req.parse_mode(pm);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Sends formatted HTML, split into parts under [`TELEGRAM_MESSAGE_LIMIT`].
///
/// # Errors
///
/// Returns an error if any part fails to send.
pub async fn send_long_message(bot: &Bot, chat_id: ChatId, html: &str) -> Result<()> {
    let parts = utils::split_long_message(html, TELEGRAM_MESSAGE_LIMIT);
    debug!("Sending reply in {} part(s) to {chat_id}", parts.len());
    for part in parts {
        send_message_resilient(bot, chat_id, part, Some(ParseMode::Html)).await?;
    }
    Ok(())
}

/// The reminder escaped for `MarkdownV2`
#[must_use]
pub fn reminder_markdown(text: &str) -> String {
    markdown::escape(text)
}

/// Send the reply-length reminder
///
/// # Errors
///
/// Returns an error if the message fails to send.
pub async fn send_reminder(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    send_message_resilient(
        bot,
        chat_id,
        reminder_markdown(text),
        Some(ParseMode::MarkdownV2),
    )
    .await?;
    Ok(())
}

/// Wait `delay`, then deliver the result of a turn
///
/// # Errors
///
/// Returns an error if a message fails to send.
pub async fn deliver_outcome(
    bot: &Bot,
    chat_id: ChatId,
    outcome: TurnOutcome,
    delay: Duration,
) -> Result<()> {
    tokio::time::sleep(delay).await;
    match outcome {
        TurnOutcome::Reply { text, reminder } => {
            send_long_message(bot, chat_id, &text).await?;
            if let Some(reminder) = reminder {
                send_reminder(bot, chat_id, &reminder).await?;
            }
        }
        TurnOutcome::Failed { notice } => {
            send_message_resilient(bot, chat_id, notice, None).await?;
        }
    }
    Ok(())
}

/// Show a chat action such as "typing". Failures are logged and ignored.
///
/// Returns whether Telegram accepted the action.
pub async fn show_chat_action(bot: &Bot, chat_id: ChatId, action: ChatAction) -> bool {
    match bot.send_chat_action(chat_id, action).await {
        Ok(_) => true,
        Err(e) => {
            warn!("Failed to send chat action to {chat_id}: {e}");
            false
        }
    }
}
