use crate::bot::messaging::{deliver_outcome, send_message_resilient, show_chat_action};
use crate::config::{Settings, APOLOGY_TEXT, WELCOME_TEXT};
use crate::llm::ImageInput;
use crate::relay::ChatRelay;
use crate::utils::{retry_telegram_operation, truncate_str};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use teloxide::{
    net::Download,
    prelude::*,
    types::{ChatAction, ParseMode},
    utils::command::BotCommands,
};
use tracing::{error, info, warn};

// Helper function to get user name from Message
fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greet the user
    #[command(description = "Start the bot.")]
    Start,
    /// Forget the conversation
    #[command(description = "Clear chat history.")]
    Clear,
    /// Liveness probe
    #[command(description = "Check bot health.")]
    Healthcheck,
}

/// `/start` handler
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn start(bot: Bot, msg: Message) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(
        "User {user_id} ({}) initiated /start command.",
        get_user_name(&msg)
    );
    bot.send_message(msg.chat.id, WELCOME_TEXT)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Clear context handler
///
/// # Errors
///
/// Returns an error if the confirmation cannot be sent.
pub async fn clear(bot: Bot, msg: Message, relay: Arc<ChatRelay>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(
        "User {user_id} ({}) initiated context clear.",
        get_user_name(&msg)
    );

    match relay.clear(user_id).await {
        Ok(()) => {
            bot.send_message(msg.chat.id, "<b>Chat history cleared.</b>")
                .parse_mode(ParseMode::Html)
                .await?;
        }
        Err(e) => {
            error!("Error clearing chat history for user {user_id}: {e}");
            bot.send_message(msg.chat.id, "An error occurred while clearing chat history.")
                .await?;
        }
    }
    Ok(())
}

/// Healthcheck handler
///
/// # Errors
///
/// Returns an error if the healthcheck response cannot be sent.
pub async fn healthcheck(bot: Bot, msg: Message, relay: Arc<ChatRelay>) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!("Healthcheck command received from user {user_id}.");
    if let Err(e) = relay.store().check_connection().await {
        warn!("History backend check failed during healthcheck: {e}");
    }
    bot.send_message(msg.chat.id, "OK").await?;
    Ok(())
}

/// Text message handler
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    relay: Arc<ChatRelay>,
    settings: Arc<Settings>,
) -> Result<()> {
    let text = msg.text().unwrap_or_default();
    let user_id = get_user_id_safe(&msg);
    info!(
        "Handling message from user {user_id} ({}). Text: '{}'",
        get_user_name(&msg),
        truncate_str(text, 100)
    );

    show_chat_action(&bot, msg.chat.id, ChatAction::Typing).await;
    let outcome = relay.handle_text(user_id, text).await;
    deliver_outcome(&bot, msg.chat.id, outcome, settings.reply_delay()).await
}

/// Photo message handler. The largest size is described by the vision model
/// and relayed as text together with the caption.
///
/// # Errors
///
/// Returns an error if the reply cannot be sent.
pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    relay: Arc<ChatRelay>,
    settings: Arc<Settings>,
) -> Result<()> {
    let user_id = get_user_id_safe(&msg);
    info!(
        "Handling photo from user {user_id} ({}).",
        get_user_name(&msg)
    );

    if !relay.is_vision_available() {
        bot.send_message(
            msg.chat.id,
            "Photo support is disabled because the Gemini provider is not configured.",
        )
        .await?;
        return Ok(());
    }

    let photo = msg
        .photo()
        .and_then(|sizes| sizes.iter().max_by_key(|p| p.width * p.height))
        .ok_or_else(|| anyhow!("No photo found"))?;

    show_chat_action(&bot, msg.chat.id, ChatAction::UploadPhoto).await;

    let download = retry_telegram_operation(|| async {
        let file = bot.get_file(photo.file.id.clone()).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    })
    .await;

    let buffer = match download {
        Ok(buffer) => buffer,
        Err(e) => {
            error!("Failed to download photo from user {user_id}: {e}");
            send_message_resilient(&bot, msg.chat.id, APOLOGY_TEXT, None).await?;
            return Ok(());
        }
    };

    show_chat_action(&bot, msg.chat.id, ChatAction::Typing).await;
    let outcome = relay
        .handle_image(user_id, msg.caption(), ImageInput::jpeg(buffer))
        .await;
    deliver_outcome(&bot, msg.chat.id, outcome, settings.reply_delay()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/start", "bot").ok(), Some(Command::Start));
        assert_eq!(Command::parse("/clear", "bot").ok(), Some(Command::Clear));
        assert_eq!(
            Command::parse("/healthcheck", "bot").ok(),
            Some(Command::Healthcheck)
        );
        assert!(Command::parse("/unknown", "bot").is_err());
    }
}
