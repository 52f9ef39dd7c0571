use crate::bot::access::AccessGate;
use crate::bot::handlers::{self, get_user_id_safe, Command};
use crate::config::Settings;
use crate::llm::LlmClient;
use crate::relay::ChatRelay;
use crate::{server, storage};
use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{error, info, warn};

/// Run the bot and the HTTP endpoint until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the history store cannot be initialized.
pub async fn run_bot(settings: Arc<Settings>) -> Result<()> {
    let store = storage::init_history_store(&settings).await?;
    match store.check_connection().await {
        Ok(()) => info!("History store initialized ({:?}).", settings.history_backend),
        Err(e) => error!("History store connection check returned error: {e}"),
    }

    let llm = Arc::new(LlmClient::new(&settings));
    info!("LLM Client initialized.");

    let relay = Arc::new(ChatRelay::from_settings(&settings, store, llm));
    let gate = Arc::new(AccessGate::from_settings(&settings));
    if gate.is_open() {
        warn!("ALLOWED_USERS is empty: the bot answers everyone.");
    }

    let port = settings.port;
    let http = tokio::spawn(async move {
        if let Err(e) = server::serve(port).await {
            error!("HTTP server stopped: {e}");
        }
    });

    let bot = Bot::new(settings.telegram_token.clone());
    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![relay, settings, gate])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    http.abort();
    info!("Bot stopped.");
    Ok(())
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::filter(|msg: Message, gate: Arc<AccessGate>| {
                gate.allows(get_user_id_safe(&msg))
            })
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text))
            .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo)),
        )
        .branch(
            dptree::filter(|msg: Message, gate: Arc<AccessGate>| {
                !gate.allows(get_user_id_safe(&msg))
            })
            .endpoint(handle_unauthorized),
        )
}

async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    gate: Arc<AccessGate>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    if gate.should_notify(user_id).await {
        info!("Unauthorized access from user {user_id}. Sending denial message.");
        if let Err(e) = bot.send_message(msg.chat.id, "Access denied").await {
            error!("Failed to send access denied message to {user_id}: {e}");
        }
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    relay: Arc<ChatRelay>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg).await,
        Command::Clear => handlers::clear(bot, msg, relay).await,
        Command::Healthcheck => handlers::healthcheck(bot, msg, relay).await,
    };
    if let Err(e) = res {
        error!("Command error: {e}");
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    relay: Arc<ChatRelay>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_text(bot, msg, relay, settings).await {
        error!("Text handler error: {e}");
    }
    respond(())
}

async fn handle_photo(
    bot: Bot,
    msg: Message,
    relay: Arc<ChatRelay>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::handle_photo(bot, msg, relay, settings).await {
        error!("Photo handler error: {e}");
    }
    respond(())
}
