//! Minimal HTTP endpoint running next to the bot
//!
//! `GET /` answers with a welcome line. `POST /webhook` accepts
//! `{ "userId", "message" }` and acknowledges it without processing.

use axum::{http::StatusCode, routing::get, routing::post, Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::info;

/// Body of `POST /webhook`
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Sender; external callers send either a number or a string
    #[serde(rename = "userId")]
    pub user_id: WebhookUserId,
    /// Message text
    pub message: String,
}

/// User identifier as sent by webhook callers
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WebhookUserId {
    /// Numeric identifier
    Number(i64),
    /// Textual identifier
    Text(String),
}

async fn root() -> &'static str {
    "Welcome to the Telegram bot server!"
}

async fn webhook(Json(payload): Json<WebhookPayload>) -> (StatusCode, &'static str) {
    info!(
        "Webhook message from {:?}: {}",
        payload.user_id,
        crate::utils::truncate_str(&payload.message, 100)
    );
    (StatusCode::OK, "OK")
}

/// Routes of the HTTP endpoint
pub fn app() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/webhook", post(webhook))
}

/// Serve [`app`] on all interfaces at `port` until the task is dropped
///
/// # Errors
///
/// Returns an error if the port cannot be bound.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app()).await?;
    Ok(())
}
