//! Notification channels
//!
//! Every channel exposes `send(destination, alert)`. What a destination is
//! depends on the channel: a webhook URL for Discord and plain webhooks, a
//! chat id for Telegram.

pub mod discord;
pub mod telegram;
pub mod webhook;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::Alert;
use crate::config::AlertSettings;

pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug)]
pub enum ChannelError {
    Http(reqwest::Error),
    /// The endpoint answered with a non-success status
    Rejected { status: u16, body: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Http(err) => write!(f, "request failed: {err}"),
            ChannelError::Rejected { status, body } => {
                write!(f, "rejected with status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::Http(err) => Some(err),
            ChannelError::Rejected { .. } => None,
        }
    }
}

impl From<reqwest::Error> for ChannelError {
    fn from(err: reqwest::Error) -> Self {
        ChannelError::Http(err)
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, destination: &str, alert: &Alert) -> ChannelResult<()>;
}

/// Turn a non-success response into [`ChannelError::Rejected`]
pub(crate) async fn check_response(response: reqwest::Response) -> ChannelResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// A channel paired with where it delivers to
#[derive(Clone)]
pub struct ChannelRoute {
    pub channel: Arc<dyn NotificationChannel>,
    pub destination: String,
}

impl fmt::Debug for ChannelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRoute")
            .field("channel", &self.channel.name())
            .field("destination", &self.destination)
            .finish()
    }
}

/// One route per enabled, fully configured channel
pub fn routes_from_settings(settings: &AlertSettings, client: &Client) -> Vec<ChannelRoute> {
    let mut routes = Vec::new();

    if let Some(discord) = &settings.discord {
        routes.push(ChannelRoute {
            channel: Arc::new(DiscordNotifier::new(client.clone(), discord.user_id.clone())),
            destination: discord.url.clone(),
        });
    }

    if let Some(webhook) = &settings.webhook {
        routes.push(ChannelRoute {
            channel: Arc::new(WebhookNotifier::new(client.clone())),
            destination: webhook.url.clone(),
        });
    }

    if let Some(telegram) = &settings.telegram {
        routes.push(ChannelRoute {
            channel: Arc::new(TelegramNotifier::new(
                client.clone(),
                &telegram.api_base,
                &telegram.bot_token,
            )),
            destination: telegram.chat_id.clone(),
        });
    }

    routes
}
