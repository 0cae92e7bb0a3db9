use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{ChannelResult, NotificationChannel, check_response};
use crate::Alert;

/// Sends plain text through the Telegram Bot API. The destination is a chat id.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
}

impl std::fmt::Debug for TelegramNotifier {
    // the endpoint embeds the bot token
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier").finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    pub fn new(client: Client, api_base: &str, bot_token: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/bot{bot_token}/sendMessage", api_base.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    #[instrument(skip(self, alert), fields(device = %alert.device_name))]
    async fn send(&self, destination: &str, alert: &Alert) -> ChannelResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "chat_id": destination,
                "text": alert.message,
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;
        check_response(response).await?;
        info!("Successfully sent Telegram message");
        Ok(())
    }
}
