use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use super::{ChannelResult, NotificationChannel, check_response};
use crate::{Alert, AlertKind};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const GREEN: u32 = 3066993;
const BLUE: u32 = 5793266;

fn title_and_color(kind: AlertKind) -> (&'static str, u32) {
    match kind {
        AlertKind::Down => ("🔴 Device Down", RED),
        AlertKind::Recovered => ("✅ Device Recovered", GREEN),
        AlertKind::MaxIn => ("📥 Inbound Traffic Threshold", ORANGE),
        AlertKind::MaxOut => ("📤 Outbound Traffic Threshold", ORANGE),
        AlertKind::LowVoltage => ("🔋 Low Voltage", RED),
        AlertKind::LatencyAnomaly => ("📈 Latency Anomaly", ORANGE),
        AlertKind::Capacity => ("📊 Capacity Forecast", BLUE),
    }
}

pub fn build_alert_embed(alert: &Alert) -> Embed {
    let (title, color) = title_and_color(alert.kind);

    Embed {
        title: Some(title.to_string()),
        description: Some(alert.message.clone()),
        color: Some(color),
        fields: vec![
            EmbedField {
                name: "Device".to_string(),
                value: alert.device_name.clone(),
                inline: true,
            },
            EmbedField {
                name: "Address".to_string(),
                value: format!("`{}`", alert.address),
                inline: true,
            },
        ],
        footer: Some(EmbedFooter {
            text: format!("{} | {}", alert.device_kind, alert.kind),
        }),
        timestamp: Some(alert.timestamp.to_rfc3339()),
    }
}

/// Posts rich embeds to a Discord webhook URL
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    user_id: Option<String>,
}

impl DiscordNotifier {
    pub fn new(client: Client, user_id: Option<String>) -> Self {
        Self { client, user_id }
    }

    pub fn build_message(&self, alert: &Alert) -> Message {
        let mut builder = MessageBuilder::new().add_embed(build_alert_embed(alert));
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!("{} <@{user_id}>", alert.device_name));
        }
        builder.build()
    }
}

#[async_trait]
impl NotificationChannel for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    #[instrument(skip(self, destination, alert), fields(device = %alert.device_name))]
    async fn send(&self, destination: &str, alert: &Alert) -> ChannelResult<()> {
        let response = self
            .client
            .post(destination)
            .json(&self.build_message(alert))
            .send()
            .await?;
        check_response(response).await?;
        info!("Successfully sent Discord message");
        Ok(())
    }
}
