use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{ChannelResult, NotificationChannel, check_response};
use crate::Alert;

/// Posts a flat JSON document to any HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn payload(alert: &Alert) -> serde_json::Value {
        json!({
            "message": alert.message,
            "device": alert.device_name,
            "device_kind": alert.device_kind,
            "address": alert.address,
            "kind": alert.kind,
            "timestamp": alert.timestamp.to_rfc3339(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, destination, alert), fields(device = %alert.device_name))]
    async fn send(&self, destination: &str, alert: &Alert) -> ChannelResult<()> {
        let response = self
            .client
            .post(destination)
            .json(&Self::payload(alert))
            .send()
            .await?;
        check_response(response).await?;
        info!("Successfully sent webhook alert");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{AlertKind, TargetKind};

    #[tokio::test]
    async fn test_posts_message_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/noc"))
            .and(body_partial_json(json!({
                "message": "Tower 3 (10.9.0.1) is DOWN",
                "device_kind": "tower",
                "kind": "down",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let alert = Alert {
            device_kind: TargetKind::Tower,
            device_name: "Tower 3".to_string(),
            address: "10.9.0.1".to_string(),
            kind: AlertKind::Down,
            message: "Tower 3 (10.9.0.1) is DOWN".to_string(),
            timestamp: Utc::now(),
            suppressed: false,
        };

        WebhookNotifier::new(Client::new())
            .send(&format!("{}/noc", server.uri()), &alert)
            .await
            .unwrap();
    }
}
