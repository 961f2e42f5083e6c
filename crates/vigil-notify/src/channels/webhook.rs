use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use vigil_common::types::{Agent, AlertRecord, AlertStatus};

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
    body_template: Option<String>,
}

#[derive(Debug)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    body_template: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: &str, body_template: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            body_template,
        }
    }

    /// Builds the channel from a stored configuration payload.
    pub fn from_payload(payload: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg: WebhookConfig = serde_json::from_value(payload.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        if cfg.url.is_empty() {
            anyhow::bail!("Invalid webhook config: url is required");
        }
        Ok(Box::new(WebhookChannel::new(&cfg.url, cfg.body_template)))
    }

    pub(crate) fn render_body(&self, record: &AlertRecord, agent: &Agent) -> String {
        let status = match record.status {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        };
        if let Some(template) = &self.body_template {
            template
                .replace("{{agent_id}}", &record.agent_id)
                .replace("{{agent_name}}", &agent.name)
                .replace("{{alert_type}}", &record.alert_type.to_string())
                .replace("{{message}}", &record.message)
                .replace("{{level}}", &record.level.to_string())
                .replace("{{status}}", status)
                .replace("{{value}}", &format!("{:.2}", record.actual_value))
                .replace("{{threshold}}", &format!("{:.2}", record.threshold))
        } else {
            serde_json::json!({
                "alertId": record.id,
                "agentId": record.agent_id,
                "agentName": agent.name,
                "alertType": record.alert_type.to_string(),
                "message": record.message,
                "level": record.level.to_string(),
                "status": status,
                "value": record.actual_value,
                "threshold": record.threshold,
                "firedAt": record.fired_at,
                "resolvedAt": record.resolved_at,
            })
            .to_string()
        }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, record: &AlertRecord, agent: &Agent) -> Result<()> {
        let body = self.render_body(record, agent);
        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned HTTP {status}");
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}
