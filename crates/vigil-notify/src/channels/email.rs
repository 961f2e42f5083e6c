use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use serde_json::Value;
use vigil_common::types::{Agent, AlertRecord, AlertStatus};

#[derive(Deserialize)]
struct EmailConfig {
    smtp_host: String,
    smtp_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: String,
    #[serde(default)]
    recipients: Vec<String>,
}

#[derive(Debug)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    recipients: Vec<String>,
}

impl EmailChannel {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
        recipients: Vec<String>,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?.port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from.to_string(),
            recipients,
        })
    }

    /// Builds the channel from a stored configuration payload.
    pub fn from_payload(payload: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg: EmailConfig = serde_json::from_value(payload.clone())
            .map_err(|e| anyhow::anyhow!("Invalid email config: {e}"))?;
        if cfg.smtp_host.is_empty() || cfg.from.is_empty() {
            anyhow::bail!("Invalid email config: smtp_host and from are required");
        }
        Ok(Box::new(EmailChannel::new(
            &cfg.smtp_host,
            cfg.smtp_port.unwrap_or(587),
            cfg.username.as_deref(),
            cfg.password.as_deref(),
            &cfg.from,
            cfg.recipients,
        )?))
    }

    fn subject(record: &AlertRecord, agent: &Agent) -> String {
        match record.status {
            AlertStatus::Firing => {
                format!("[{}] {} alert on {}", record.level, record.alert_type, agent.name)
            }
            AlertStatus::Resolved => {
                format!("[resolved] {} alert on {}", record.alert_type, agent.name)
            }
        }
    }

    fn body(record: &AlertRecord, agent: &Agent) -> String {
        let mut lines = vec![
            format!("Agent: {} ({})", agent.name, record.agent_id),
            format!("Type: {}", record.alert_type),
            format!("Level: {}", record.level),
            format!("Status: {}", record.status),
            record.message.clone(),
            format!(
                "Threshold: {:.2}  Current: {:.2}",
                record.threshold, record.actual_value
            ),
        ];
        if !agent.location.is_empty() {
            lines.push(format!("Location: {}", agent.location));
        }
        lines.join("\n")
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    async fn send(&self, record: &AlertRecord, agent: &Agent) -> Result<()> {
        if self.recipients.is_empty() {
            return Ok(());
        }

        let subject = Self::subject(record, agent);
        let body = Self::body(record, agent);

        for recipient in &self.recipients {
            let message = Message::builder()
                .from(self.from.parse()?)
                .to(recipient.parse()?)
                .subject(subject.as_str())
                .header(ContentType::TEXT_PLAIN)
                .body(body.clone())?;
            self.transport.send(message).await?;
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "email"
    }
}
