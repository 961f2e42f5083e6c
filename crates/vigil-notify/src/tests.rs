use crate::channels::webhook::WebhookChannel;
use crate::channels::{BuiltinChannels, ChannelFactory};
use crate::manager::Notifier;
use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_common::types::{
    Agent, AlertKind, AlertLevel, AlertRecord, AlertStatus, NotificationChannelConfig,
};

fn make_record(status: AlertStatus) -> AlertRecord {
    AlertRecord {
        id: "rec-1".into(),
        agent_id: "a1".into(),
        agent_name: "web-01".into(),
        config_id: "c1".into(),
        config_name: "default".into(),
        alert_type: AlertKind::Cpu,
        message: "CPU usage above 80.00% for 10 s, currently 91.00%".into(),
        threshold: 80.0,
        actual_value: 91.0,
        level: AlertLevel::Info,
        status,
        fired_at: 1_700_000_000_000,
        resolved_at: None,
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_000_000,
    }
}

fn make_agent() -> Agent {
    Agent {
        id: "a1".into(),
        name: "web-01".into(),
        ..Agent::default()
    }
}

#[test]
fn webhook_template_placeholders_are_replaced() {
    let channel = WebhookChannel::new(
        "https://hooks.example.com/x",
        Some("{{agent_name}}: {{alert_type}} {{status}} at {{value}}%".into()),
    );
    let body = channel.render_body(&make_record(AlertStatus::Firing), &make_agent());
    assert_eq!(body, "web-01: cpu firing at 91.00%");
}

#[test]
fn webhook_default_body_is_json() {
    let channel = WebhookChannel::new("https://hooks.example.com/x", None);
    let body = channel.render_body(&make_record(AlertStatus::Resolved), &make_agent());
    let v: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["agentName"], "web-01");
    assert_eq!(v["status"], "resolved");
    assert_eq!(v["threshold"], 80.0);
}

#[test]
fn builtin_factory_knows_both_channel_types() {
    let factory = BuiltinChannels;
    let webhook = factory
        .build(
            "webhook",
            &serde_json::json!({"url": "https://hooks.example.com/x"}),
        )
        .unwrap();
    assert_eq!(webhook.channel_type(), "webhook");

    let email = factory
        .build(
            "email",
            &serde_json::json!({
                "smtp_host": "smtp.example.com",
                "from": "vigil@example.com",
                "recipients": ["ops@example.com"],
            }),
        )
        .unwrap();
    assert_eq!(email.channel_type(), "email");
}

#[test]
fn builtin_factory_rejects_unknown_channel_type() {
    let err = BuiltinChannels
        .build("carrier-pigeon", &serde_json::json!({}))
        .unwrap_err();
    assert!(err.to_string().contains("carrier-pigeon"));
}

#[test]
fn builtin_factory_validates_payload_before_building() {
    // Webhook without a URL must not produce a channel.
    assert!(BuiltinChannels
        .build("webhook", &serde_json::json!({"url": ""}))
        .is_err());
    assert!(BuiltinChannels.build("webhook", &serde_json::json!({})).is_err());
    // Email without a sender address is rejected too.
    assert!(BuiltinChannels
        .build("email", &serde_json::json!({"smtp_host": "smtp.example.com", "from": ""}))
        .is_err());
}

#[derive(Debug)]
struct CountingChannel {
    calls: Arc<AtomicUsize>,
    fail: bool,
}

#[async_trait]
impl NotificationChannel for CountingChannel {
    async fn send(&self, _record: &AlertRecord, _agent: &Agent) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("delivery refused");
        }
        Ok(())
    }

    fn channel_type(&self) -> &str {
        "counting"
    }
}

struct CountingFactory {
    calls: Arc<AtomicUsize>,
}

impl ChannelFactory for CountingFactory {
    fn build(
        &self,
        _channel_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(CountingChannel {
            calls: self.calls.clone(),
            fail: payload["fail"].as_bool().unwrap_or(false),
        }))
    }
}

fn channel_config(id: &str, enabled: bool, fail: bool) -> NotificationChannelConfig {
    NotificationChannelConfig {
        id: id.into(),
        name: id.into(),
        channel_type: "counting".into(),
        enabled,
        payload: serde_json::json!({"fail": fail}),
        created_at: 0,
        updated_at: 0,
    }
}

#[tokio::test]
async fn dispatch_delivers_to_enabled_channels_and_survives_failures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let notifier = Notifier::with_factory(Box::new(CountingFactory {
        calls: calls.clone(),
    }));

    let channels = vec![
        channel_config("ch-ok", true, false),
        channel_config("ch-fail", true, true),
        channel_config("ch-disabled", false, false),
    ];

    notifier
        .dispatch(&channels, &make_record(AlertStatus::Firing), &make_agent())
        .await;

    // Both enabled channels were invoked; the failing one did not abort the
    // fan-out or bubble an error.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dispatch_skips_channels_with_bad_payload() {
    let notifier = Notifier::new();

    let channels = vec![NotificationChannelConfig {
        id: "bad".into(),
        name: "bad".into(),
        channel_type: "webhook".into(),
        enabled: true,
        payload: serde_json::json!({}),
        created_at: 0,
        updated_at: 0,
    }];

    // Must not panic or error; the malformed channel is logged and skipped.
    notifier
        .dispatch(&channels, &make_record(AlertStatus::Firing), &make_agent())
        .await;
}
