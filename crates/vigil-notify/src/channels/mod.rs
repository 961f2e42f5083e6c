pub mod email;
pub mod webhook;

use crate::NotificationChannel;
use anyhow::Result;
use serde_json::Value;

/// Builds a concrete delivery channel from a stored configuration row's
/// type name and JSON payload.
///
/// The seam exists so dispatch can be exercised without touching the
/// network; everything outside tests uses [`BuiltinChannels`].
pub trait ChannelFactory: Send + Sync {
    fn build(&self, channel_type: &str, payload: &Value) -> Result<Box<dyn NotificationChannel>>;
}

/// The channel types vigil ships: `webhook` and `email`.
pub struct BuiltinChannels;

impl ChannelFactory for BuiltinChannels {
    fn build(&self, channel_type: &str, payload: &Value) -> Result<Box<dyn NotificationChannel>> {
        match channel_type {
            "webhook" => webhook::WebhookChannel::from_payload(payload),
            "email" => email::EmailChannel::from_payload(payload),
            other => Err(anyhow::anyhow!("unsupported channel type: {other}")),
        }
    }
}
