//! Notification delivery for alert records.
//!
//! Alert records are fanned out to every enabled channel configuration;
//! each configuration names a channel type, and the
//! [`channels::ChannelFactory`] turns it plus its JSON payload into a
//! concrete [`NotificationChannel`]. Two channel types ship: webhook and
//! email (SMTP). Delivery is best-effort: failures are logged and never
//! propagate to the alerting path, which has already persisted the record.

pub mod channels;
pub mod manager;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::{Agent, AlertRecord};

/// A delivery channel pushing one alert record to an external service.
#[async_trait]
pub trait NotificationChannel: Send + Sync + std::fmt::Debug {
    /// Delivers the record. The agent it concerns is passed along so
    /// channels can render its display name and location.
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; the dispatcher logs it and
    /// moves on.
    async fn send(&self, record: &AlertRecord, agent: &Agent) -> Result<()>;

    /// Channel type name (e.g. `"webhook"`, `"email"`).
    fn channel_type(&self) -> &str;
}
