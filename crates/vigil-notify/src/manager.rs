use crate::channels::{BuiltinChannels, ChannelFactory};
use futures::future::join_all;
use vigil_common::types::{Agent, AlertRecord, NotificationChannelConfig};

/// Fans one alert record out to a set of channel configurations.
///
/// Channel instances are built per dispatch from their stored payloads, so
/// operator edits take effect on the next alert without a reload step.
pub struct Notifier {
    factory: Box<dyn ChannelFactory>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            factory: Box::new(BuiltinChannels),
        }
    }

    /// Swaps the channel factory; used by tests to observe deliveries
    /// without network endpoints.
    pub fn with_factory(factory: Box<dyn ChannelFactory>) -> Self {
        Self { factory }
    }

    /// Delivers `record` through every enabled channel concurrently.
    ///
    /// Failures (bad payloads, unreachable endpoints) are logged per channel
    /// and swallowed: the record is already persisted and visible in the UI
    /// even when every push channel is down.
    pub async fn dispatch(
        &self,
        channels: &[NotificationChannelConfig],
        record: &AlertRecord,
        agent: &Agent,
    ) {
        let mut deliveries = Vec::new();

        for cfg in channels.iter().filter(|c| c.enabled) {
            let channel = match self.factory.build(&cfg.channel_type, &cfg.payload) {
                Ok(channel) => channel,
                Err(e) => {
                    tracing::error!(
                        channel_id = %cfg.id,
                        channel_type = %cfg.channel_type,
                        error = %e,
                        "Failed to build notification channel, skipping"
                    );
                    continue;
                }
            };

            let channel_id = cfg.id.clone();
            deliveries.push(async move {
                if let Err(e) = channel.send(record, agent).await {
                    tracing::error!(
                        channel_id = %channel_id,
                        channel_type = channel.channel_type(),
                        error = %e,
                        "Failed to deliver notification"
                    );
                } else {
                    tracing::debug!(
                        channel_id = %channel_id,
                        channel_type = channel.channel_type(),
                        alert_id = %record.id,
                        "Notification delivered"
                    );
                }
            });
        }

        join_all(deliveries).await;
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
