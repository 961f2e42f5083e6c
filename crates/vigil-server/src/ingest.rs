use crate::alerts::AlertService;
use crate::registry::ConnectionRegistry;
use crate::stats::StatsAggregator;
use crate::traffic::TrafficService;
use std::sync::Arc;
use vigil_common::id::new_id;
use vigil_common::proto::{Frame, MetricsPayload, MonitorResultPayload};
use vigil_common::types::Metric;

/// Demultiplexes inbound agent frames into the store, the alert engine, the
/// traffic evaluator, and the stats roll-up.
pub struct IngestPipeline {
    store: Arc<dyn vigil_storage::Store>,
    registry: Arc<ConnectionRegistry>,
    alerts: Arc<AlertService>,
    traffic: Arc<TrafficService>,
    stats: Arc<StatsAggregator>,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn vigil_storage::Store>,
        registry: Arc<ConnectionRegistry>,
        alerts: Arc<AlertService>,
        traffic: Arc<TrafficService>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            store,
            registry,
            alerts,
            traffic,
            stats,
        }
    }

    /// Routes one inbound frame. Every failure is logged and swallowed;
    /// a bad sample must not kill the session.
    pub async fn handle_frame(&self, agent_id: &str, frame: Frame) {
        match frame {
            Frame::Metrics(payload) => self.handle_metrics(agent_id, payload).await,
            Frame::MonitorResult(payload) => self.handle_monitor_result(agent_id, payload),
            Frame::Heartbeat(_) => self.registry.touch(agent_id),
            Frame::MonitorConfig(_) => {
                tracing::warn!(agent_id, "Dropping server-bound MonitorConfig frame");
            }
        }
    }

    async fn handle_metrics(&self, agent_id: &str, payload: MetricsPayload) {
        let metric = Metric {
            id: new_id(),
            agent_id: agent_id.to_string(),
            timestamp: payload.timestamp,
            cpu: payload.cpu,
            memory: payload.memory,
            disk: payload.disk,
            bytes_recv_total: payload.bytes_recv_total.unwrap_or(0),
            ..Metric::default()
        };
        if let Err(e) = self.store.insert_metric(&metric) {
            tracing::error!(agent_id, error = %e, "Failed to persist system metric");
        }

        if let Err(e) = self
            .alerts
            .check_metrics(agent_id, payload.cpu, payload.memory, payload.disk)
            .await
        {
            tracing::error!(agent_id, error = %e, "Threshold check failed");
        }

        if let Some(recv_total) = payload.bytes_recv_total {
            if let Err(e) = self.traffic.update(agent_id, recv_total) {
                tracing::error!(agent_id, error = %e, "Traffic accounting failed");
            }
        }

        self.registry.touch(agent_id);
    }

    fn handle_monitor_result(&self, agent_id: &str, payload: MonitorResultPayload) {
        let metric = Metric {
            id: new_id(),
            agent_id: agent_id.to_string(),
            timestamp: payload.timestamp,
            monitor_name: payload.monitor_name.clone(),
            monitor_kind: Some(payload.kind),
            target: payload.target.clone(),
            status: Some(payload.status),
            response_time_ms: payload.response_time,
            error_message: payload.error_message.clone(),
            cert_expiry_time: payload.cert_expiry_time.unwrap_or(0),
            cert_days_left: payload.cert_days_left.unwrap_or(0),
            ..Metric::default()
        };
        if let Err(e) = self.store.insert_metric(&metric) {
            tracing::error!(
                agent_id,
                monitor_name = %payload.monitor_name,
                error = %e,
                "Failed to persist probe result"
            );
            return;
        }

        // Immediate roll-up so the pair's stats reflect this check without
        // waiting for the next aggregator sweep.
        if let Err(e) = self.stats.refresh_pair(
            agent_id,
            &payload.monitor_name,
            Some(payload.kind),
            &payload.target,
        ) {
            tracing::error!(
                agent_id,
                monitor_name = %payload.monitor_name,
                error = %e,
                "Failed to refresh monitor stats"
            );
        }

        self.registry.touch(agent_id);
    }
}
