use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use vigil_common::id::now_millis;
use vigil_common::types::{Metric, MonitorKind, MonitorStats, ProbeStatus};
use vigil_storage::{Result, Store};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const MONTH_MS: i64 = 30 * DAY_MS;

/// Rolls raw probe metrics into per-(agent, monitor) 24 h / 30 d statistics.
///
/// Runs as a periodic background pass over every enabled monitor and its
/// eligible online agents; ingest additionally refreshes a single pair the
/// moment its probe result arrives, so dashboards track the latest check
/// without waiting for the next sweep.
pub struct StatsAggregator {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn Store>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Periodic driver; ends when the shutdown signal flips.
    pub async fn run(&self, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs, "Stats aggregator started");
        let mut tick = interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.aggregate_all() {
                        tracing::error!(error = %e, "Stats aggregation pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Stats aggregator stopped");
                    return;
                }
            }
        }
    }

    /// One full pass over enabled monitors × eligible online agents.
    pub fn aggregate_all(&self) -> Result<()> {
        let monitors = self.store.list_enabled_monitors()?;
        if monitors.is_empty() {
            return Ok(());
        }
        let online = self.registry.online_agents();

        for monitor in &monitors {
            let eligible: Vec<&String> = if monitor.agent_ids.is_empty() {
                online.iter().collect()
            } else {
                monitor
                    .agent_ids
                    .iter()
                    .filter(|id| online.contains(id))
                    .collect()
            };

            for agent_id in eligible {
                if let Err(e) =
                    self.refresh_pair(agent_id, &monitor.name, Some(monitor.kind), &monitor.target)
                {
                    tracing::error!(
                        agent_id = %agent_id,
                        monitor_name = %monitor.name,
                        error = %e,
                        "Failed to roll up monitor stats"
                    );
                }
            }
        }
        Ok(())
    }

    /// Recomputes and upserts the stats row for one (agent, monitor) pair.
    pub fn refresh_pair(
        &self,
        agent_id: &str,
        monitor_name: &str,
        kind: Option<MonitorKind>,
        target: &str,
    ) -> Result<()> {
        let now = now_millis();
        let metrics_24h = self
            .store
            .query_monitor_metrics(agent_id, monitor_name, now - DAY_MS, now)?;
        let metrics_30d = self
            .store
            .query_monitor_metrics(agent_id, monitor_name, now - MONTH_MS, now)?;

        let stats = build_stats(
            agent_id,
            monitor_name,
            kind,
            target,
            &metrics_24h,
            &metrics_30d,
            now,
        );
        self.store.upsert_monitor_stats(&stats)
    }
}

/// Pure roll-up over two windows of probe rows (each ordered by timestamp).
///
/// Response averages count only Up samples; uptime is success over total as
/// a percent, 0 when the window is empty. Certificate fields come from the
/// newest sample that carries them.
fn build_stats(
    agent_id: &str,
    monitor_name: &str,
    kind: Option<MonitorKind>,
    target: &str,
    metrics_24h: &[Metric],
    metrics_30d: &[Metric],
    now_ms: i64,
) -> MonitorStats {
    let mut stats = MonitorStats {
        agent_id: agent_id.to_string(),
        monitor_name: monitor_name.to_string(),
        monitor_kind: kind,
        target: target.to_string(),
        updated_at: now_ms,
        ..MonitorStats::default()
    };

    if let Some(last) = metrics_24h.last() {
        let mut success_count = 0i64;
        let mut response_sum = 0i64;
        for metric in metrics_24h {
            if metric.status == Some(ProbeStatus::Up) {
                success_count += 1;
                response_sum += metric.response_time_ms;
            }
        }

        stats.total_checks_24h = metrics_24h.len() as i64;
        stats.success_checks_24h = success_count;
        if success_count > 0 {
            stats.avg_response_24h = response_sum / success_count;
        }
        if stats.total_checks_24h > 0 {
            stats.uptime_24h = success_count as f64 / stats.total_checks_24h as f64 * 100.0;
        }

        stats.current_response = last.response_time_ms;
        stats.last_check_time = last.timestamp;
        stats.last_check_status = last.status;

        if let Some(cert) = metrics_24h.iter().rev().find(|m| m.cert_expiry_time > 0) {
            stats.cert_expiry_date = cert.cert_expiry_time;
            stats.cert_expiry_days = cert.cert_days_left;
        }
    }

    if !metrics_30d.is_empty() {
        let success_count = metrics_30d
            .iter()
            .filter(|m| m.status == Some(ProbeStatus::Up))
            .count() as i64;
        stats.total_checks_30d = metrics_30d.len() as i64;
        stats.success_checks_30d = success_count;
        stats.uptime_30d = success_count as f64 / stats.total_checks_30d as f64 * 100.0;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use vigil_common::id::new_id;
    use vigil_common::types::{Agent, MonitorTask, Visibility};
    use vigil_storage::sqlite::SqliteStore;

    fn probe(status: ProbeStatus, response_ms: i64, ts: i64) -> Metric {
        Metric {
            id: new_id(),
            agent_id: "a1".into(),
            timestamp: ts,
            monitor_name: "api".into(),
            monitor_kind: Some(MonitorKind::Https),
            target: "https://example.com".into(),
            status: Some(status),
            response_time_ms: response_ms,
            ..Metric::default()
        }
    }

    #[test]
    fn averages_ignore_down_samples() {
        let now = now_millis();
        let rows = vec![
            probe(ProbeStatus::Up, 100, now - 3000),
            probe(ProbeStatus::Down, 9999, now - 2000),
            probe(ProbeStatus::Up, 300, now - 1000),
        ];
        let stats = build_stats("a1", "api", Some(MonitorKind::Https), "t", &rows, &rows, now);

        assert_eq!(stats.total_checks_24h, 3);
        assert_eq!(stats.success_checks_24h, 2);
        assert_eq!(stats.avg_response_24h, 200);
        assert!((stats.uptime_24h - 66.666).abs() < 0.01);
        assert!(stats.uptime_24h >= 0.0 && stats.uptime_24h <= 100.0);
    }

    #[test]
    fn empty_windows_produce_zeroes() {
        let stats = build_stats("a1", "api", None, "t", &[], &[], now_millis());
        assert_eq!(stats.total_checks_24h, 0);
        assert_eq!(stats.uptime_24h, 0.0);
        assert_eq!(stats.uptime_30d, 0.0);
        assert_eq!(stats.last_check_time, 0);
        assert!(stats.last_check_status.is_none());
    }

    #[test]
    fn uptime_is_bounded_and_exact_for_all_up() {
        let now = now_millis();
        let rows: Vec<Metric> = (0..10)
            .map(|i| probe(ProbeStatus::Up, 50, now - i * 1000))
            .collect();
        let stats = build_stats("a1", "api", None, "t", &rows, &rows, now);
        assert!((stats.uptime_24h - 100.0).abs() < f64::EPSILON);
        assert!((stats.uptime_30d - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cert_fields_come_from_latest_carrying_sample() {
        let now = now_millis();
        let mut with_cert = probe(ProbeStatus::Up, 100, now - 5000);
        with_cert.cert_expiry_time = now + 80 * DAY_MS;
        with_cert.cert_days_left = 80;
        let mut newer_with_cert = probe(ProbeStatus::Up, 110, now - 2000);
        newer_with_cert.cert_expiry_time = now + 79 * DAY_MS;
        newer_with_cert.cert_days_left = 79;
        // Newest sample has no certificate payload (e.g. probe failed
        // before the handshake).
        let rows = vec![
            with_cert,
            newer_with_cert,
            probe(ProbeStatus::Down, 0, now - 1000),
        ];

        let stats = build_stats("a1", "api", Some(MonitorKind::Https), "t", &rows, &rows, now);
        assert_eq!(stats.cert_expiry_days, 79);
        assert_eq!(stats.last_check_status, Some(ProbeStatus::Down));
    }

    #[test]
    fn last_check_fields_track_newest_sample() {
        let now = now_millis();
        let rows = vec![
            probe(ProbeStatus::Up, 100, now - 2000),
            probe(ProbeStatus::Up, 250, now - 1000),
        ];
        let stats = build_stats("a1", "api", None, "t", &rows, &rows, now);
        assert_eq!(stats.current_response, 250);
        assert_eq!(stats.last_check_time, now - 1000);
    }

    #[tokio::test]
    async fn aggregate_all_upserts_for_online_eligible_agents() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let registry = Arc::new(ConnectionRegistry::new(store.clone()));
        let aggregator = StatsAggregator::new(store.clone(), registry.clone());

        for id in ["a1", "a2"] {
            store
                .register_agent(&Agent {
                    id: id.into(),
                    name: id.into(),
                    ..Agent::default()
                })
                .unwrap();
        }
        let now = now_millis();
        store
            .create_monitor(&MonitorTask {
                id: new_id(),
                name: "api".into(),
                kind: MonitorKind::Https,
                target: "https://example.com".into(),
                description: String::new(),
                enabled: true,
                interval_secs: 60,
                agent_ids: vec![],
                http: None,
                tcp: None,
                visibility: Visibility::Public,
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        store.insert_metric(&probe(ProbeStatus::Up, 120, now - 1000)).unwrap();

        // Only a1 is online.
        let (tx, _rx) = mpsc::channel(8);
        registry.register("a1", tx);

        aggregator.aggregate_all().unwrap();

        let rows = store.list_monitor_stats("api").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agent_id, "a1");
        assert_eq!(rows[0].total_checks_24h, 1);
        assert!((rows[0].uptime_24h - 100.0).abs() < f64::EPSILON);
    }
}
