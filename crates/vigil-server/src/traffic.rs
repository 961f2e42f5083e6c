use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;
use vigil_alert::traffic;
use vigil_common::id::{new_id, now_millis};
use vigil_common::types::{
    format_bytes, Agent, AlertKind, AlertRecord, AlertStatus,
};
use vigil_storage::{Result, Store};

/// Cumulative per-agent traffic accounting with graduated quota alerts.
///
/// Invoked on every net-metric arrival; the accounting arithmetic itself
/// lives in [`vigil_alert::traffic`], this service loads the agent row,
/// persists the updated block, and writes records for newly crossed
/// thresholds.
pub struct TrafficService {
    store: Arc<dyn Store>,
}

impl TrafficService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Folds one monotonic receive-counter sample into the agent's quota
    /// accounting.
    pub fn update(&self, agent_id: &str, current_recv: u64) -> Result<()> {
        let mut agent = self.store.get_agent(agent_id)?;
        let now = now_millis();

        let previous_baseline = agent.traffic_baseline_recv;
        if !traffic::apply_sample(&mut agent, current_recv, now) {
            return Ok(());
        }
        if current_recv < previous_baseline {
            tracing::warn!(
                agent_id,
                baseline = previous_baseline,
                current = current_recv,
                "Traffic counter regressed, assuming agent restart"
            );
        }

        for threshold in traffic::crossed_thresholds(&mut agent) {
            self.write_threshold_record(&agent, threshold.percent(), threshold.level(), now);
        }

        agent.updated_at = now;
        self.store.update_agent_traffic(&agent)
    }

    fn write_threshold_record(
        &self,
        agent: &Agent,
        threshold_pct: u32,
        level: vigil_common::types::AlertLevel,
        now_ms: i64,
    ) {
        let pct = traffic::usage_percent(agent);
        let record = AlertRecord {
            id: new_id(),
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            config_id: String::new(),
            config_name: String::new(),
            alert_type: AlertKind::Traffic,
            message: format!(
                "Traffic usage reached {}%, currently {:.2}% ({} / {})",
                threshold_pct,
                pct,
                format_bytes(agent.traffic_used),
                format_bytes(agent.traffic_limit)
            ),
            threshold: threshold_pct as f64,
            actual_value: pct,
            level,
            status: AlertStatus::Firing,
            fired_at: now_ms,
            resolved_at: None,
            created_at: now_ms,
            updated_at: now_ms,
        };

        if let Err(e) = self.store.insert_alert_record(&record) {
            tracing::error!(
                agent_id = %agent.id,
                threshold_pct,
                error = %e,
                "Failed to write traffic alert record"
            );
            return;
        }
        tracing::info!(
            agent_id = %agent.id,
            agent_name = %agent.name,
            threshold_pct,
            actual_pct = pct,
            "Traffic alert recorded"
        );
    }

    /// Daily sweep: agents whose reset day-of-month is today and whose
    /// current period started on an earlier day begin a fresh period,
    /// clearing usage and re-arming the threshold alerts.
    ///
    /// Returns the number of agents reset.
    pub fn reset_due_periods(&self, now: DateTime<Utc>) -> Result<usize> {
        let today = now.day();
        let now_ms = now.timestamp_millis();
        let since_midnight_ms = i64::from(now.time().num_seconds_from_midnight()) * 1000;
        let day_start_ms = now_ms - since_midnight_ms;

        let mut reset_count = 0;
        for mut agent in self.store.list_agents(None)? {
            if agent.traffic_reset_day == 0 || agent.traffic_reset_day != today {
                continue;
            }
            // Unseeded periods have nothing to reset; periods started today
            // were already reset this sweep cycle.
            if agent.traffic_period_start == 0 || agent.traffic_period_start >= day_start_ms {
                continue;
            }

            traffic::reset_period(&mut agent);
            agent.updated_at = now_ms;
            if let Err(e) = self.store.update_agent_traffic(&agent) {
                tracing::error!(agent_id = %agent.id, error = %e, "Failed to reset traffic period");
                continue;
            }
            tracing::info!(agent_id = %agent.id, agent_name = %agent.name, "Traffic period reset");
            reset_count += 1;
        }
        Ok(reset_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vigil_common::types::AlertLevel;
    use vigil_storage::sqlite::SqliteStore;

    fn setup() -> (Arc<SqliteStore>, TrafficService) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TrafficService::new(store.clone());
        (store, service)
    }

    fn seed_quota_agent(store: &SqliteStore, id: &str, limit: u64, reset_day: u32) {
        let mut agent = Agent {
            id: id.to_string(),
            name: format!("{id}-name"),
            ..Agent::default()
        };
        store.register_agent(&agent).unwrap();
        agent.traffic_limit = limit;
        agent.traffic_reset_day = reset_day;
        store.update_agent(&agent).unwrap();
    }

    #[test]
    fn counter_reset_does_not_lose_usage() {
        let (store, service) = setup();
        seed_quota_agent(&store, "a1", 0, 1);

        for sample in [1000u64, 1500, 2000, 100, 300] {
            service.update("a1", sample).unwrap();
        }

        let agent = store.get_agent("a1").unwrap();
        assert_eq!(agent.traffic_used, 1200);
        assert_eq!(agent.traffic_baseline_recv, 300);
    }

    #[test]
    fn ladder_produces_one_record_per_threshold() {
        let (store, service) = setup();
        seed_quota_agent(&store, "a1", 1000, 0);

        for sample in [0u64, 810, 910, 1010] {
            service.update("a1", sample).unwrap();
        }

        let records = store.list_alert_records(Some("a1"), 10, 0).unwrap();
        assert_eq!(records.len(), 3);
        // Listing is newest-first; the ladder fired info → warning → critical.
        let levels: Vec<AlertLevel> = records.iter().rev().map(|r| r.level).collect();
        assert_eq!(
            levels,
            vec![AlertLevel::Info, AlertLevel::Warning, AlertLevel::Critical]
        );
        assert!(records.iter().all(|r| r.alert_type == AlertKind::Traffic));

        // Flags latched: further samples add no records.
        service.update("a1", 1200).unwrap();
        assert_eq!(store.list_alert_records(Some("a1"), 10, 0).unwrap().len(), 3);
    }

    #[test]
    fn agents_without_quota_are_skipped() {
        let (store, service) = setup();
        seed_quota_agent(&store, "a1", 0, 0);

        service.update("a1", 123_456).unwrap();
        let agent = store.get_agent("a1").unwrap();
        assert_eq!(agent.traffic_used, 0);
        assert_eq!(agent.traffic_baseline_recv, 0);
        assert!(store.list_alert_records(Some("a1"), 10, 0).unwrap().is_empty());
    }

    #[test]
    fn reset_sweep_rearms_alerts_on_reset_day() {
        let (store, service) = setup();
        seed_quota_agent(&store, "a1", 1000, 15);
        seed_quota_agent(&store, "a2", 1000, 20);

        service.update("a1", 0).unwrap();
        service.update("a1", 950).unwrap();
        service.update("a2", 0).unwrap();
        assert!(store.get_agent("a1").unwrap().traffic_alert_sent_90);

        // Pin both agents' periods to the 1st so they predate the sweep day.
        for id in ["a1", "a2"] {
            let mut agent = store.get_agent(id).unwrap();
            agent.traffic_period_start = Utc
                .with_ymd_and_hms(2026, 3, 1, 0, 0, 0)
                .unwrap()
                .timestamp_millis();
            store.update_agent_traffic(&agent).unwrap();
        }

        let sweep_time = Utc.with_ymd_and_hms(2026, 3, 15, 2, 30, 0).unwrap();
        let reset = service.reset_due_periods(sweep_time).unwrap();
        assert_eq!(reset, 1, "only the agent whose reset day is the 15th");

        let agent = store.get_agent("a1").unwrap();
        assert_eq!(agent.traffic_used, 0);
        assert!(!agent.traffic_alert_sent_80);
        assert!(!agent.traffic_alert_sent_90);
        assert_eq!(agent.traffic_period_start, 0);

        // Re-running the sweep the same day is a no-op.
        assert_eq!(service.reset_due_periods(sweep_time).unwrap(), 0);

        // a2 untouched.
        let other = store.get_agent("a2").unwrap();
        assert_ne!(other.traffic_period_start, 0);
    }
}
