use std::sync::{Arc, Mutex, MutexGuard};
use vigil_alert::threshold::{ThresholdEvaluator, Transition};
use vigil_common::id::{new_id, now_millis};
use vigil_common::types::{
    Agent, AlertConfig, AlertKind, AlertLevel, AlertRecord, AlertStatus, ThresholdRule,
    GLOBAL_AGENT_ID,
};
use vigil_notify::manager::Notifier;
use vigil_storage::{Result, Store};

/// Evaluates global threshold rules against live agent metrics and owns the
/// resulting record lifecycle: insert on fire, update-in-place on resolve,
/// notification fan-out for both.
pub struct AlertService {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    evaluator: Mutex<ThresholdEvaluator>,
}

impl AlertService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<Notifier>) -> Self {
        Self {
            store,
            notifier,
            evaluator: Mutex::new(ThresholdEvaluator::new()),
        }
    }

    fn lock_evaluator(&self) -> MutexGuard<'_, ThresholdEvaluator> {
        self.evaluator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Feeds one `(cpu, memory, disk)` sample through every enabled global
    /// rule set.
    pub async fn check_metrics(
        &self,
        agent_id: &str,
        cpu: f64,
        memory: f64,
        disk: f64,
    ) -> Result<()> {
        self.check_metrics_at(agent_id, cpu, memory, disk, now_millis())
            .await
    }

    /// Same as [`check_metrics`](Self::check_metrics) with an explicit
    /// observation time, which is also the fired/resolved timestamp on any
    /// resulting records.
    pub async fn check_metrics_at(
        &self,
        agent_id: &str,
        cpu: f64,
        memory: f64,
        disk: f64,
        now_ms: i64,
    ) -> Result<()> {
        let configs = self.store.list_enabled_alert_configs(GLOBAL_AGENT_ID)?;
        if configs.is_empty() {
            return Ok(());
        }
        let agent = self.store.get_agent(agent_id)?;

        for config in &configs {
            let checks: [(AlertKind, ThresholdRule, f64); 3] = [
                (AlertKind::Cpu, config.rules.cpu, cpu),
                (AlertKind::Memory, config.rules.memory, memory),
                (AlertKind::Disk, config.rules.disk, disk),
            ];
            for (kind, rule, value) in checks {
                if !rule.enabled {
                    continue;
                }
                self.check_one(config, &agent, kind, value, &rule, now_ms)
                    .await;
            }
        }
        Ok(())
    }

    async fn check_one(
        &self,
        config: &AlertConfig,
        agent: &Agent,
        kind: AlertKind,
        value: f64,
        rule: &ThresholdRule,
        now_ms: i64,
    ) {
        let transition = self.lock_evaluator().observe(
            &agent.id,
            &config.id,
            kind,
            value,
            rule.threshold,
            rule.duration_secs,
            now_ms,
        );

        match transition {
            Some(Transition::Fire { value, threshold }) => {
                self.fire(config, agent, kind, value, threshold, rule.duration_secs, now_ms)
                    .await;
            }
            Some(Transition::Resolve { value }) => {
                self.resolve(config, agent, kind, value, now_ms).await;
            }
            None => {}
        }
    }

    async fn fire(
        &self,
        config: &AlertConfig,
        agent: &Agent,
        kind: AlertKind,
        value: f64,
        threshold: f64,
        duration_secs: i64,
        now_ms: i64,
    ) {
        let record = AlertRecord {
            id: new_id(),
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            config_id: config.id.clone(),
            config_name: config.name.clone(),
            alert_type: kind,
            message: format!(
                "{} above {:.2}% for {} s, currently {:.2}%",
                kind.label(),
                threshold,
                duration_secs,
                value
            ),
            threshold,
            actual_value: value,
            level: AlertLevel::for_excess(value, threshold),
            status: AlertStatus::Firing,
            fired_at: now_ms,
            resolved_at: None,
            created_at: now_ms,
            updated_at: now_ms,
        };

        if let Err(e) = self.store.insert_alert_record(&record) {
            // The evaluator was not acknowledged; the next over-threshold
            // sample retries the fire.
            tracing::error!(
                agent_id = %agent.id,
                alert_type = %kind,
                error = %e,
                "Failed to persist alert record"
            );
            return;
        }
        self.lock_evaluator()
            .mark_fired(&agent.id, &config.id, kind, &record.id);

        tracing::info!(
            agent_id = %agent.id,
            agent_name = %agent.name,
            config_id = %config.id,
            alert_type = %kind,
            value,
            threshold,
            "Alert firing"
        );

        self.spawn_notification(record, agent.clone());
    }

    async fn resolve(
        &self,
        config: &AlertConfig,
        agent: &Agent,
        kind: AlertKind,
        value: f64,
        now_ms: i64,
    ) {
        let record = match self.store.latest_firing_record(&config.id, kind) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(
                    config_id = %config.id,
                    alert_type = %kind,
                    "No firing record found to resolve"
                );
                return;
            }
            Err(e) => {
                tracing::error!(
                    config_id = %config.id,
                    alert_type = %kind,
                    error = %e,
                    "Failed to look up firing record"
                );
                return;
            }
        };

        let mut resolved = record;
        resolved.status = AlertStatus::Resolved;
        resolved.actual_value = value;
        resolved.resolved_at = Some(now_ms);
        resolved.updated_at = now_ms;

        if let Err(e) = self.store.update_alert_record(&resolved) {
            tracing::error!(
                record_id = %resolved.id,
                error = %e,
                "Failed to update alert record"
            );
            return;
        }

        tracing::info!(
            agent_id = %agent.id,
            agent_name = %agent.name,
            config_id = %config.id,
            alert_type = %kind,
            value,
            "Alert resolved"
        );

        self.spawn_notification(resolved, agent.clone());
    }

    /// Delivery happens off the ingest path; a slow or failing channel must
    /// not stall metric processing.
    fn spawn_notification(&self, record: AlertRecord, agent: Agent) {
        let store = self.store.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            match store.list_enabled_notification_channels() {
                Ok(channels) => notifier.dispatch(&channels, &record, &agent).await,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load notification channels");
                }
            }
        });
    }

    // ---- config management ----

    pub fn create_config(&self, config: &AlertConfig) -> Result<()> {
        self.store.create_alert_config(config)
    }

    pub fn update_config(&self, config: &AlertConfig) -> Result<()> {
        self.store.update_alert_config(config)
    }

    /// Deletes the config and purges its in-memory evaluation streams.
    pub fn delete_config(&self, id: &str) -> Result<()> {
        self.store.delete_alert_config(id)?;
        self.lock_evaluator().purge_config(id);
        Ok(())
    }

    #[cfg(test)]
    fn stream_count(&self) -> usize {
        self.lock_evaluator().len()
    }
}
