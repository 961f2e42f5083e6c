//! Persistence layer for the vigil control plane.
//!
//! The default implementation ([`sqlite::SqliteStore`]) keeps every entity in
//! a single SQLite database with WAL mode. Probe and system measurements land
//! in an append-only `metrics` table; rolling statistics are upserted by
//! `(agent_id, monitor_name)`.

pub mod error;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};

use vigil_common::types::{
    Agent, AgentStatus, AlertConfig, AlertKind, AlertRecord, Metric, MonitorStats, MonitorTask,
    NotificationChannelConfig, Visibility,
};

/// Persistence contract for the control plane.
///
/// Implementations must be safe to share across threads (`Send + Sync`):
/// the store is hit concurrently by agent sessions, the scheduler's reload
/// loop, the stats aggregator, and the REST surface.
pub trait Store: Send + Sync {
    // ---- agents ----

    /// Inserts the agent on first contact or refreshes its identity fields
    /// on reconnect. Operator-managed fields (visibility, tags, traffic
    /// quota, license) are preserved for known agents.
    fn register_agent(&self, agent: &Agent) -> Result<()>;

    fn get_agent(&self, id: &str) -> Result<Agent>;

    /// Lists agents, optionally restricted to one visibility class.
    fn list_agents(&self, visibility: Option<Visibility>) -> Result<Vec<Agent>>;

    /// Full-row update for operator edits.
    fn update_agent(&self, agent: &Agent) -> Result<()>;

    fn set_agent_status(&self, id: &str, status: AgentStatus, last_seen_at: i64) -> Result<()>;

    /// Persists the traffic block (baseline, usage, period, sent flags).
    fn update_agent_traffic(&self, agent: &Agent) -> Result<()>;

    /// Startup recovery: sessions do not survive a restart, so neither does
    /// online status.
    fn mark_all_agents_offline(&self) -> Result<()>;

    // ---- monitor tasks ----

    /// Fails with [`StorageError::Conflict`] when the name is taken.
    fn create_monitor(&self, task: &MonitorTask) -> Result<()>;

    fn update_monitor(&self, task: &MonitorTask) -> Result<()>;

    fn delete_monitor(&self, id: &str) -> Result<()>;

    fn get_monitor(&self, id: &str) -> Result<MonitorTask>;

    fn list_monitors(&self, visibility: Option<Visibility>) -> Result<Vec<MonitorTask>>;

    fn list_enabled_monitors(&self) -> Result<Vec<MonitorTask>>;

    // ---- metrics (append-only) ----

    fn insert_metric(&self, metric: &Metric) -> Result<()>;

    /// Probe rows for one (agent, monitor) pair in `[from_ms, to_ms]`,
    /// ordered by timestamp ascending.
    fn query_monitor_metrics(
        &self,
        agent_id: &str,
        monitor_name: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Metric>>;

    /// Retention sweep. Returns the number of rows removed.
    fn prune_metrics_before(&self, cutoff_ms: i64) -> Result<usize>;

    // ---- monitor stats ----

    fn upsert_monitor_stats(&self, stats: &MonitorStats) -> Result<()>;

    fn list_monitor_stats(&self, monitor_name: &str) -> Result<Vec<MonitorStats>>;

    fn list_all_monitor_stats(&self) -> Result<Vec<MonitorStats>>;

    // ---- alert configs ----

    fn create_alert_config(&self, config: &AlertConfig) -> Result<()>;

    fn update_alert_config(&self, config: &AlertConfig) -> Result<()>;

    fn delete_alert_config(&self, id: &str) -> Result<()>;

    fn get_alert_config(&self, id: &str) -> Result<AlertConfig>;

    fn list_alert_configs(&self, agent_id: Option<&str>) -> Result<Vec<AlertConfig>>;

    /// Enabled rule sets for one agent id (typically `"global"`).
    fn list_enabled_alert_configs(&self, agent_id: &str) -> Result<Vec<AlertConfig>>;

    // ---- alert records ----

    fn insert_alert_record(&self, record: &AlertRecord) -> Result<()>;

    fn update_alert_record(&self, record: &AlertRecord) -> Result<()>;

    /// The most recent still-firing record for `(config_id, alert_type)`,
    /// if any.
    fn latest_firing_record(
        &self,
        config_id: &str,
        alert_type: AlertKind,
    ) -> Result<Option<AlertRecord>>;

    fn list_alert_records(
        &self,
        agent_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRecord>>;

    fn count_alert_records(&self, agent_id: Option<&str>) -> Result<u64>;

    // ---- notification channels ----

    fn list_notification_channels(&self) -> Result<Vec<NotificationChannelConfig>>;

    fn list_enabled_notification_channels(&self) -> Result<Vec<NotificationChannelConfig>>;

    fn upsert_notification_channel(&self, channel: &NotificationChannelConfig) -> Result<()>;
}
