use crate::error::{Result, StorageError};
use crate::Store;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use vigil_common::types::{
    Agent, AgentStatus, AlertConfig, AlertKind, AlertRecord, AlertStatus, Metric, MonitorStats,
    MonitorTask, NotificationChannelConfig, Visibility,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    hostname TEXT NOT NULL DEFAULT '',
    ip TEXT NOT NULL DEFAULT '',
    os TEXT NOT NULL DEFAULT '',
    arch TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    location TEXT NOT NULL DEFAULT '',
    visibility TEXT NOT NULL DEFAULT 'public',
    status INTEGER NOT NULL DEFAULT 0,
    last_seen_at INTEGER NOT NULL DEFAULT 0,
    expire_time INTEGER NOT NULL DEFAULT 0,
    traffic_limit INTEGER NOT NULL DEFAULT 0,
    traffic_used INTEGER NOT NULL DEFAULT 0,
    traffic_reset_day INTEGER NOT NULL DEFAULT 0,
    traffic_period_start INTEGER NOT NULL DEFAULT 0,
    traffic_baseline_recv INTEGER NOT NULL DEFAULT 0,
    traffic_alert_sent_80 INTEGER NOT NULL DEFAULT 0,
    traffic_alert_sent_90 INTEGER NOT NULL DEFAULT 0,
    traffic_alert_sent_100 INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_name ON agents(name);
CREATE INDEX IF NOT EXISTS idx_agents_last_seen ON agents(last_seen_at);

CREATE TABLE IF NOT EXISTS monitor_tasks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    target TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 0,
    interval_secs INTEGER NOT NULL DEFAULT 60,
    agent_ids TEXT NOT NULL DEFAULT '[]',
    http_config TEXT,
    tcp_config TEXT,
    visibility TEXT NOT NULL DEFAULT 'public',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_monitor_tasks_enabled ON monitor_tasks(enabled);

CREATE TABLE IF NOT EXISTS metrics (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    monitor_name TEXT NOT NULL DEFAULT '',
    monitor_kind TEXT,
    target TEXT NOT NULL DEFAULT '',
    status TEXT,
    response_time_ms INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    cert_expiry_time INTEGER NOT NULL DEFAULT 0,
    cert_days_left INTEGER NOT NULL DEFAULT 0,
    cpu REAL NOT NULL DEFAULT 0,
    memory REAL NOT NULL DEFAULT 0,
    disk REAL NOT NULL DEFAULT 0,
    bytes_recv_total INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_metrics_pair_time
    ON metrics(agent_id, monitor_name, timestamp);
CREATE INDEX IF NOT EXISTS idx_metrics_time ON metrics(timestamp);

CREATE TABLE IF NOT EXISTS monitor_stats (
    agent_id TEXT NOT NULL,
    monitor_name TEXT NOT NULL,
    monitor_kind TEXT,
    target TEXT NOT NULL DEFAULT '',
    total_checks_24h INTEGER NOT NULL DEFAULT 0,
    success_checks_24h INTEGER NOT NULL DEFAULT 0,
    avg_response_24h INTEGER NOT NULL DEFAULT 0,
    uptime_24h REAL NOT NULL DEFAULT 0,
    total_checks_30d INTEGER NOT NULL DEFAULT 0,
    success_checks_30d INTEGER NOT NULL DEFAULT 0,
    uptime_30d REAL NOT NULL DEFAULT 0,
    current_response INTEGER NOT NULL DEFAULT 0,
    last_check_time INTEGER NOT NULL DEFAULT 0,
    last_check_status TEXT,
    cert_expiry_date INTEGER NOT NULL DEFAULT 0,
    cert_expiry_days INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (agent_id, monitor_name)
);

CREATE TABLE IF NOT EXISTS alert_configs (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 0,
    rules TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_configs_agent ON alert_configs(agent_id);

CREATE TABLE IF NOT EXISTS alert_records (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    agent_name TEXT NOT NULL DEFAULT '',
    config_id TEXT NOT NULL DEFAULT '',
    config_name TEXT NOT NULL DEFAULT '',
    alert_type TEXT NOT NULL,
    message TEXT NOT NULL,
    threshold REAL NOT NULL DEFAULT 0,
    actual_value REAL NOT NULL DEFAULT 0,
    level TEXT NOT NULL,
    status TEXT NOT NULL,
    fired_at INTEGER NOT NULL,
    resolved_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_records_lookup
    ON alert_records(config_id, alert_type, status);
CREATE INDEX IF NOT EXISTS idx_alert_records_agent ON alert_records(agent_id, fired_at);

CREATE TABLE IF NOT EXISTS notification_channels (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 0,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const AGENT_COLS: &str = "id, name, hostname, ip, os, arch, version, tags, location, visibility, \
     status, last_seen_at, expire_time, traffic_limit, traffic_used, traffic_reset_day, \
     traffic_period_start, traffic_baseline_recv, traffic_alert_sent_80, traffic_alert_sent_90, \
     traffic_alert_sent_100, created_at, updated_at";

const MONITOR_COLS: &str = "id, name, kind, target, description, enabled, interval_secs, \
     agent_ids, http_config, tcp_config, visibility, created_at, updated_at";

const METRIC_COLS: &str = "id, agent_id, timestamp, monitor_name, monitor_kind, target, status, \
     response_time_ms, error_message, cert_expiry_time, cert_days_left, cpu, memory, disk, \
     bytes_recv_total";

const STATS_COLS: &str = "agent_id, monitor_name, monitor_kind, target, total_checks_24h, \
     success_checks_24h, avg_response_24h, uptime_24h, total_checks_30d, success_checks_30d, \
     uptime_30d, current_response, last_check_time, last_check_status, cert_expiry_date, \
     cert_expiry_days, updated_at";

const RECORD_COLS: &str = "id, agent_id, agent_name, config_id, config_name, alert_type, \
     message, threshold, actual_value, level, status, fired_at, resolved_at, created_at, \
     updated_at";

/// Single-file SQLite store behind a connection mutex.
///
/// Hold times are bounded to individual statements; callers never perform
/// network or agent I/O while a statement runs.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) the database at `data_dir/vigil.db`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| StorageError::Other(format!("create data dir: {e}")))?;
        let path = data_dir.join("vigil.db");
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "Opened control-plane database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests and ephemeral setups.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection, recovering from a poisoned mutex if necessary.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn conflict_on_unique(e: rusqlite::Error, entity: &'static str, name: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == rusqlite::ErrorCode::ConstraintViolation {
            return StorageError::Conflict {
                entity,
                name: name.to_string(),
            };
        }
    }
    StorageError::Sqlite(e)
}

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    let tags_json: String = row.get(7)?;
    let visibility: String = row.get(9)?;
    let status: i32 = row.get(10)?;
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        hostname: row.get(2)?,
        ip: row.get(3)?,
        os: row.get(4)?,
        arch: row.get(5)?,
        version: row.get(6)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        location: row.get(8)?,
        visibility: visibility.parse().unwrap_or_default(),
        status: AgentStatus::try_from(status).unwrap_or_default(),
        last_seen_at: row.get(11)?,
        expire_time: row.get(12)?,
        traffic_limit: row.get::<_, i64>(13)? as u64,
        traffic_used: row.get::<_, i64>(14)? as u64,
        traffic_reset_day: row.get::<_, i64>(15)? as u32,
        traffic_period_start: row.get(16)?,
        traffic_baseline_recv: row.get::<_, i64>(17)? as u64,
        traffic_alert_sent_80: row.get(18)?,
        traffic_alert_sent_90: row.get(19)?,
        traffic_alert_sent_100: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

fn monitor_from_row(row: &Row<'_>) -> rusqlite::Result<MonitorTask> {
    let kind: String = row.get(2)?;
    let agent_ids: String = row.get(7)?;
    let http_config: Option<String> = row.get(8)?;
    let tcp_config: Option<String> = row.get(9)?;
    let visibility: String = row.get(10)?;
    Ok(MonitorTask {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: kind.parse().unwrap_or(vigil_common::types::MonitorKind::Http),
        target: row.get(3)?,
        description: row.get(4)?,
        enabled: row.get(5)?,
        interval_secs: row.get(6)?,
        agent_ids: serde_json::from_str(&agent_ids).unwrap_or_default(),
        http: http_config.and_then(|s| serde_json::from_str(&s).ok()),
        tcp: tcp_config.and_then(|s| serde_json::from_str(&s).ok()),
        visibility: visibility.parse().unwrap_or_default(),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<Metric> {
    let monitor_kind: Option<String> = row.get(4)?;
    let status: Option<String> = row.get(6)?;
    Ok(Metric {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        timestamp: row.get(2)?,
        monitor_name: row.get(3)?,
        monitor_kind: monitor_kind.and_then(|s| s.parse().ok()),
        target: row.get(5)?,
        status: status.and_then(|s| s.parse().ok()),
        response_time_ms: row.get(7)?,
        error_message: row.get(8)?,
        cert_expiry_time: row.get(9)?,
        cert_days_left: row.get(10)?,
        cpu: row.get(11)?,
        memory: row.get(12)?,
        disk: row.get(13)?,
        bytes_recv_total: row.get::<_, i64>(14)? as u64,
    })
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<MonitorStats> {
    let monitor_kind: Option<String> = row.get(2)?;
    let last_check_status: Option<String> = row.get(13)?;
    Ok(MonitorStats {
        agent_id: row.get(0)?,
        monitor_name: row.get(1)?,
        monitor_kind: monitor_kind.and_then(|s| s.parse().ok()),
        target: row.get(3)?,
        total_checks_24h: row.get(4)?,
        success_checks_24h: row.get(5)?,
        avg_response_24h: row.get(6)?,
        uptime_24h: row.get(7)?,
        total_checks_30d: row.get(8)?,
        success_checks_30d: row.get(9)?,
        uptime_30d: row.get(10)?,
        current_response: row.get(11)?,
        last_check_time: row.get(12)?,
        last_check_status: last_check_status.and_then(|s| s.parse().ok()),
        cert_expiry_date: row.get(14)?,
        cert_expiry_days: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AlertRecord> {
    let alert_type: String = row.get(5)?;
    let level: String = row.get(9)?;
    let status: String = row.get(10)?;
    Ok(AlertRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_name: row.get(2)?,
        config_id: row.get(3)?,
        config_name: row.get(4)?,
        alert_type: alert_type.parse().unwrap_or(AlertKind::Cpu),
        message: row.get(6)?,
        threshold: row.get(7)?,
        actual_value: row.get(8)?,
        level: level.parse().unwrap_or(vigil_common::types::AlertLevel::Info),
        status: status.parse().unwrap_or(AlertStatus::Firing),
        fired_at: row.get(11)?,
        resolved_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationChannelConfig> {
    let payload: String = row.get(4)?;
    Ok(NotificationChannelConfig {
        id: row.get(0)?,
        name: row.get(1)?,
        channel_type: row.get(2)?,
        enabled: row.get(3)?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Store for SqliteStore {
    fn register_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.lock_conn();
        let tags = serde_json::to_string(&agent.tags)?;
        conn.prepare_cached(
            "INSERT INTO agents (id, name, hostname, ip, os, arch, version, tags, location, \
             visibility, status, last_seen_at, expire_time, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 hostname = excluded.hostname,
                 ip = excluded.ip,
                 os = excluded.os,
                 arch = excluded.arch,
                 version = excluded.version,
                 status = excluded.status,
                 last_seen_at = excluded.last_seen_at,
                 updated_at = excluded.updated_at",
        )?
        .execute(params![
            agent.id,
            agent.name,
            agent.hostname,
            agent.ip,
            agent.os,
            agent.arch,
            agent.version,
            tags,
            agent.location,
            agent.visibility.to_string(),
            i32::from(agent.status),
            agent.last_seen_at,
            agent.updated_at,
        ])?;
        Ok(())
    }

    fn get_agent(&self, id: &str) -> Result<Agent> {
        let conn = self.lock_conn();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {AGENT_COLS} FROM agents WHERE id = ?1"))?;
        stmt.query_row(params![id], agent_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound {
                    entity: "agent",
                    id: id.to_string(),
                },
                other => StorageError::Sqlite(other),
            })
    }

    fn list_agents(&self, visibility: Option<Visibility>) -> Result<Vec<Agent>> {
        let conn = self.lock_conn();
        let mut out = Vec::new();
        match visibility {
            Some(v) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {AGENT_COLS} FROM agents WHERE visibility = ?1 ORDER BY name"
                ))?;
                let rows = stmt.query_map(params![v.to_string()], agent_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn
                    .prepare_cached(&format!("SELECT {AGENT_COLS} FROM agents ORDER BY name"))?;
                let rows = stmt.query_map([], agent_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    fn update_agent(&self, agent: &Agent) -> Result<()> {
        let conn = self.lock_conn();
        let tags = serde_json::to_string(&agent.tags)?;
        let changed = conn
            .prepare_cached(
                "UPDATE agents SET name = ?2, hostname = ?3, ip = ?4, os = ?5, arch = ?6, \
                 version = ?7, tags = ?8, location = ?9, visibility = ?10, status = ?11, \
                 last_seen_at = ?12, expire_time = ?13, traffic_limit = ?14, traffic_used = ?15, \
                 traffic_reset_day = ?16, traffic_period_start = ?17, traffic_baseline_recv = ?18, \
                 traffic_alert_sent_80 = ?19, traffic_alert_sent_90 = ?20, \
                 traffic_alert_sent_100 = ?21, updated_at = ?22
                 WHERE id = ?1",
            )?
            .execute(params![
                agent.id,
                agent.name,
                agent.hostname,
                agent.ip,
                agent.os,
                agent.arch,
                agent.version,
                tags,
                agent.location,
                agent.visibility.to_string(),
                i32::from(agent.status),
                agent.last_seen_at,
                agent.expire_time,
                agent.traffic_limit as i64,
                agent.traffic_used as i64,
                agent.traffic_reset_day as i64,
                agent.traffic_period_start,
                agent.traffic_baseline_recv as i64,
                agent.traffic_alert_sent_80,
                agent.traffic_alert_sent_90,
                agent.traffic_alert_sent_100,
                agent.updated_at,
            ])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "agent",
                id: agent.id.clone(),
            });
        }
        Ok(())
    }

    fn set_agent_status(&self, id: &str, status: AgentStatus, last_seen_at: i64) -> Result<()> {
        let conn = self.lock_conn();
        conn.prepare_cached(
            "UPDATE agents SET status = ?2, last_seen_at = ?3, updated_at = ?3 WHERE id = ?1",
        )?
        .execute(params![id, i32::from(status), last_seen_at])?;
        Ok(())
    }

    fn update_agent_traffic(&self, agent: &Agent) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn
            .prepare_cached(
                "UPDATE agents SET traffic_used = ?2, traffic_period_start = ?3, \
                 traffic_baseline_recv = ?4, traffic_alert_sent_80 = ?5, \
                 traffic_alert_sent_90 = ?6, traffic_alert_sent_100 = ?7, updated_at = ?8
                 WHERE id = ?1",
            )?
            .execute(params![
                agent.id,
                agent.traffic_used as i64,
                agent.traffic_period_start,
                agent.traffic_baseline_recv as i64,
                agent.traffic_alert_sent_80,
                agent.traffic_alert_sent_90,
                agent.traffic_alert_sent_100,
                agent.updated_at,
            ])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "agent",
                id: agent.id.clone(),
            });
        }
        Ok(())
    }

    fn mark_all_agents_offline(&self) -> Result<()> {
        let conn = self.lock_conn();
        conn.execute("UPDATE agents SET status = 0", [])?;
        Ok(())
    }

    fn create_monitor(&self, task: &MonitorTask) -> Result<()> {
        if task.name.trim().is_empty() {
            return Err(StorageError::Validation("monitor name is required".into()));
        }
        let conn = self.lock_conn();
        let agent_ids = serde_json::to_string(&task.agent_ids)?;
        let http = task.http.as_ref().map(serde_json::to_string).transpose()?;
        let tcp = task.tcp.as_ref().map(serde_json::to_string).transpose()?;
        conn.prepare_cached(
            "INSERT INTO monitor_tasks (id, name, kind, target, description, enabled, \
             interval_secs, agent_ids, http_config, tcp_config, visibility, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?
        .execute(params![
            task.id,
            task.name,
            task.kind.to_string(),
            task.target,
            task.description,
            task.enabled,
            task.interval_secs,
            agent_ids,
            http,
            tcp,
            task.visibility.to_string(),
            task.created_at,
            task.updated_at,
        ])
        .map_err(|e| conflict_on_unique(e, "monitor_task", &task.name))?;
        Ok(())
    }

    fn update_monitor(&self, task: &MonitorTask) -> Result<()> {
        let conn = self.lock_conn();
        let agent_ids = serde_json::to_string(&task.agent_ids)?;
        let http = task.http.as_ref().map(serde_json::to_string).transpose()?;
        let tcp = task.tcp.as_ref().map(serde_json::to_string).transpose()?;
        let changed = conn
            .prepare_cached(
                "UPDATE monitor_tasks SET name = ?2, kind = ?3, target = ?4, description = ?5, \
                 enabled = ?6, interval_secs = ?7, agent_ids = ?8, http_config = ?9, \
                 tcp_config = ?10, visibility = ?11, updated_at = ?12
                 WHERE id = ?1",
            )?
            .execute(params![
                task.id,
                task.name,
                task.kind.to_string(),
                task.target,
                task.description,
                task.enabled,
                task.interval_secs,
                agent_ids,
                http,
                tcp,
                task.visibility.to_string(),
                task.updated_at,
            ])
            .map_err(|e| conflict_on_unique(e, "monitor_task", &task.name))?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "monitor_task",
                id: task.id.clone(),
            });
        }
        Ok(())
    }

    fn delete_monitor(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn
            .prepare_cached("DELETE FROM monitor_tasks WHERE id = ?1")?
            .execute(params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "monitor_task",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn get_monitor(&self, id: &str) -> Result<MonitorTask> {
        let conn = self.lock_conn();
        let mut stmt = conn
            .prepare_cached(&format!("SELECT {MONITOR_COLS} FROM monitor_tasks WHERE id = ?1"))?;
        stmt.query_row(params![id], monitor_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound {
                    entity: "monitor_task",
                    id: id.to_string(),
                },
                other => StorageError::Sqlite(other),
            })
    }

    fn list_monitors(&self, visibility: Option<Visibility>) -> Result<Vec<MonitorTask>> {
        let conn = self.lock_conn();
        let mut out = Vec::new();
        match visibility {
            Some(v) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {MONITOR_COLS} FROM monitor_tasks WHERE visibility = ?1 ORDER BY name"
                ))?;
                let rows = stmt.query_map(params![v.to_string()], monitor_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {MONITOR_COLS} FROM monitor_tasks ORDER BY name"
                ))?;
                let rows = stmt.query_map([], monitor_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    fn list_enabled_monitors(&self) -> Result<Vec<MonitorTask>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {MONITOR_COLS} FROM monitor_tasks WHERE enabled = 1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([], monitor_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn insert_metric(&self, metric: &Metric) -> Result<()> {
        let conn = self.lock_conn();
        conn.prepare_cached(&format!(
            "INSERT INTO metrics ({METRIC_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))?
        .execute(params![
            metric.id,
            metric.agent_id,
            metric.timestamp,
            metric.monitor_name,
            metric.monitor_kind.map(|k| k.to_string()),
            metric.target,
            metric.status.map(|s| s.to_string()),
            metric.response_time_ms,
            metric.error_message,
            metric.cert_expiry_time,
            metric.cert_days_left,
            metric.cpu,
            metric.memory,
            metric.disk,
            metric.bytes_recv_total as i64,
        ])?;
        Ok(())
    }

    fn query_monitor_metrics(
        &self,
        agent_id: &str,
        monitor_name: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Metric>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {METRIC_COLS} FROM metrics
             WHERE agent_id = ?1 AND monitor_name = ?2 AND timestamp >= ?3 AND timestamp <= ?4
             ORDER BY timestamp ASC"
        ))?;
        let rows = stmt.query_map(params![agent_id, monitor_name, from_ms, to_ms], metric_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn prune_metrics_before(&self, cutoff_ms: i64) -> Result<usize> {
        let conn = self.lock_conn();
        let removed = conn
            .prepare_cached("DELETE FROM metrics WHERE timestamp < ?1")?
            .execute(params![cutoff_ms])?;
        Ok(removed)
    }

    fn upsert_monitor_stats(&self, stats: &MonitorStats) -> Result<()> {
        let conn = self.lock_conn();
        conn.prepare_cached(&format!(
            "INSERT OR REPLACE INTO monitor_stats ({STATS_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ))?
        .execute(params![
            stats.agent_id,
            stats.monitor_name,
            stats.monitor_kind.map(|k| k.to_string()),
            stats.target,
            stats.total_checks_24h,
            stats.success_checks_24h,
            stats.avg_response_24h,
            stats.uptime_24h,
            stats.total_checks_30d,
            stats.success_checks_30d,
            stats.uptime_30d,
            stats.current_response,
            stats.last_check_time,
            stats.last_check_status.map(|s| s.to_string()),
            stats.cert_expiry_date,
            stats.cert_expiry_days,
            stats.updated_at,
        ])?;
        Ok(())
    }

    fn list_monitor_stats(&self, monitor_name: &str) -> Result<Vec<MonitorStats>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {STATS_COLS} FROM monitor_stats WHERE monitor_name = ?1 ORDER BY agent_id"
        ))?;
        let rows = stmt.query_map(params![monitor_name], stats_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn list_all_monitor_stats(&self) -> Result<Vec<MonitorStats>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {STATS_COLS} FROM monitor_stats ORDER BY monitor_name, agent_id"
        ))?;
        let rows = stmt.query_map([], stats_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn create_alert_config(&self, config: &AlertConfig) -> Result<()> {
        let conn = self.lock_conn();
        let rules = serde_json::to_string(&config.rules)?;
        conn.prepare_cached(
            "INSERT INTO alert_configs (id, agent_id, name, enabled, rules, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?
        .execute(params![
            config.id,
            config.agent_id,
            config.name,
            config.enabled,
            rules,
            config.created_at,
            config.updated_at,
        ])?;
        Ok(())
    }

    fn update_alert_config(&self, config: &AlertConfig) -> Result<()> {
        let conn = self.lock_conn();
        let rules = serde_json::to_string(&config.rules)?;
        let changed = conn
            .prepare_cached(
                "UPDATE alert_configs SET agent_id = ?2, name = ?3, enabled = ?4, rules = ?5, \
                 updated_at = ?6 WHERE id = ?1",
            )?
            .execute(params![
                config.id,
                config.agent_id,
                config.name,
                config.enabled,
                rules,
                config.updated_at,
            ])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "alert_config",
                id: config.id.clone(),
            });
        }
        Ok(())
    }

    fn delete_alert_config(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn
            .prepare_cached("DELETE FROM alert_configs WHERE id = ?1")?
            .execute(params![id])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "alert_config",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn get_alert_config(&self, id: &str) -> Result<AlertConfig> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, name, enabled, rules, created_at, updated_at \
             FROM alert_configs WHERE id = ?1",
        )?;
        stmt.query_row(params![id], alert_config_from_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound {
                    entity: "alert_config",
                    id: id.to_string(),
                },
                other => StorageError::Sqlite(other),
            })
    }

    fn list_alert_configs(&self, agent_id: Option<&str>) -> Result<Vec<AlertConfig>> {
        let conn = self.lock_conn();
        let mut out = Vec::new();
        match agent_id {
            Some(agent) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, agent_id, name, enabled, rules, created_at, updated_at \
                     FROM alert_configs WHERE agent_id = ?1 ORDER BY name",
                )?;
                let rows = stmt.query_map(params![agent], alert_config_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(
                    "SELECT id, agent_id, name, enabled, rules, created_at, updated_at \
                     FROM alert_configs ORDER BY name",
                )?;
                let rows = stmt.query_map([], alert_config_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    fn list_enabled_alert_configs(&self, agent_id: &str) -> Result<Vec<AlertConfig>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, agent_id, name, enabled, rules, created_at, updated_at \
             FROM alert_configs WHERE agent_id = ?1 AND enabled = 1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![agent_id], alert_config_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn insert_alert_record(&self, record: &AlertRecord) -> Result<()> {
        let conn = self.lock_conn();
        conn.prepare_cached(&format!(
            "INSERT INTO alert_records ({RECORD_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))?
        .execute(params![
            record.id,
            record.agent_id,
            record.agent_name,
            record.config_id,
            record.config_name,
            record.alert_type.to_string(),
            record.message,
            record.threshold,
            record.actual_value,
            record.level.to_string(),
            record.status.to_string(),
            record.fired_at,
            record.resolved_at,
            record.created_at,
            record.updated_at,
        ])?;
        Ok(())
    }

    fn update_alert_record(&self, record: &AlertRecord) -> Result<()> {
        let conn = self.lock_conn();
        let changed = conn
            .prepare_cached(
                "UPDATE alert_records SET message = ?2, threshold = ?3, actual_value = ?4, \
                 level = ?5, status = ?6, resolved_at = ?7, updated_at = ?8 WHERE id = ?1",
            )?
            .execute(params![
                record.id,
                record.message,
                record.threshold,
                record.actual_value,
                record.level.to_string(),
                record.status.to_string(),
                record.resolved_at,
                record.updated_at,
            ])?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                entity: "alert_record",
                id: record.id.clone(),
            });
        }
        Ok(())
    }

    fn latest_firing_record(
        &self,
        config_id: &str,
        alert_type: AlertKind,
    ) -> Result<Option<AlertRecord>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {RECORD_COLS} FROM alert_records
             WHERE config_id = ?1 AND alert_type = ?2 AND status = 'firing'
             ORDER BY fired_at DESC LIMIT 1"
        ))?;
        match stmt.query_row(params![config_id, alert_type.to_string()], record_from_row) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_alert_records(
        &self,
        agent_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AlertRecord>> {
        let conn = self.lock_conn();
        let mut out = Vec::new();
        match agent_id {
            Some(agent) => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {RECORD_COLS} FROM alert_records WHERE agent_id = ?1
                     ORDER BY fired_at DESC LIMIT ?2 OFFSET ?3"
                ))?;
                let rows =
                    stmt.query_map(params![agent, limit as i64, offset as i64], record_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {RECORD_COLS} FROM alert_records
                     ORDER BY fired_at DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let rows = stmt.query_map(params![limit as i64, offset as i64], record_from_row)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }

    fn count_alert_records(&self, agent_id: Option<&str>) -> Result<u64> {
        let conn = self.lock_conn();
        let count: i64 = match agent_id {
            Some(agent) => conn.query_row(
                "SELECT COUNT(*) FROM alert_records WHERE agent_id = ?1",
                params![agent],
                |row| row.get(0),
            )?,
            None => {
                conn.query_row("SELECT COUNT(*) FROM alert_records", [], |row| row.get(0))?
            }
        };
        Ok(count as u64)
    }

    fn list_notification_channels(&self) -> Result<Vec<NotificationChannelConfig>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, channel_type, enabled, payload, created_at, updated_at \
             FROM notification_channels ORDER BY name",
        )?;
        let rows = stmt.query_map([], channel_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn list_enabled_notification_channels(&self) -> Result<Vec<NotificationChannelConfig>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, channel_type, enabled, payload, created_at, updated_at \
             FROM notification_channels WHERE enabled = 1 ORDER BY name",
        )?;
        let rows = stmt.query_map([], channel_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn upsert_notification_channel(&self, channel: &NotificationChannelConfig) -> Result<()> {
        let conn = self.lock_conn();
        let payload = serde_json::to_string(&channel.payload)?;
        conn.prepare_cached(
            "INSERT OR REPLACE INTO notification_channels \
             (id, name, channel_type, enabled, payload, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?
        .execute(params![
            channel.id,
            channel.name,
            channel.channel_type,
            channel.enabled,
            payload,
            channel.created_at,
            channel.updated_at,
        ])?;
        Ok(())
    }
}

fn alert_config_from_row(row: &Row<'_>) -> rusqlite::Result<AlertConfig> {
    let rules: String = row.get(4)?;
    Ok(AlertConfig {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        enabled: row.get(3)?,
        rules: serde_json::from_str(&rules).unwrap_or_default(),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
