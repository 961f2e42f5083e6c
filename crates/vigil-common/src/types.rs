use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a resource's statistics are exposed to unauthenticated viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            _ => Err(format!("unknown visibility: {s}")),
        }
    }
}

/// Agent liveness as tracked by the connection registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(into = "i32", try_from = "i32")]
pub enum AgentStatus {
    #[default]
    Offline,
    Online,
}

impl From<AgentStatus> for i32 {
    fn from(s: AgentStatus) -> i32 {
        match s {
            AgentStatus::Offline => 0,
            AgentStatus::Online => 1,
        }
    }
}

impl TryFrom<i32> for AgentStatus {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(AgentStatus::Offline),
            1 => Ok(AgentStatus::Online),
            _ => Err(format!("unknown agent status: {v}")),
        }
    }
}

/// A registered probe process.
///
/// The traffic block tracks cumulative inbound bytes against an optional
/// monthly quota. `traffic_used` is derived from the agent's monotonic
/// receive counter relative to `traffic_baseline_recv`; when the reported
/// counter regresses the agent is presumed restarted and the baseline is
/// re-seeded without discarding accumulated usage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    pub os: String,
    pub arch: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: String,
    pub visibility: Visibility,
    pub status: AgentStatus,
    pub last_seen_at: i64,
    /// Service license expiry (ms since epoch, 0 = unlimited).
    pub expire_time: i64,

    /// Quota in bytes; 0 = unlimited.
    pub traffic_limit: u64,
    pub traffic_used: u64,
    /// Day of month the accounting period restarts, 0 = disabled.
    pub traffic_reset_day: u32,
    pub traffic_period_start: i64,
    pub traffic_baseline_recv: u64,
    pub traffic_alert_sent_80: bool,
    pub traffic_alert_sent_90: bool,
    pub traffic_alert_sent_100: bool,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Synthetic probe flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorKind {
    Http,
    Https,
    Tcp,
}

impl MonitorKind {
    pub fn is_http(self) -> bool {
        matches!(self, MonitorKind::Http | MonitorKind::Https)
    }
}

impl std::fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorKind::Http => write!(f, "http"),
            MonitorKind::Https => write!(f, "https"),
            MonitorKind::Tcp => write!(f, "tcp"),
        }
    }
}

impl std::str::FromStr for MonitorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(MonitorKind::Http),
            "https" => Ok(MonitorKind::Https),
            "tcp" => Ok(MonitorKind::Tcp),
            _ => Err(format!("unknown monitor kind: {s}")),
        }
    }
}

/// HTTP(S) probe parameters carried inside a monitor task and on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpProbeConfig {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Expected response status; 0 means any 2xx.
    #[serde(default)]
    pub expected_status: u16,
    #[serde(default)]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub tls_verify: bool,
}

/// TCP probe parameters.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpProbeConfig {
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

/// A named synthetic-probe definition distributed to agents on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTask {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub target: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    /// Probe cadence in seconds; values ≤ 0 are coerced to 60.
    pub interval_secs: i64,
    /// Agents this task is pinned to; empty = every online agent.
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpProbeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpProbeConfig>,
    #[serde(default)]
    pub visibility: Visibility,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome of a single probe execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "up"),
            ProbeStatus::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for ProbeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ProbeStatus::Up),
            "down" => Ok(ProbeStatus::Down),
            _ => Err(format!("unknown probe status: {s}")),
        }
    }
}

/// An append-only measurement row.
///
/// Probe results populate the monitor fields; system samples populate the
/// resource fields. Both kinds land in the same table keyed by agent and
/// timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub agent_id: String,
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub monitor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_kind: Option<MonitorKind>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProbeStatus>,
    #[serde(default)]
    pub response_time_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Certificate expiry (ms since epoch); 0 = not an HTTPS probe.
    #[serde(default)]
    pub cert_expiry_time: i64,
    #[serde(default)]
    pub cert_days_left: i64,

    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
    /// Monotonic cumulative inbound bytes as reported by the agent.
    #[serde(default)]
    pub bytes_recv_total: u64,
}

/// Rolling uptime/latency statistics per (agent, monitor) pair.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub agent_id: String,
    pub monitor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_kind: Option<MonitorKind>,
    #[serde(default)]
    pub target: String,

    pub total_checks_24h: i64,
    pub success_checks_24h: i64,
    pub avg_response_24h: i64,
    pub uptime_24h: f64,

    pub total_checks_30d: i64,
    pub success_checks_30d: i64,
    pub uptime_30d: f64,

    pub current_response: i64,
    pub last_check_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_status: Option<ProbeStatus>,
    pub cert_expiry_date: i64,
    pub cert_expiry_days: i64,

    pub updated_at: i64,
}

/// Per-resource threshold rule inside an [`AlertConfig`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub enabled: bool,
    /// Percent of the resource.
    pub threshold: f64,
    /// Seconds the threshold must be continuously breached before firing.
    pub duration_secs: i64,
}

/// Threshold rules for cpu/memory/disk, stored as one JSON column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRules {
    pub cpu: ThresholdRule,
    pub memory: ThresholdRule,
    pub disk: ThresholdRule,
}

/// The agent id an [`AlertConfig`] must carry to apply to the whole fleet.
pub const GLOBAL_AGENT_ID: &str = "global";

/// A threshold rule set. `agent_id == "global"` applies to every agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub enabled: bool,
    pub rules: AlertRules,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Which resource or account an alert concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cpu,
    Memory,
    Disk,
    Traffic,
    Network,
}

impl AlertKind {
    /// Human-readable label used in alert messages.
    pub fn label(self) -> &'static str {
        match self {
            AlertKind::Cpu => "CPU usage",
            AlertKind::Memory => "memory usage",
            AlertKind::Disk => "disk usage",
            AlertKind::Traffic => "traffic usage",
            AlertKind::Network => "network connectivity",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Cpu => write!(f, "cpu"),
            AlertKind::Memory => write!(f, "memory"),
            AlertKind::Disk => write!(f, "disk"),
            AlertKind::Traffic => write!(f, "traffic"),
            AlertKind::Network => write!(f, "network"),
        }
    }
}

impl std::str::FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(AlertKind::Cpu),
            "memory" => Ok(AlertKind::Memory),
            "disk" => Ok(AlertKind::Disk),
            "traffic" => Ok(AlertKind::Traffic),
            "network" => Ok(AlertKind::Network),
            _ => Err(format!("unknown alert kind: {s}")),
        }
    }
}

/// Alert severity, derived from how far the value overshoots the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Level for a value overshooting its threshold: excess < 20 → info,
    /// < 50 → warning, else critical.
    pub fn for_excess(value: f64, threshold: f64) -> Self {
        let diff = value - threshold;
        if diff < 20.0 {
            AlertLevel::Info
        } else if diff < 50.0 {
            AlertLevel::Warning
        } else {
            AlertLevel::Critical
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "info"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            _ => Err(format!("unknown alert level: {s}")),
        }
    }
}

/// Alert lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// A firing or resolved alert event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    /// Empty for traffic alerts, which are not driven by an AlertConfig.
    #[serde(default)]
    pub config_id: String,
    #[serde(default)]
    pub config_name: String,
    pub alert_type: AlertKind,
    pub message: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub level: AlertLevel,
    pub status: AlertStatus,
    pub fired_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An operator-configured notification destination.
///
/// `payload` carries the channel-specific settings (URL, SMTP credentials,
/// template) and is interpreted by the channel type it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannelConfig {
    pub id: String,
    pub name: String,
    pub channel_type: String,
    pub enabled: bool,
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Formats a byte count for alert messages (binary units).
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.2} {}iB", bytes as f64 / div as f64, b"KMGTPE"[exp] as char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_level_brackets() {
        assert_eq!(AlertLevel::for_excess(90.0, 80.0), AlertLevel::Info);
        assert_eq!(AlertLevel::for_excess(99.9, 80.0), AlertLevel::Info);
        assert_eq!(AlertLevel::for_excess(100.0, 80.0), AlertLevel::Warning);
        assert_eq!(AlertLevel::for_excess(95.0, 50.0), AlertLevel::Warning);
        assert_eq!(AlertLevel::for_excess(100.0, 50.0), AlertLevel::Critical);
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GiB");
    }

    #[test]
    fn agent_status_roundtrip() {
        let json = serde_json::to_string(&AgentStatus::Online).unwrap();
        assert_eq!(json, "1");
        let back: AgentStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AgentStatus::Online);
    }

    #[test]
    fn monitor_task_serializes_type_field() {
        let task = MonitorTask {
            id: "t1".into(),
            name: "api".into(),
            kind: MonitorKind::Https,
            target: "https://example.com/health".into(),
            description: String::new(),
            enabled: true,
            interval_secs: 60,
            agent_ids: vec![],
            http: Some(HttpProbeConfig::default()),
            tcp: None,
            visibility: Visibility::Public,
            created_at: 0,
            updated_at: 0,
        };
        let v: serde_json::Value = serde_json::to_value(&task).unwrap();
        assert_eq!(v["type"], "https");
        assert_eq!(v["intervalSecs"], 60);
    }
}
