//! Agent wire protocol.
//!
//! Agents hold a duplex framed channel to the server; every frame is one
//! JSON object `{"type": ..., "data": ...}`. [`Frame`] models the envelope
//! as an adjacently-tagged enum so the discriminator and payload stay in
//! lockstep with the serde derive.

use crate::types::{HttpProbeConfig, MonitorKind, ProbeStatus, TcpProbeConfig};
use serde::{Deserialize, Serialize};

/// One protocol frame, either direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Frame {
    /// server → agent: probe definitions to execute immediately.
    MonitorConfig(MonitorConfigPayload),
    /// agent → server: the outcome of a single probe execution.
    MonitorResult(MonitorResultPayload),
    /// agent → server: a system resource sample.
    Metrics(MetricsPayload),
    /// both directions: keepalive.
    Heartbeat(HeartbeatPayload),
}

impl Frame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Frame> {
        serde_json::from_str(raw)
    }
}

/// A single probe definition as shipped to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorItem {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_config: Option<HttpProbeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_config: Option<TcpProbeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfigPayload {
    /// Kept for agent compatibility; agents probe once on receipt.
    #[serde(default)]
    pub interval: i64,
    pub items: Vec<MonitorItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorResultPayload {
    pub monitor_name: String,
    #[serde(rename = "type")]
    pub kind: MonitorKind,
    pub target: String,
    pub timestamp: i64,
    pub status: ProbeStatus,
    pub response_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_expiry_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_days_left: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MetricsPayload {
    pub timestamp: i64,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub disk: f64,
    /// Monotonic cumulative inbound bytes; absent when the agent does not
    /// report network counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_recv_total: Option<u64>,
    #[serde(default)]
    pub load1: f64,
    #[serde(default)]
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub timestamp: i64,
}

/// Identity fields an agent presents during the WebSocket handshake,
/// alongside its API key.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentHello {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub location: String,
}
