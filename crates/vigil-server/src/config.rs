use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Shared secret agents present during the WebSocket handshake.
    /// Unset disables handshake authentication (local development).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_worker_count")]
    pub workers: usize,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_reload_secs")]
    pub reload_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            api_key: None,
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            retention_days: default_retention_days(),
            scheduler: SchedulerConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            tick_secs: default_tick_secs(),
            reload_secs: default_reload_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_retention_days() -> u32 {
    30
}

fn default_worker_count() -> usize {
    5
}

fn default_tick_secs() -> u64 {
    1
}

fn default_reload_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
