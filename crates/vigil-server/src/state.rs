use crate::alerts::AlertService;
use crate::config::ServerConfig;
use crate::ingest::IngestPipeline;
use crate::registry::ConnectionRegistry;
use crate::session::{ApiKeyValidator, StaticKeyValidator};
use crate::stats::StatsAggregator;
use crate::traffic::TrafficService;
use std::sync::Arc;
use vigil_common::id::now_millis;
use vigil_notify::manager::Notifier;
use vigil_storage::Store;

/// Shared handles for every component, cloned into handlers and loops.
///
/// This is the dependency-construction root: each component exists exactly
/// once and is reached through these references, never through process-wide
/// mutable globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<ConnectionRegistry>,
    pub notifier: Arc<Notifier>,
    pub alerts: Arc<AlertService>,
    pub traffic: Arc<TrafficService>,
    pub stats: Arc<StatsAggregator>,
    pub ingest: Arc<IngestPipeline>,
    pub api_keys: Arc<dyn ApiKeyValidator>,
    pub start_time: i64,
}

impl AppState {
    pub fn build(config: Arc<ServerConfig>, store: Arc<dyn Store>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(store.clone()));
        let notifier = Arc::new(Notifier::new());
        let alerts = Arc::new(AlertService::new(store.clone(), notifier.clone()));
        let traffic = Arc::new(TrafficService::new(store.clone()));
        let stats = Arc::new(StatsAggregator::new(store.clone(), registry.clone()));
        let ingest = Arc::new(IngestPipeline::new(
            store.clone(),
            registry.clone(),
            alerts.clone(),
            traffic.clone(),
            stats.clone(),
        ));
        let api_keys: Arc<dyn ApiKeyValidator> =
            Arc::new(StaticKeyValidator::new(config.api_key.clone()));

        Self {
            config,
            store,
            registry,
            notifier,
            alerts,
            traffic,
            stats,
            ingest,
            api_keys,
            start_time: now_millis(),
        }
    }
}
