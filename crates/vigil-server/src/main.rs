use anyhow::Result;
use chrono::Utc;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::scheduler::MonitorScheduler;
use vigil_server::state::AppState;
use vigil_storage::sqlite::SqliteStore;
use vigil_storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        ServerConfig::load(&config_path)?
    } else {
        tracing::warn!(path = %config_path, "Config file not found, using defaults");
        ServerConfig::default()
    };
    let config = Arc::new(config);

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        "vigil-server starting"
    );

    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(Path::new(&config.data_dir))?);

    // Sessions do not survive a restart; neither should online status.
    store.mark_all_agents_offline()?;

    let state = AppState::build(config.clone(), store.clone());

    let scheduler = Arc::new(MonitorScheduler::new(
        store.clone(),
        state.registry.clone(),
        config.scheduler.clone(),
    ));
    scheduler.start();

    let (shutdown_tx, _) = watch::channel(false);

    // Stats roll-up loop.
    let stats = state.stats.clone();
    let stats_interval = config.stats.interval_secs;
    let stats_shutdown = shutdown_tx.subscribe();
    let stats_handle = tokio::spawn(async move {
        stats.run(stats_interval, stats_shutdown).await;
    });

    // Hourly maintenance: metric retention and traffic period resets.
    let maintenance_store = store.clone();
    let maintenance_traffic = state.traffic.clone();
    let retention_days = config.retention_days;
    let mut maintenance_shutdown = shutdown_tx.subscribe();
    let maintenance_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let cutoff =
                        Utc::now().timestamp_millis() - i64::from(retention_days) * 86_400_000;
                    match maintenance_store.prune_metrics_before(cutoff) {
                        Ok(removed) if removed > 0 => {
                            tracing::info!(removed, "Pruned expired metrics");
                        }
                        Err(e) => tracing::error!(error = %e, "Metric retention sweep failed"),
                        _ => {}
                    }
                    match maintenance_traffic.reset_due_periods(Utc::now()) {
                        Ok(reset) if reset > 0 => {
                            tracing::info!(reset, "Traffic periods reset");
                        }
                        Err(e) => tracing::error!(error = %e, "Traffic period sweep failed"),
                        _ => {}
                    }
                }
                _ = maintenance_shutdown.changed() => return,
            }
        }
    });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let router = app::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler.stop().await;
    let _ = stats_handle.await;
    let _ = maintenance_handle.await;
    tracing::info!("Server stopped");

    Ok(())
}
