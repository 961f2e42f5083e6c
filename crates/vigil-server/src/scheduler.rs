use crate::config::SchedulerConfig;
use crate::registry::{ConnectionRegistry, SendOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use vigil_common::id::now_millis;
use vigil_common::proto::{Frame, MonitorConfigPayload, MonitorItem};
use vigil_common::types::MonitorTask;
use vigil_storage::Store;

const DEFAULT_INTERVAL_SECS: i64 = 60;

/// One scheduled monitor and its cadence bookkeeping.
#[derive(Debug, Clone)]
struct SchedEntry {
    monitor: MonitorTask,
    /// Next due time (ms). A freshly discovered task is due immediately.
    next_run_at: i64,
    interval_secs: i64,
    /// Set while the task sits in the dispatch queue or a worker runs it;
    /// guarantees at most one in-flight dispatch per task.
    running: bool,
}

/// Periodic dispatcher fanning due monitor tasks out to online agents.
///
/// Which tasks are due is decided by a 1 s tick over the task map; execution
/// bandwidth is a bounded queue drained by a small worker pool. When the
/// queue is full the tick skips the task and retries next second, so
/// overload shows up in logs instead of an unbounded backlog.
pub struct MonitorScheduler {
    store: Arc<dyn Store>,
    registry: Arc<ConnectionRegistry>,
    config: SchedulerConfig,
    tasks: RwLock<HashMap<String, SchedEntry>>,
    queue_tx: Mutex<Option<mpsc::Sender<String>>>,
    queue_rx: Mutex<Option<mpsc::Receiver<String>>>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MonitorScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ConnectionRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            registry,
            config,
            tasks: RwLock::new(HashMap::new()),
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Mutex::new(Some(queue_rx)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker pool plus the tick and reload loops.
    pub fn start(self: &Arc<Self>) {
        let queue_rx = self
            .queue_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(queue_rx) = queue_rx else {
            tracing::warn!("Scheduler already started");
            return;
        };
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        tracing::info!(
            workers = self.config.workers,
            tick_secs = self.config.tick_secs,
            reload_secs = self.config.reload_secs,
            "Monitor scheduler starting"
        );

        // First load happens before the loops so the first tick sees tasks.
        self.reload_tasks();

        let mut handles = Vec::new();
        for worker_id in 0..self.config.workers.max(1) {
            let scheduler = self.clone();
            let queue_rx = queue_rx.clone();
            handles.push(tokio::spawn(async move {
                scheduler.run_worker(worker_id, queue_rx).await;
            }));
        }

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_tick_loop().await;
        }));

        let scheduler = self.clone();
        handles.push(tokio::spawn(async move {
            scheduler.run_reload_loop().await;
        }));

        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(handles);
    }

    /// Signals every loop, closes the dispatch queue, and joins. Queued
    /// dispatches drain before the workers exit.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        self.queue_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }
        tracing::info!("Monitor scheduler stopped");
    }

    pub fn task_count(&self) -> usize {
        self.read_tasks().len()
    }

    fn read_tasks(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SchedEntry>> {
        self.tasks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_tasks(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SchedEntry>> {
        self.tasks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_tick_loop(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut tick = interval(Duration::from_secs(self.config.tick_secs.max(1)));
        loop {
            tokio::select! {
                _ = tick.tick() => self.enqueue_due(now_millis()),
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn run_reload_loop(&self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut tick = interval(Duration::from_secs(self.config.reload_secs.max(1)));
        // interval fires immediately; the initial load already ran in start().
        tick.tick().await;
        loop {
            tokio::select! {
                _ = tick.tick() => self.reload_tasks(),
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn run_worker(&self, worker_id: usize, queue_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<String>>>) {
        tracing::debug!(worker_id, "Scheduler worker started");
        loop {
            let task_id = {
                let mut rx = queue_rx.lock().await;
                rx.recv().await
            };
            match task_id {
                Some(task_id) => self.execute_task(&task_id).await,
                // Queue closed by stop(): remaining items were drained.
                None => return,
            }
        }
    }

    /// One tick: snapshot due tasks, mark them running, and try a
    /// non-blocking enqueue. A full queue resets the mark so the next tick
    /// retries.
    fn enqueue_due(&self, now_ms: i64) {
        let due: Vec<String> = self
            .read_tasks()
            .iter()
            .filter(|(_, entry)| !entry.running && now_ms >= entry.next_run_at)
            .map(|(id, _)| id.clone())
            .collect();
        if due.is_empty() {
            return;
        }

        let queue_tx = {
            let guard = self
                .queue_tx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.clone()
        };
        let Some(queue_tx) = queue_tx else {
            return;
        };

        for task_id in due {
            {
                let mut tasks = self.write_tasks();
                match tasks.get_mut(&task_id) {
                    Some(entry) if !entry.running => entry.running = true,
                    // Raced with another tick or got removed; skip.
                    _ => continue,
                }
            }

            if let Err(e) = queue_tx.try_send(task_id.clone()) {
                let mut tasks = self.write_tasks();
                if let Some(entry) = tasks.get_mut(&task_id) {
                    entry.running = false;
                    tracing::warn!(
                        task_id,
                        task_name = %entry.monitor.name,
                        error = %e,
                        "Dispatch queue full, skipping task this tick"
                    );
                }
            }
        }
    }

    /// Fans the task out, then stamps the next due time and clears the
    /// running mark regardless of send outcomes.
    async fn execute_task(&self, task_id: &str) {
        let monitor = self
            .read_tasks()
            .get(task_id)
            .map(|entry| entry.monitor.clone());

        if let Some(monitor) = monitor {
            tracing::debug!(task_id, task_name = %monitor.name, "Dispatching monitor task");
            self.dispatch_monitor(&monitor);
        }

        let mut tasks = self.write_tasks();
        if let Some(entry) = tasks.get_mut(task_id) {
            entry.next_run_at = now_millis() + entry.interval_secs * 1000;
            entry.running = false;
        }
    }

    /// Sends a single-item MonitorConfig frame to every eligible online
    /// agent. One agent's failure never aborts the fan-out.
    fn dispatch_monitor(&self, monitor: &MonitorTask) {
        let online = self.registry.online_agents();
        let eligible: Vec<String> = if monitor.agent_ids.is_empty() {
            online
        } else {
            monitor
                .agent_ids
                .iter()
                .filter(|id| online.contains(id))
                .cloned()
                .collect()
        };

        if eligible.is_empty() {
            tracing::debug!(task_name = %monitor.name, "No eligible online agents");
            return;
        }

        let frame = Frame::MonitorConfig(MonitorConfigPayload {
            interval: 0,
            items: vec![MonitorItem {
                name: monitor.name.clone(),
                kind: monitor.kind,
                target: monitor.target.clone(),
                http_config: monitor.kind.is_http().then(|| monitor.http.clone()).flatten(),
                tcp_config: (!monitor.kind.is_http()).then(|| monitor.tcp.clone()).flatten(),
            }],
        });

        for agent_id in &eligible {
            match self.registry.send(agent_id, &frame) {
                SendOutcome::Ok => {}
                SendOutcome::NotOnline => {
                    tracing::warn!(
                        task_name = %monitor.name,
                        agent_id = %agent_id,
                        "Agent went offline during fan-out"
                    );
                }
                SendOutcome::SendError => {
                    tracing::error!(
                        task_name = %monitor.name,
                        agent_id = %agent_id,
                        "Failed to send monitor config"
                    );
                }
            }
        }
    }

    /// Reconciles the task map against the store's enabled monitors.
    ///
    /// Known tasks keep their `next_run_at`: config edits must not reset
    /// cadence. Unknown tasks are due immediately. Tasks that vanished
    /// (deleted or disabled) are withdrawn.
    fn reload_tasks(&self) {
        let monitors = match self.store.list_enabled_monitors() {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load monitor tasks");
                return;
            }
        };

        let now = now_millis();
        let mut tasks = self.write_tasks();
        let mut seen: HashSet<String> = HashSet::with_capacity(monitors.len());

        for monitor in monitors {
            seen.insert(monitor.id.clone());
            let interval_secs = coerce_interval(monitor.interval_secs);

            match tasks.get_mut(&monitor.id) {
                Some(entry) => {
                    let core_changed = entry.monitor.interval_secs != monitor.interval_secs
                        || entry.monitor.name != monitor.name
                        || entry.monitor.kind != monitor.kind
                        || entry.monitor.target != monitor.target;
                    if core_changed {
                        tracing::info!(
                            task_id = %monitor.id,
                            task_name = %monitor.name,
                            interval_secs,
                            "Monitor task updated"
                        );
                        entry.interval_secs = interval_secs;
                    }
                    // Refresh the snapshot either way so agent pinning and
                    // probe config edits reach the next dispatch; cadence
                    // (next_run_at) is preserved.
                    entry.monitor = monitor;
                }
                None => {
                    tracing::info!(
                        task_id = %monitor.id,
                        task_name = %monitor.name,
                        interval_secs,
                        "Monitor task added"
                    );
                    tasks.insert(
                        monitor.id.clone(),
                        SchedEntry {
                            monitor,
                            next_run_at: now,
                            interval_secs,
                            running: false,
                        },
                    );
                }
            }
        }

        tasks.retain(|task_id, _| {
            let keep = seen.contains(task_id);
            if !keep {
                tracing::info!(task_id, "Monitor task withdrawn");
            }
            keep
        });
    }
}

fn coerce_interval(interval_secs: i64) -> i64 {
    if interval_secs <= 0 {
        DEFAULT_INTERVAL_SECS
    } else {
        interval_secs
    }
}
