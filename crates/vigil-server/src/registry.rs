use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use vigil_common::id::now_millis;
use vigil_common::proto::Frame;
use vigil_common::types::AgentStatus;
use vigil_storage::Store;

/// Outcome of pushing one frame to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    /// No live session for this agent; nothing is buffered.
    NotOnline,
    /// A session exists but the frame could not be handed to its writer.
    SendError,
}

struct SessionHandle {
    tx: mpsc::Sender<String>,
    epoch: u64,
}

/// The authoritative map of live agent sessions.
///
/// Each session is the sending half of the channel feeding that
/// connection's single writer task, so concurrent sends to one agent
/// serialize through the channel. Replacing a session drops the previous
/// sender, which closes the old writer and with it the old socket.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    store: Arc<dyn Store>,
    epoch: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            epoch: AtomicU64::new(1),
        }
    }

    fn read_sessions(&self) -> RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_sessions(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs a session for the agent, replacing any prior one, and marks
    /// the agent online. Returns the session epoch the caller must present
    /// on deregistration.
    pub fn register(&self, agent_id: &str, tx: mpsc::Sender<String>) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let replaced = {
            let mut sessions = self.write_sessions();
            sessions
                .insert(agent_id.to_string(), SessionHandle { tx, epoch })
                .is_some()
        };
        if replaced {
            tracing::info!(agent_id, "Replaced existing agent session");
        }

        if let Err(e) = self
            .store
            .set_agent_status(agent_id, AgentStatus::Online, now_millis())
        {
            tracing::error!(agent_id, error = %e, "Failed to mark agent online");
        }
        epoch
    }

    /// Removes the session and marks the agent offline.
    ///
    /// The epoch guards against a stale handler tearing down its
    /// replacement: only the session that was installed with this epoch is
    /// removed.
    pub fn deregister(&self, agent_id: &str, epoch: u64) {
        let removed = {
            let mut sessions = self.write_sessions();
            match sessions.get(agent_id) {
                Some(handle) if handle.epoch == epoch => {
                    sessions.remove(agent_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            if let Err(e) = self
                .store
                .set_agent_status(agent_id, AgentStatus::Offline, now_millis())
            {
                tracing::error!(agent_id, error = %e, "Failed to mark agent offline");
            }
        }
    }

    /// Pushes a single frame to the agent's session.
    pub fn send(&self, agent_id: &str, frame: &Frame) -> SendOutcome {
        let tx = {
            let sessions = self.read_sessions();
            match sessions.get(agent_id) {
                Some(handle) => handle.tx.clone(),
                None => return SendOutcome::NotOnline,
            }
        };

        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(agent_id, error = %e, "Failed to encode frame");
                return SendOutcome::SendError;
            }
        };

        match tx.try_send(text) {
            Ok(()) => SendOutcome::Ok,
            Err(e) => {
                tracing::warn!(agent_id, error = %e, "Failed to queue frame for agent");
                SendOutcome::SendError
            }
        }
    }

    pub fn online_agents(&self) -> Vec<String> {
        self.read_sessions().keys().cloned().collect()
    }

    pub fn is_online(&self, agent_id: &str) -> bool {
        self.read_sessions().contains_key(agent_id)
    }

    pub fn session_count(&self) -> usize {
        self.read_sessions().len()
    }

    /// Stamps agent liveness on inbound traffic (heartbeats and payloads).
    pub fn touch(&self, agent_id: &str) {
        if let Err(e) = self
            .store
            .set_agent_status(agent_id, AgentStatus::Online, now_millis())
        {
            tracing::error!(agent_id, error = %e, "Failed to stamp agent liveness");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::proto::HeartbeatPayload;
    use vigil_common::types::Agent;
    use vigil_storage::sqlite::SqliteStore;

    fn setup() -> (Arc<SqliteStore>, ConnectionRegistry) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let registry = ConnectionRegistry::new(store.clone());
        (store, registry)
    }

    fn seed_agent(store: &SqliteStore, id: &str) {
        let agent = Agent {
            id: id.to_string(),
            name: id.to_string(),
            ..Agent::default()
        };
        store.register_agent(&agent).unwrap();
    }

    fn heartbeat() -> Frame {
        Frame::Heartbeat(HeartbeatPayload {
            timestamp: now_millis(),
        })
    }

    #[test]
    fn send_to_registered_agent_succeeds() {
        let (store, registry) = setup();
        seed_agent(&store, "a1");

        let (tx, mut rx) = mpsc::channel(8);
        registry.register("a1", tx);

        assert_eq!(registry.send("a1", &heartbeat()), SendOutcome::Ok);
        let raw = rx.try_recv().unwrap();
        assert!(matches!(
            Frame::from_json(&raw).unwrap(),
            Frame::Heartbeat(_)
        ));

        // Registered agents never see NotOnline.
        for id in registry.online_agents() {
            assert_ne!(registry.send(&id, &heartbeat()), SendOutcome::NotOnline);
        }
    }

    #[test]
    fn send_to_unknown_agent_is_not_online() {
        let (_store, registry) = setup();
        assert_eq!(registry.send("ghost", &heartbeat()), SendOutcome::NotOnline);
    }

    #[test]
    fn register_marks_online_and_deregister_marks_offline() {
        let (store, registry) = setup();
        seed_agent(&store, "a1");

        let (tx, _rx) = mpsc::channel(8);
        let epoch = registry.register("a1", tx);
        assert_eq!(store.get_agent("a1").unwrap().status, AgentStatus::Online);
        assert!(registry.is_online("a1"));

        registry.deregister("a1", epoch);
        assert_eq!(store.get_agent("a1").unwrap().status, AgentStatus::Offline);
        assert!(!registry.is_online("a1"));
    }

    #[test]
    fn stale_deregister_does_not_evict_replacement() {
        let (store, registry) = setup();
        seed_agent(&store, "a1");

        let (tx1, _rx1) = mpsc::channel(8);
        let old_epoch = registry.register("a1", tx1);

        let (tx2, mut rx2) = mpsc::channel(8);
        let _new_epoch = registry.register("a1", tx2);

        // The replaced handler finishes and deregisters with its old epoch;
        // the new session must survive.
        registry.deregister("a1", old_epoch);
        assert!(registry.is_online("a1"));
        assert_eq!(store.get_agent("a1").unwrap().status, AgentStatus::Online);

        assert_eq!(registry.send("a1", &heartbeat()), SendOutcome::Ok);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn replaced_session_channel_is_closed() {
        let (store, registry) = setup();
        seed_agent(&store, "a1");

        let (tx1, mut rx1) = mpsc::channel(8);
        registry.register("a1", tx1);
        let (tx2, _rx2) = mpsc::channel(8);
        registry.register("a1", tx2);

        // The old writer's receive loop observes a closed channel.
        assert!(matches!(
            rx1.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn send_to_dropped_writer_is_send_error() {
        let (store, registry) = setup();
        seed_agent(&store, "a1");

        let (tx, rx) = mpsc::channel(8);
        registry.register("a1", tx);
        drop(rx);

        assert_eq!(registry.send("a1", &heartbeat()), SendOutcome::SendError);
    }
}
