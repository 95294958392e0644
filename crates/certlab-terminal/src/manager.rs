//! Multi-session registry.

use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use log::info;
use uuid::Uuid;

use crate::bridge::TerminalBridge;
use crate::config::TerminalConfig;
use crate::connection::StatusHook;
use crate::store::{SessionMeta, SessionStore};
use crate::transport::{Transport, WsTransport};

/// Registry of terminal bridges keyed by session id.
///
/// An explicit context object: construct one and hand it to whatever needs
/// terminals. Bridges are created lazily-disconnected; the connection opens
/// on the first send (or an explicit `connect`).
pub struct TerminalManager {
    config: Arc<TerminalConfig>,
    transport: Arc<dyn Transport>,
    bridges: DashMap<String, Arc<TerminalBridge>>,
    store: Arc<Mutex<SessionStore>>,
}

impl TerminalManager {
    /// Manager speaking WebSocket to the configured endpoint.
    pub fn new(config: TerminalConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Manager with a caller-supplied transport (used by tests).
    pub fn with_transport(config: TerminalConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            bridges: DashMap::new(),
            store: Arc::new(Mutex::new(SessionStore::new())),
        }
    }

    /// Idempotent: returns the existing bridge for this id, or constructs
    /// one (not yet connected).
    pub fn create_or_get(&self, session_id: &str) -> Arc<TerminalBridge> {
        self.store().ensure(session_id);

        let bridge = self
            .bridges
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("creating terminal session {}", session_id);
                let store = self.store.clone();
                let id = session_id.to_string();
                let status_hook: StatusHook = Box::new(move |status| {
                    if let Ok(mut store) = store.lock() {
                        store.set_status(&id, status);
                    }
                });
                TerminalBridge::spawn(
                    session_id.to_string(),
                    self.config.clone(),
                    self.transport.clone(),
                    status_hook,
                )
            });
        bridge.value().clone()
    }

    /// Create a session with a generated id.
    pub fn create(&self) -> Arc<TerminalBridge> {
        let session_id = Uuid::new_v4().to_string();
        self.create_or_get(&session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<TerminalBridge>> {
        self.bridges.get(session_id).map(|entry| entry.value().clone())
    }

    /// Mark a session as active for UI focus. Returns false for unknown ids.
    pub fn set_active(&self, session_id: &str) -> bool {
        self.store().set_active(session_id)
    }

    /// The currently active bridge, if any.
    pub fn active(&self) -> Option<Arc<TerminalBridge>> {
        let active_id = self.store().active_id()?.to_string();
        self.get(&active_id)
    }

    /// Disconnect and evict a session. If it was active, an arbitrary
    /// remaining session becomes active.
    pub fn remove(&self, session_id: &str) {
        if let Some((_, bridge)) = self.bridges.remove(session_id) {
            info!("removing terminal session {}", session_id);
            bridge.disconnect();
        }
        self.store().remove(session_id);
    }

    /// Disconnect every bridge and clear the registry.
    pub fn shutdown_all(&self) {
        info!("shutting down {} terminal session(s)", self.bridges.len());
        for entry in self.bridges.iter() {
            entry.value().disconnect();
        }
        self.bridges.clear();
        self.store().clear();
    }

    /// Metadata snapshot for one session.
    pub fn session(&self, session_id: &str) -> Option<SessionMeta> {
        self.store().get(session_id).cloned()
    }

    /// Metadata snapshot for all known sessions.
    pub fn sessions(&self) -> Vec<SessionMeta> {
        self.store().snapshot()
    }

    fn store(&self) -> MutexGuard<'_, SessionStore> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
