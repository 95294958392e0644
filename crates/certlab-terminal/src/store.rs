//! In-memory session table.
//!
//! Pure data, no I/O. The store is mutated only from the connection
//! manager's status hook and from [`TerminalManager`] calls, both of which
//! hold the manager's lock.
//!
//! [`TerminalManager`]: crate::TerminalManager

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection status of one logical terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Connected => write!(f, "connected"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connecting" => Ok(SessionStatus::Connecting),
            "connected" => Ok(SessionStatus::Connected),
            "disconnected" => Ok(SessionStatus::Disconnected),
            "error" => Ok(SessionStatus::Error),
            _ => Err(format!("unknown session status: {}", s)),
        }
    }
}

/// Metadata for one logical terminal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Opaque session id.
    pub session_id: String,
    /// Current connection status.
    pub status: SessionStatus,
    /// Last status change.
    pub last_activity: DateTime<Utc>,
}

/// Table of known terminal sessions and which one is active.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, SessionMeta>,
    active: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session if unknown. The first session becomes active.
    pub fn ensure(&mut self, session_id: &str) {
        if !self.sessions.contains_key(session_id) {
            self.sessions.insert(
                session_id.to_string(),
                SessionMeta {
                    session_id: session_id.to_string(),
                    status: SessionStatus::Disconnected,
                    last_activity: Utc::now(),
                },
            );
        }
        if self.active.is_none() {
            self.active = Some(session_id.to_string());
        }
    }

    /// Record a status change, refreshing the activity timestamp.
    pub fn set_status(&mut self, session_id: &str, status: SessionStatus) {
        if let Some(meta) = self.sessions.get_mut(session_id) {
            meta.status = status;
            meta.last_activity = Utc::now();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionMeta> {
        self.sessions.get(session_id)
    }

    /// Remove a session. If it was active, an arbitrary remaining session
    /// becomes active, or none.
    pub fn remove(&mut self, session_id: &str) -> Option<SessionMeta> {
        let removed = self.sessions.remove(session_id);
        if self.active.as_deref() == Some(session_id) {
            self.active = self.sessions.keys().next().cloned();
        }
        removed
    }

    /// Mark a known session as active. Returns false for unknown ids.
    pub fn set_active(&mut self, session_id: &str) -> bool {
        if self.sessions.contains_key(session_id) {
            self.active = Some(session_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn snapshot(&self) -> Vec<SessionMeta> {
        self.sessions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active = None;
    }
}
