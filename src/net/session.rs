//! Session management module
//!
//! Manages client sessions including:
//! - Session lifecycle (creation, tracking, cleanup)
//! - Session state (connected, in world, disconnecting)
//! - The entity a session controls
//! - Thread-safe session registry shared by connection tasks and the world loop

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{NetworkError, Result};
use crate::game::entity::EntityId;
use crate::game::map::MapId;
use crate::net::sender::NetworkSender;
use crate::protocol::messages::ServerMessage;

/// Unique session identifier
pub type SessionId = u64;

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Connected, waiting for the world to assign an entity
    Connected,
    /// Controlling an entity in the world
    InWorld,
    /// Session is disconnecting
    Disconnecting,
}

impl SessionState {
    /// Check if the session may send movement and chat
    pub fn can_act(&self) -> bool {
        matches!(self, SessionState::InWorld)
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::InWorld => "InWorld",
            SessionState::Disconnecting => "Disconnecting",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    state: RwLock<SessionState>,
    /// Entity controlled by this session
    entity: RwLock<Option<(MapId, EntityId)>>,
    sender: Arc<dyn NetworkSender>,
    /// Time of session creation
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    /// Create a new session delivering through `sender`
    pub fn new(id: SessionId, address: SocketAddr, sender: Arc<dyn NetworkSender>) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            state: RwLock::new(SessionState::Connected),
            entity: RwLock::new(None),
            sender,
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    /// Get the IP address as a string
    pub fn ip(&self) -> String {
        self.address.ip().to_string()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Bind the session to its entity and enter the world
    pub fn attach_entity(&self, map: MapId, entity: EntityId) {
        *self.entity.write() = Some((map, entity));
        self.set_state(SessionState::InWorld);
    }

    /// Entity controlled by this session
    pub fn entity(&self) -> Option<(MapId, EntityId)> {
        *self.entity.read()
    }

    /// Update last activity timestamp
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_duration(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Queue a message to the client
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        self.sender.send_message(message)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("entity", &self.entity())
            .field("idle_duration", &self.idle_duration())
            .finish()
    }
}

/// Thread-safe session manager
pub struct SessionManager {
    sessions: DashMap<SessionId, Arc<Session>>,
    /// IP address to session ids (for connection limiting)
    ip_to_sessions: DashMap<String, Vec<SessionId>>,
    next_id: AtomicU64,
    max_per_ip: usize,
}

impl SessionManager {
    /// Create a session manager allowing `max_per_ip` connections per address
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ip_to_sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_per_ip,
        }
    }

    /// Create a new session and register it
    pub fn create_session(
        &self,
        address: SocketAddr,
        sender: Arc<dyn NetworkSender>,
    ) -> Result<Arc<Session>> {
        let ip = address.ip().to_string();

        let current_count = self.ip_to_sessions.get(&ip).map(|v| v.len()).unwrap_or(0);
        if current_count >= self.max_per_ip {
            warn!(
                ip = %ip,
                count = current_count,
                max = self.max_per_ip,
                "Connection limit exceeded for IP"
            );
            return Err(NetworkError::TooManyConnections(ip).into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(id, address, sender));

        self.sessions.insert(id, session.clone());
        self.ip_to_sessions.entry(ip).or_default().push(id);

        info!(session_id = id, address = %address, "Session created");
        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Remove a session
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(&id)?;

        let ip = session.ip();
        if let Some(mut sessions) = self.ip_to_sessions.get_mut(&ip) {
            sessions.retain(|&sid| sid != id);
        }
        self.ip_to_sessions.retain(|_, v| !v.is_empty());

        session.set_state(SessionState::Disconnecting);
        info!(session_id = id, entity = ?session.entity(), "Session removed");
        Some(session)
    }

    /// Get the count of active sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the count of sessions per state
    pub fn count_by_state(&self) -> HashMap<SessionState, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.iter() {
            *counts.entry(session.state()).or_insert(0) += 1;
        }
        counts
    }

    /// Send a message to every session controlling an entity on `map`.
    /// Returns the number of sessions reached.
    pub fn broadcast_to_map(&self, map: MapId, message: &ServerMessage) -> usize {
        let mut sent = 0;
        for session in self.sessions.iter() {
            if !matches!(session.entity(), Some((m, _)) if m == map) {
                continue;
            }
            match session.send(message) {
                Ok(()) => sent += 1,
                Err(e) => warn!(session_id = session.id, error = %e, "Failed to deliver broadcast"),
            }
        }
        sent
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.count())
            .field("max_per_ip", &self.max_per_ip)
            .finish()
    }
}
