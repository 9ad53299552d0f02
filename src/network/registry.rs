//! Connection Registry
//!
//! Tracks every live connection: which identity it joined as (set once, by
//! the first `join`), and which game it currently belongs to. All inbound
//! routing decisions resolve through here, so identity uniqueness and
//! game-membership checks happen in one place, under one lock.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::network::protocol::RequestError;

/// Identifier of one game session, as carried on the wire.
pub type GameId = String;

/// Per-connection record.
#[derive(Debug)]
struct Connection {
    /// Display name bound by the first join, if any.
    username: Option<String>,
    /// Game this connection currently plays in, if matched.
    game_id: Option<GameId>,
    /// When the connection registered.
    connected_at: Instant,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: BTreeMap<SocketAddr, Connection>,
    /// Reverse index: bound identity -> connection address.
    identities: BTreeMap<String, SocketAddr>,
}

/// What a removed connection was holding, for cleanup by the caller.
#[derive(Debug)]
pub struct RemovedConnection {
    /// The identity that was bound, if a join ever succeeded.
    pub username: Option<String>,
    /// The game the connection belonged to, if matched.
    pub game_id: Option<GameId>,
    /// How long the connection was registered.
    pub connected_for: Duration,
}

/// Registry of live connections and their identities.
///
/// Both maps live behind a single lock so that bind/remove/lookup are atomic
/// with respect to each other.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly accepted connection.
    pub async fn register(&self, addr: SocketAddr) {
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            addr,
            Connection {
                username: None,
                game_id: None,
                connected_at: Instant::now(),
            },
        );
    }

    /// Bind an identity to a connection.
    ///
    /// Fails with [`RequestError::DuplicateIdentity`] when the name is in use
    /// by any live connection, or when this connection already joined under
    /// another name. The identity is never rebound.
    pub async fn bind_identity(&self, addr: SocketAddr, username: &str) -> Result<(), RequestError> {
        let mut inner = self.inner.write().await;

        if inner.identities.contains_key(username) {
            return Err(RequestError::DuplicateIdentity(username.to_string()));
        }

        let conn = inner
            .connections
            .get_mut(&addr)
            .ok_or(RequestError::UnknownIdentity)?;
        if conn.username.is_some() {
            return Err(RequestError::DuplicateIdentity(username.to_string()));
        }

        conn.username = Some(username.to_string());
        inner.identities.insert(username.to_string(), addr);
        Ok(())
    }

    /// The identity bound to a connection, if any.
    pub async fn identity_of(&self, addr: SocketAddr) -> Option<String> {
        let inner = self.inner.read().await;
        inner.connections.get(&addr)?.username.clone()
    }

    /// Point an identity's connection at a game.
    ///
    /// Returns false when the identity has no live connection (it raced a
    /// disconnect); the caller must treat that participant as gone.
    pub async fn assign_session(&self, username: &str, game_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(addr) = inner.identities.get(username).copied() else {
            return false;
        };
        match inner.connections.get_mut(&addr) {
            Some(conn) => {
                conn.game_id = Some(game_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Resolve a game-directed message to `(identity, game id)`.
    ///
    /// Fails with [`RequestError::UnknownIdentity`] before a join, and with
    /// [`RequestError::SessionMismatch`] when the claimed game id is not the
    /// one this connection plays in.
    pub async fn resolve(
        &self,
        addr: SocketAddr,
        claimed_game: &str,
    ) -> Result<(String, GameId), RequestError> {
        let inner = self.inner.read().await;
        let conn = inner
            .connections
            .get(&addr)
            .ok_or(RequestError::UnknownIdentity)?;
        let username = conn
            .username
            .clone()
            .ok_or(RequestError::UnknownIdentity)?;

        match &conn.game_id {
            Some(id) if id == claimed_game => Ok((username, id.clone())),
            _ => Err(RequestError::SessionMismatch),
        }
    }

    /// Drop a connection and its identity binding.
    pub async fn remove(&self, addr: SocketAddr) -> Option<RemovedConnection> {
        let mut inner = self.inner.write().await;
        let conn = inner.connections.remove(&addr)?;
        if let Some(name) = &conn.username {
            inner.identities.remove(name);
        }
        Some(RemovedConnection {
            username: conn.username,
            game_id: conn.game_id,
            connected_for: conn.connected_at.elapsed(),
        })
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}
