//! # Session Handshake
//!
//! Per-connection state machine that gates ghost and command traffic.
//!
//! ```text
//!             network id           join request          first snapshot
//! Connecting ───────────► Connected ──────────► EnteringGame ──────────► InGame   (client)
//!
//!             network id           join request
//! Connecting ───────────► Connected ────────────────────────────────────► InGame   (server)
//! ```
//!
//! Disconnect from any state drops the session; a reconnect starts over at
//! `Connecting`. No snapshot or command may be produced or consumed for a
//! connection before it is `InGame`.
//!
//! The join request is sent exactly once and never retried. Losing it is
//! left to the transport's reliability.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Server-assigned identity of a connection, carried as ghost owner.
///
/// Never zero: zero on the wire means "owned by the server".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub u32);

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "net:{}", self.0)
    }
}

/// Handshake state of one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Transport link exists, no network id yet.
    #[default]
    Connecting = 0,
    /// Network id assigned.
    Connected = 1,
    /// Join request sent, waiting for the game to start (client only).
    EnteringGame = 2,
    /// Ghost and command traffic allowed.
    InGame = 3,
}

impl SessionState {
    /// True once gameplay traffic is allowed.
    #[inline]
    #[must_use]
    pub const fn is_in_game(self) -> bool {
        matches!(self, Self::InGame)
    }
}

/// Result of handling a join request on the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Connection moved to `InGame`; the caller spawns its ghost.
    Accepted,
    /// Already in game; nothing happens.
    AlreadyInGame,
    /// No network id yet; request ignored.
    NotConnected,
}

/// Server-side view of one connection's handshake.
#[derive(Clone, Debug, Default)]
pub struct ServerSession {
    state: SessionState,
    network_id: Option<NetworkId>,
}

impl ServerSession {
    /// New session for an accepted transport link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Assigned network id.
    #[inline]
    #[must_use]
    pub const fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    /// Assigns the network id. Only valid once, from `Connecting`.
    pub fn assign_network_id(&mut self, id: NetworkId) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        self.network_id = Some(id);
        self.state = SessionState::Connected;
        true
    }

    /// Handles a join request. Idempotent once in game.
    pub fn on_join_request(&mut self) -> JoinOutcome {
        match self.state {
            SessionState::Connecting => JoinOutcome::NotConnected,
            SessionState::Connected | SessionState::EnteringGame => {
                self.state = SessionState::InGame;
                JoinOutcome::Accepted
            }
            SessionState::InGame => JoinOutcome::AlreadyInGame,
        }
    }
}

/// A gate that opens exactly once.
#[derive(Debug, Default)]
pub struct OneShot(AtomicBool);

impl OneShot {
    /// A closed gate.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns true the first time only.
    pub fn fire(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    /// True once fired.
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Client-side view of the handshake.
#[derive(Debug, Default)]
pub struct ClientSession {
    state: SessionState,
    network_id: Option<NetworkId>,
    join: OneShot,
}

impl ClientSession {
    /// New session for a fresh transport link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Our network id, once the server assigned it.
    #[inline]
    #[must_use]
    pub const fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    /// Records the server-assigned id.
    pub fn on_network_id(&mut self, id: NetworkId) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        self.network_id = Some(id);
        self.state = SessionState::Connected;
        true
    }

    /// Claims the one-shot join request.
    ///
    /// True exactly once, and only from `Connected`; moves to `EnteringGame`.
    pub fn begin_join(&mut self) -> bool {
        if self.state != SessionState::Connected || !self.join.fire() {
            return false;
        }
        self.state = SessionState::EnteringGame;
        true
    }

    /// Notes that a snapshot arrived. Returns true if this entered the game.
    pub fn on_snapshot(&mut self) -> bool {
        if self.state != SessionState::EnteringGame {
            return false;
        }
        self.state = SessionState::InGame;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_handshake() {
        let mut session = ServerSession::new();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.assign_network_id(NetworkId(1)));
        assert!(!session.assign_network_id(NetworkId(2)));
        assert_eq!(session.network_id(), Some(NetworkId(1)));

        assert_eq!(session.on_join_request(), JoinOutcome::Accepted);
        assert!(session.state().is_in_game());
    }

    #[test]
    fn test_duplicate_join_is_ignored() {
        let mut session = ServerSession::new();
        session.assign_network_id(NetworkId(1));
        assert_eq!(session.on_join_request(), JoinOutcome::Accepted);
        assert_eq!(session.on_join_request(), JoinOutcome::AlreadyInGame);
        assert_eq!(session.state(), SessionState::InGame);
    }

    #[test]
    fn test_join_before_connected_is_ignored() {
        let mut session = ServerSession::new();
        assert_eq!(session.on_join_request(), JoinOutcome::NotConnected);
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_client_handshake() {
        let mut session = ClientSession::new();
        assert!(!session.begin_join());
        assert!(!session.on_snapshot());

        assert!(session.on_network_id(NetworkId(7)));
        assert!(session.begin_join());
        assert_eq!(session.state(), SessionState::EnteringGame);
        assert!(!session.begin_join());

        assert!(session.on_snapshot());
        assert_eq!(session.state(), SessionState::InGame);
        assert!(!session.on_snapshot());
    }

    #[test]
    fn test_one_shot_fires_once() {
        let gate = OneShot::new();
        assert!(!gate.has_fired());
        assert!(gate.fire());
        assert!(!gate.fire());
        assert!(gate.has_fired());
    }
}
