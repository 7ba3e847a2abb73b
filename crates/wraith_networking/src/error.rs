//! # Networking Error Types
//!
//! Errors that can surface from the replication core.
//!
//! Missing commands, missing baselines for new ghosts and duplicate join
//! requests are deliberately absent: those are normal operating conditions
//! and are reported through `Option`s and outcome enums instead.

use thiserror::Error;

use crate::session::SessionState;

/// Errors that can occur while encoding, decoding or driving connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Writing would exceed the packet budget.
    #[error("packet overflow: {requested} bits requested with {available} bits left")]
    PacketOverflow {
        /// Bits the write needed.
        requested: usize,
        /// Bits still available in the packet.
        available: usize,
    },

    /// The packet ended before the reader was done.
    #[error("truncated packet: needed {requested} bits, {available} remaining")]
    Truncated {
        /// Bits the read needed.
        requested: usize,
        /// Bits remaining in the packet.
        available: usize,
    },

    /// A prefix code that the compression model does not contain.
    #[error("invalid prefix code in packed integer")]
    InvalidPrefixCode,

    /// Unknown packet kind byte.
    #[error("unknown packet kind: {0}")]
    UnknownPacket(u8),

    /// Unknown ghost type id.
    #[error("unknown ghost type: {0}")]
    UnknownGhostType(u32),

    /// A snapshot entry declared a baseline the receiver no longer holds.
    #[error("missing baseline: ghost {ghost} at tick {tick}")]
    MissingBaseline {
        /// Ghost instance id.
        ghost: u32,
        /// Baseline tick the entry was encoded against.
        tick: u32,
    },

    /// A ghost changed type between baseline and snapshot.
    #[error("ghost {ghost} type mismatch against its baseline")]
    GhostTypeMismatch {
        /// Ghost instance id.
        ghost: u32,
    },

    /// No connection with this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(u32),

    /// Gameplay traffic for a connection that has not reached `InGame`.
    #[error("connection not in game (state: {0:?})")]
    NotInGame(SessionState),

    /// All connection slots are taken.
    #[error("server full: {0} connections")]
    ServerFull(usize),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Peer compression model differs from ours.
    #[error("compression model mismatch: expected {expected:#018x}, got {actual:#018x}")]
    ModelMismatch {
        /// Fingerprint required by configuration.
        expected: u64,
        /// Fingerprint of the loaded model.
        actual: u64,
    },
}

/// Result type for networking operations.
pub type NetResult<T> = Result<T, NetError>;
