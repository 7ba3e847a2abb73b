//! # WRAITH Networking - The Ghost Protocol
//!
//! Snapshot replication core for an authoritative server and predicting
//! clients over a lossy, ordered transport.
//!
//! ## Architecture
//!
//! - **Compression**: shared bucketed prefix-code model for packed integers
//! - **Quantization**: fixed-point positions, velocities and yaw rotations
//! - **Snapshots**: per-ghost change masks and deltas against a baseline
//! - **Prediction**: two-baseline extrapolation for ticks that never arrived
//! - **Commands**: tick-indexed input ring, neutral input on a miss
//! - **Handshake**: per-connection state machine gating all gameplay traffic
//!
//! ## Data Flow
//!
//! ```text
//! SERVER                                        CLIENT
//!   simulation tick                               |
//!   build_snapshots ── delta vs acked ──────────> receive
//!     baseline per (connection, ghost)            |  decode vs named baseline
//!                                                 |  history per ghost
//!   poll_events <──── command + ack ───────────── sample_command
//!   command_for_ghost(tick)                       predicted_state (replay)
//!                                                 interpolated_state (others)
//! ```
//!
//! The compression model and quantization scales are a build-time
//! contract. Both ends must be built from the same revision; a config can
//! pin the expected model fingerprint.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wraith_networking::{ReplicationConfig, ReplicationServer};
//!
//! let mut server = ReplicationServer::new(ReplicationConfig::default())?;
//! let events = server.event_sender(); // hand to the transport
//!
//! loop {
//!     let outgoing = server.poll_events(world.tick(), &mut world);
//!     world.step(&movement, |ghost, tick| server.command_for_ghost(ghost, tick));
//!     let frames = server.build_snapshots(&world);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod baseline;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod prediction;
pub mod presentation;
pub mod protocol;
pub mod quantize;
pub mod server;
pub mod session;
pub mod simulation;
pub mod snapshot;
pub mod tick;

// Re-exports for convenience
pub use baseline::{BaselineStore, SentFrame, SentHistory, SnapshotHistory};
pub use client::{ClientStats, CommandSimulation, ReplicationClient};
pub use command::{Command, CommandBuffer};
pub use config::ReplicationConfig;
pub use error::{NetError, NetResult};
pub use interpolation::{interpolate, interpolation_factor, RenderTime};
pub use prediction::{predict_fields, predict_value, Sample};
pub use presentation::{Committed, CommittedView};
pub use protocol::{CompressionModel, Packet, PacketKind, SnapshotReader, SnapshotWriter};
pub use server::{
    ConnectionId, GhostSpawner, ReplicatedGhost, ReplicationServer, ServerStats,
    SimulationSource, TransportEvent,
};
pub use session::{ClientSession, JoinOutcome, NetworkId, ServerSession, SessionState};
pub use simulation::{GhostWorld, LinkConditions, LossyLink, ThrustMovement};
pub use snapshot::{
    AvatarSnapshot, ChangeMask, GhostId, GhostSnapshot, GhostState, GhostType,
    ProjectileSnapshot,
};
pub use tick::{Tick, TickClock, TickStats};
