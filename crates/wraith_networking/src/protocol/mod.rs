//! # Wire Protocol
//!
//! Bit streams, the shared numeric compression model and packet layouts.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Kind (1 byte)                                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ JoinRequest / NetworkId / Command: fixed Pod layout          │
//! │ Snapshot: bit-packed frame, see `frame`                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Philosophy
//!
//! - Every bit counts: snapshot bodies are deltas against acked baselines
//! - Fixed-size structures where the payload is fixed
//! - Compression model and field order are a build-time contract

mod bits;
mod compression;
mod frame;
mod packets;

pub use bits::{BitReader, BitWriter};
pub use compression::{unzigzag, zigzag, CompressionModel, BUCKET_COUNT};
pub use frame::{GhostEntry, SnapshotReader, SnapshotWriter};
pub use packets::{
    to_bytes, CommandPacket, JoinRequest, NetworkIdPacket, Packet, PacketKind,
};
