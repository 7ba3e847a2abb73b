//! # Network Constants
//!
//! **CRITICAL:** These values are baked into both binaries.
//! Changes require a client and server rebuild.

/// Tick rate (simulation steps per second).
pub const TICK_RATE: u32 = 60;

/// Maximum clients per server.
pub const MAX_CLIENTS: usize = 64;

/// Maximum packet size (MTU-safe).
pub const MAX_PACKET_SIZE: usize = 1200;

/// Server tick duration in microseconds.
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / TICK_RATE as u64;
