//! # WRAITH Shared
//!
//! Common types used by both client and server.
//!
//! ## CRITICAL RULE
//!
//! Anything in this crate is part of the wire contract. Both peers must be
//! built from the same revision; there is no runtime negotiation for it.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{MAX_CLIENTS, MAX_PACKET_SIZE, TICK_RATE};
pub use math::{Quaternion, Vec3};
