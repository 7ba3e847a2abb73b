//! # Packet Definitions
//!
//! Fixed-layout control packets plus the kind byte that prefixes every
//! packet, including variable-length snapshot frames.
//!
//! Fixed packets are `Pod` so they go on the wire as-is.

use bytemuck::{Pod, Zeroable};

use crate::command::Command;
use crate::error::{NetError, NetResult};
use crate::tick::Tick;

/// First byte of every packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    /// Client -> Server: one-shot request to enter the game.
    JoinRequest = 1,
    /// Server -> Client: network identity for this connection.
    NetworkId = 2,
    /// Client -> Server: input for one tick, plus snapshot ack.
    Command = 3,
    /// Server -> Client: ghost snapshot frame.
    Snapshot = 4,
}

impl PacketKind {
    /// Parses a kind byte.
    pub fn from_byte(byte: u8) -> NetResult<Self> {
        match byte {
            1 => Ok(Self::JoinRequest),
            2 => Ok(Self::NetworkId),
            3 => Ok(Self::Command),
            4 => Ok(Self::Snapshot),
            other => Err(NetError::UnknownPacket(other)),
        }
    }
}

/// Join request. The payload is opaque; presence is the signal.
///
/// Size: 8 bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct JoinRequest {
    /// Always [`PacketKind::JoinRequest`].
    pub kind: u8,
    /// Padding for alignment.
    pub _padding: [u8; 3],
    /// Free-form join metadata.
    pub payload: i32,
}

impl JoinRequest {
    /// Creates a join request.
    #[inline]
    #[must_use]
    pub const fn new(payload: i32) -> Self {
        Self {
            kind: PacketKind::JoinRequest as u8,
            _padding: [0; 3],
            payload,
        }
    }
}

/// Network id assignment.
///
/// Size: 8 bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct NetworkIdPacket {
    /// Always [`PacketKind::NetworkId`].
    pub kind: u8,
    /// Padding for alignment.
    pub _padding: [u8; 3],
    /// Assigned id.
    pub network_id: u32,
}

impl NetworkIdPacket {
    /// Creates an assignment packet.
    #[inline]
    #[must_use]
    pub const fn new(network_id: u32) -> Self {
        Self {
            kind: PacketKind::NetworkId as u8,
            _padding: [0; 3],
            network_id,
        }
    }
}

/// Per-tick input packet.
///
/// Size: 12 bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CommandPacket {
    /// Always [`PacketKind::Command`].
    pub kind: u8,
    /// Bit 0: `ack_tick` is valid.
    pub flags: u8,
    /// Turn axis.
    pub horizontal: i8,
    /// Thrust axis.
    pub vertical: i8,
    /// Tick the input is for.
    pub tick: u32,
    /// Newest snapshot tick the client has received.
    pub ack_tick: u32,
}

impl CommandPacket {
    /// Flag: `ack_tick` carries a received snapshot tick.
    pub const FLAG_ACK: u8 = 1 << 0;

    /// Wraps a command and an optional snapshot ack.
    #[must_use]
    pub const fn new(command: Command, ack: Option<Tick>) -> Self {
        let (flags, ack_tick) = match ack {
            Some(tick) => (Self::FLAG_ACK, tick.0),
            None => (0, 0),
        };
        Self {
            kind: PacketKind::Command as u8,
            flags,
            horizontal: command.horizontal,
            vertical: command.vertical,
            tick: command.tick.0,
            ack_tick,
        }
    }

    /// The carried command.
    #[inline]
    #[must_use]
    pub const fn command(&self) -> Command {
        Command {
            tick: Tick(self.tick),
            horizontal: self.horizontal,
            vertical: self.vertical,
        }
    }

    /// The carried ack, if any.
    #[inline]
    #[must_use]
    pub const fn ack(&self) -> Option<Tick> {
        if self.flags & Self::FLAG_ACK != 0 {
            Some(Tick(self.ack_tick))
        } else {
            None
        }
    }
}

/// A received packet, classified by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Join request.
    JoinRequest(JoinRequest),
    /// Network id assignment.
    NetworkId(NetworkIdPacket),
    /// Command and ack.
    Command(CommandPacket),
    /// Snapshot frame, still encoded. See [`super::SnapshotReader`].
    Snapshot(&'a [u8]),
}

impl<'a> Packet<'a> {
    /// Classifies and, for fixed-layout kinds, parses a packet.
    pub fn parse(bytes: &'a [u8]) -> NetResult<Self> {
        let Some(&first) = bytes.first() else {
            return Err(NetError::Truncated {
                requested: 8,
                available: 0,
            });
        };
        match PacketKind::from_byte(first)? {
            PacketKind::JoinRequest => read_fixed(bytes).map(Self::JoinRequest),
            PacketKind::NetworkId => read_fixed(bytes).map(Self::NetworkId),
            PacketKind::Command => read_fixed(bytes).map(Self::Command),
            PacketKind::Snapshot => Ok(Self::Snapshot(bytes)),
        }
    }
}

/// Serializes a fixed-layout packet.
#[must_use]
pub fn to_bytes<T: Pod>(packet: &T) -> Vec<u8> {
    bytemuck::bytes_of(packet).to_vec()
}

fn read_fixed<T: Pod>(bytes: &[u8]) -> NetResult<T> {
    let size = std::mem::size_of::<T>();
    if bytes.len() != size {
        return Err(NetError::Truncated {
            requested: size * 8,
            available: bytes.len() * 8,
        });
    }
    Ok(bytemuck::pod_read_unaligned(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_sizes() {
        assert_eq!(std::mem::size_of::<JoinRequest>(), 8);
        assert_eq!(std::mem::size_of::<NetworkIdPacket>(), 8);
        assert_eq!(std::mem::size_of::<CommandPacket>(), 12);
    }

    #[test]
    fn test_command_packet_roundtrip() {
        let command = Command {
            tick: Tick(77),
            horizontal: -1,
            vertical: 1,
        };
        let bytes = to_bytes(&CommandPacket::new(command, Some(Tick(70))));
        let Packet::Command(parsed) = Packet::parse(&bytes).unwrap() else {
            panic!("expected command packet");
        };
        assert_eq!(parsed.command(), command);
        assert_eq!(parsed.ack(), Some(Tick(70)));

        let bytes = to_bytes(&CommandPacket::new(command, None));
        let Packet::Command(parsed) = Packet::parse(&bytes).unwrap() else {
            panic!("expected command packet");
        };
        assert_eq!(parsed.ack(), None);
    }

    #[test]
    fn test_join_request_roundtrip() {
        let bytes = to_bytes(&JoinRequest::new(42));
        assert_eq!(
            Packet::parse(&bytes).unwrap(),
            Packet::JoinRequest(JoinRequest::new(42))
        );
    }

    #[test]
    fn test_bad_packets_are_rejected() {
        assert_eq!(Packet::parse(&[0xEE, 0, 0]), Err(NetError::UnknownPacket(0xEE)));
        assert!(matches!(Packet::parse(&[]), Err(NetError::Truncated { .. })));
        assert!(matches!(
            Packet::parse(&[PacketKind::Command as u8, 0, 0]),
            Err(NetError::Truncated { .. })
        ));
    }
}
