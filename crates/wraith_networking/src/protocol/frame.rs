//! # Snapshot Frames
//!
//! One frame per connection per tick.
//!
//! ```text
//! ┌──────┬──────────┬─────────────┬─────────────────────────────┬───────────────┐
//! │ kind │ tick     │ ghost count │ ghost entries ...           │ despawn list  │
//! │ 8b   │ 32b raw  │ packed      │                             │ count + ids   │
//! └──────┴──────────┴─────────────┴─────────────────────────────┴───────────────┘
//!
//! ghost entry:
//!   id (packed) │ type (packed) │ owner (packed, 0 = server)
//!   │ baseline age (packed, 0 = zero baseline) │ snapshot body
//! ```
//!
//! The baseline is named by its age relative to the frame tick, so the
//! receiver resolves it against its own history of that ghost.

use super::bits::{BitReader, BitWriter};
use super::compression::CompressionModel;
use super::packets::PacketKind;
use crate::error::{NetError, NetResult};
use crate::session::NetworkId;
use crate::snapshot::{GhostId, GhostState, GhostType};
use crate::tick::Tick;

/// One decoded ghost entry.
#[derive(Clone, Debug, PartialEq)]
pub struct GhostEntry {
    /// Ghost instance.
    pub ghost: GhostId,
    /// Controlling client, if any.
    pub owner: Option<NetworkId>,
    /// Tick of the baseline it was encoded against, `None` for zero.
    pub baseline: Option<Tick>,
    /// Decoded state.
    pub state: GhostState,
}

/// Builds a snapshot frame.
///
/// Entries go into a separate body so the ghost count can lead the frame.
/// An entry that would push the frame past its budget is rolled back and
/// reported as [`NetError::PacketOverflow`]; the frame stays valid and the
/// caller may try smaller ghosts or finish.
pub struct SnapshotWriter<'m> {
    model: &'m CompressionModel,
    max_bytes: usize,
    tick: Tick,
    body: BitWriter,
    written: usize,
    despawns: Vec<GhostId>,
    /// Kind, tick and despawn trailer; the count is added per entry.
    fixed_bits: usize,
}

impl<'m> SnapshotWriter<'m> {
    /// Header bits before the packed ghost count.
    const HEADER_BITS: usize = 8 + 32;

    /// Starts a frame for `tick` that ends with `despawns`.
    ///
    /// Fails if the header and despawn list alone exceed `max_bytes`.
    pub fn begin(
        model: &'m CompressionModel,
        max_bytes: usize,
        tick: Tick,
        despawns: &[GhostId],
    ) -> NetResult<Self> {
        let trailer_bits = model.packed_size(count_to_u32(despawns.len()))
            + despawns.iter().map(|g| model.packed_size(g.0)).sum::<usize>();
        let fixed_bits = Self::HEADER_BITS + trailer_bits;
        let minimum = fixed_bits + model.packed_size(0);
        if minimum > max_bytes * 8 {
            return Err(NetError::PacketOverflow {
                requested: minimum,
                available: max_bytes * 8,
            });
        }
        Ok(Self {
            model,
            max_bytes,
            tick,
            body: BitWriter::new(max_bytes),
            written: 0,
            despawns: despawns.to_vec(),
            fixed_bits,
        })
    }

    /// Entries written so far.
    #[inline]
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Appends one ghost, delta-encoded against `baseline` (zero if `None`).
    ///
    /// `state` is relabelled with the frame tick. Returns the snapshot as
    /// sent, to be kept until acknowledged. On overflow nothing is written.
    pub fn write_ghost(
        &mut self,
        ghost: GhostId,
        owner: Option<NetworkId>,
        baseline: Option<&GhostState>,
        state: &GhostState,
    ) -> NetResult<GhostState> {
        let mark = self.body.bit_len();
        let sent = self.encode_entry(ghost, owner, baseline, state).and_then(|sent| {
            let total = self.fixed_bits
                + self.model.packed_size(count_to_u32(self.written + 1))
                + self.body.bit_len();
            let available = self.max_bytes * 8;
            if total > available {
                return Err(NetError::PacketOverflow {
                    requested: total,
                    available,
                });
            }
            Ok(sent)
        });
        match sent {
            Ok(sent) => {
                self.written += 1;
                Ok(sent)
            }
            Err(e) => {
                self.body.rewind(mark);
                Err(e)
            }
        }
    }

    fn encode_entry(
        &mut self,
        ghost: GhostId,
        owner: Option<NetworkId>,
        baseline: Option<&GhostState>,
        state: &GhostState,
    ) -> NetResult<GhostState> {
        #[allow(clippy::cast_sign_loss)]
        let age = baseline.map_or(0, |b| self.tick.diff(b.tick()).max(0) as u32);
        let baseline = if age == 0 { None } else { baseline };

        let model = self.model;
        let writer = &mut self.body;
        model.write_packed_uint(writer, ghost.0)?;
        model.write_packed_uint(writer, state.ghost_type().wire_id())?;
        model.write_packed_uint(writer, owner.map_or(0, |id| id.0))?;
        model.write_packed_uint(writer, age)?;
        state.at_tick(self.tick).encode(ghost, baseline, model, writer)
    }

    /// Assembles header, entries and despawn list into the packet bytes.
    pub fn finish(self) -> NetResult<Vec<u8>> {
        let model = self.model;
        let mut writer = BitWriter::new(self.max_bytes);
        writer.write_u8(PacketKind::Snapshot as u8)?;
        writer.write_u32(self.tick.0)?;
        model.write_packed_uint(&mut writer, count_to_u32(self.written))?;

        let body_bits = self.body.bit_len();
        writer.write_stream(&self.body.finish(), body_bits)?;

        model.write_packed_uint(&mut writer, count_to_u32(self.despawns.len()))?;
        for ghost in &self.despawns {
            model.write_packed_uint(&mut writer, ghost.0)?;
        }
        Ok(writer.finish())
    }
}

/// Reads a snapshot frame entry by entry.
pub struct SnapshotReader<'a, 'm> {
    model: &'m CompressionModel,
    reader: BitReader<'a>,
    tick: Tick,
    remaining: u32,
}

impl<'a, 'm> SnapshotReader<'a, 'm> {
    /// Opens a frame and reads its header.
    pub fn open(model: &'m CompressionModel, bytes: &'a [u8]) -> NetResult<Self> {
        let mut reader = BitReader::new(bytes);
        let kind = reader.read_u8()?;
        if PacketKind::from_byte(kind)? != PacketKind::Snapshot {
            return Err(NetError::UnknownPacket(kind));
        }
        let tick = Tick(reader.read_u32()?);
        let remaining = model.read_packed_uint(&mut reader)?;
        Ok(Self {
            model,
            reader,
            tick,
            remaining,
        })
    }

    /// Frame tick.
    #[inline]
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Entries not yet read.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Reads the next ghost, resolving its baseline through `lookup`.
    ///
    /// `lookup(ghost, tick)` returns the receiver's copy of the named
    /// baseline. A declared baseline the receiver lacks is an error: decoding
    /// against anything else would silently corrupt the ghost.
    pub fn next_ghost<F>(&mut self, lookup: F) -> NetResult<Option<GhostEntry>>
    where
        F: FnOnce(GhostId, Tick) -> Option<GhostState>,
    {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let model = self.model;
        let reader = &mut self.reader;
        let ghost = GhostId(model.read_packed_uint(reader)?);
        let ghost_type = GhostType::from_wire(model.read_packed_uint(reader)?)?;
        let owner = match model.read_packed_uint(reader)? {
            0 => None,
            id => Some(NetworkId(id)),
        };
        let age = model.read_packed_uint(reader)?;

        let (baseline_tick, baseline) = if age == 0 {
            (None, None)
        } else {
            let tick = self.tick.wrapping_sub(age);
            let state = lookup(ghost, tick).ok_or(NetError::MissingBaseline {
                ghost: ghost.0,
                tick: tick.0,
            })?;
            (Some(tick), Some(state))
        };

        let state =
            GhostState::decode(ghost, ghost_type, self.tick, baseline.as_ref(), model, reader)?;
        Ok(Some(GhostEntry {
            ghost,
            owner,
            baseline: baseline_tick,
            state,
        }))
    }

    /// Reads the despawn list. Call after all ghost entries.
    pub fn despawns(mut self) -> NetResult<Vec<GhostId>> {
        debug_assert_eq!(self.remaining, 0, "unread ghost entries");
        let count = self.model.read_packed_uint(&mut self.reader)?;
        let mut despawns = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            despawns.push(GhostId(self.model.read_packed_uint(&mut self.reader)?));
        }
        Ok(despawns)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn count_to_u32(count: usize) -> u32 {
    count.min(u32::MAX as usize) as u32
}
