//! # Ghost Snapshots
//!
//! Per-tick, per-ghost records of quantized state, and the codec that
//! delta-compresses them against a baseline.
//!
//! ## Wire Shape
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────────────┐
//! │ change mask (delta vs        │ for each set bit, in group order:    │
//! │ baseline's mask, packed)     │   packed int delta per field         │
//! └──────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! The change mask is computed on the *quantized* values, so quantization
//! noise can never flip a bit. Unset groups are copied from the baseline
//! verbatim on decode.
//!
//! A ghost seen for the first time is encoded against [`GhostSnapshot::zero`]
//! so every non-zero group is sent.
//!
//! ## Ghost Types
//!
//! Each ghost type implements the [`GhostSnapshot`] capability set.
//! [`GhostState`] is the closed set of types this build knows, selected by
//! the wire type id.

mod avatar;
mod projectile;

pub use avatar::AvatarSnapshot;
pub use projectile::ProjectileSnapshot;

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};
use crate::protocol::{BitReader, BitWriter, CompressionModel};
use crate::tick::Tick;

/// Server-assigned ghost instance id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GhostId(pub u32);

impl std::fmt::Display for GhostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ghost:{}", self.0)
    }
}

/// One bit per field group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChangeMask(pub u32);

impl ChangeMask {
    /// No group changed.
    pub const EMPTY: Self = Self(0);

    /// Returns true if group `bit` is marked changed.
    #[inline]
    #[must_use]
    pub const fn is_set(self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// Marks group `bit` changed when `changed` is true.
    #[inline]
    #[must_use]
    pub const fn with(self, bit: u32, changed: bool) -> Self {
        if changed {
            Self(self.0 | (1 << bit))
        } else {
            self
        }
    }

    /// Number of changed groups.
    #[inline]
    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Ghost type ids. Part of the wire schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GhostType {
    /// Player-controlled, predicted on its owner.
    Avatar = 0,
    /// Server-driven, interpolated everywhere.
    Projectile = 1,
}

impl GhostType {
    /// Wire type id.
    #[inline]
    #[must_use]
    pub const fn wire_id(self) -> u32 {
        self as u32
    }

    /// Parses a wire type id.
    pub fn from_wire(id: u32) -> NetResult<Self> {
        match id {
            0 => Ok(Self::Avatar),
            1 => Ok(Self::Projectile),
            other => Err(NetError::UnknownGhostType(other)),
        }
    }
}

/// Capabilities every replicated ghost type provides.
///
/// All operations work in the quantized integer domain except
/// [`GhostSnapshot::interpolate`], which blends in the physical domain and
/// re-quantizes.
pub trait GhostSnapshot: Clone + std::fmt::Debug + PartialEq + Sized {
    /// Wire type id for this snapshot type.
    const GHOST_TYPE: GhostType;

    /// Tick the snapshot describes.
    fn tick(&self) -> Tick;

    /// Mask this snapshot was encoded with.
    fn change_mask(&self) -> ChangeMask;

    /// All-zero baseline, used on first contact.
    fn zero(tick: Tick) -> Self;

    /// Groups whose quantized values differ from `baseline`.
    fn diff_mask(&self, baseline: &Self) -> ChangeMask;

    /// Writes `self` as a delta against `baseline`.
    ///
    /// Returns the snapshot as sent, carrying the computed change mask.
    fn encode(
        &self,
        baseline: &Self,
        model: &CompressionModel,
        writer: &mut BitWriter,
    ) -> NetResult<Self>;

    /// Reads a snapshot for `tick` encoded against `baseline`.
    fn decode(
        tick: Tick,
        baseline: &Self,
        model: &CompressionModel,
        reader: &mut BitReader<'_>,
    ) -> NetResult<Self>;

    /// Estimates the state at `target` from up to two baselines.
    ///
    /// `current` is returned when neither baseline is available.
    fn predict(current: &Self, target: Tick, first: Option<&Self>, second: Option<&Self>) -> Self;

    /// Blends towards `target`; `factor` is clamped to `[0, 1]`.
    fn interpolate(&self, target: &Self, factor: f32) -> Self;
}

/// Writes the mask and the changed groups' field deltas.
///
/// Shared tail of every `GhostSnapshot::encode`: `groups[i]` holds the
/// current and baseline fields of group `i`.
fn write_groups(
    model: &CompressionModel,
    writer: &mut BitWriter,
    mask: ChangeMask,
    baseline_mask: ChangeMask,
    groups: &[(&[i32], &[i32])],
) -> NetResult<()> {
    model.write_packed_uint_delta(writer, mask.0, baseline_mask.0)?;
    for (bit, (current, baseline)) in (0u32..).zip(groups) {
        if !mask.is_set(bit) {
            continue;
        }
        for (&value, &base) in current.iter().zip(baseline.iter()) {
            model.write_packed_int_delta(writer, value, base)?;
        }
    }
    Ok(())
}

/// Reads the mask written by [`write_groups`].
fn read_mask(
    model: &CompressionModel,
    reader: &mut BitReader<'_>,
    baseline_mask: ChangeMask,
) -> NetResult<ChangeMask> {
    Ok(ChangeMask(model.read_packed_uint_delta(reader, baseline_mask.0)?))
}

/// Reads one group into `fields`, which hold the baseline values on entry.
fn read_group(
    model: &CompressionModel,
    reader: &mut BitReader<'_>,
    mask: ChangeMask,
    bit: u32,
    fields: &mut [i32],
) -> NetResult<()> {
    if mask.is_set(bit) {
        for field in fields.iter_mut() {
            *field = model.read_packed_int_delta(reader, *field)?;
        }
    }
    Ok(())
}

/// Closed set of ghost types known to this build.
#[derive(Clone, Debug, PartialEq)]
pub enum GhostState {
    /// Avatar snapshot.
    Avatar(AvatarSnapshot),
    /// Projectile snapshot.
    Projectile(ProjectileSnapshot),
}

impl GhostState {
    /// Wire type id.
    #[must_use]
    pub const fn ghost_type(&self) -> GhostType {
        match self {
            Self::Avatar(_) => GhostType::Avatar,
            Self::Projectile(_) => GhostType::Projectile,
        }
    }

    /// Tick the snapshot describes.
    #[must_use]
    pub fn tick(&self) -> Tick {
        match self {
            Self::Avatar(s) => s.tick(),
            Self::Projectile(s) => s.tick(),
        }
    }

    /// Mask this snapshot was encoded with.
    #[must_use]
    pub fn change_mask(&self) -> ChangeMask {
        match self {
            Self::Avatar(s) => s.change_mask(),
            Self::Projectile(s) => s.change_mask(),
        }
    }

    /// The same state relabelled as belonging to `tick`.
    #[must_use]
    pub fn at_tick(&self, tick: Tick) -> Self {
        match self {
            Self::Avatar(s) => Self::Avatar(AvatarSnapshot { tick, ..*s }),
            Self::Projectile(s) => Self::Projectile(ProjectileSnapshot { tick, ..*s }),
        }
    }

    /// All-zero baseline for a ghost type.
    #[must_use]
    pub fn zero(ghost_type: GhostType, tick: Tick) -> Self {
        match ghost_type {
            GhostType::Avatar => Self::Avatar(AvatarSnapshot::zero(tick)),
            GhostType::Projectile => Self::Projectile(ProjectileSnapshot::zero(tick)),
        }
    }

    /// Encodes against `baseline`, or against the zero baseline when `None`.
    ///
    /// Returns the snapshot as sent.
    pub fn encode(
        &self,
        ghost: GhostId,
        baseline: Option<&Self>,
        model: &CompressionModel,
        writer: &mut BitWriter,
    ) -> NetResult<Self> {
        let zero;
        let baseline = match baseline {
            Some(baseline) => baseline,
            None => {
                zero = Self::zero(self.ghost_type(), Tick::ZERO);
                &zero
            }
        };
        match (self, baseline) {
            (Self::Avatar(s), Self::Avatar(b)) => s.encode(b, model, writer).map(Self::Avatar),
            (Self::Projectile(s), Self::Projectile(b)) => {
                s.encode(b, model, writer).map(Self::Projectile)
            }
            _ => Err(NetError::GhostTypeMismatch { ghost: ghost.0 }),
        }
    }

    /// Decodes a `ghost_type` snapshot against `baseline` (zero when `None`).
    pub fn decode(
        ghost: GhostId,
        ghost_type: GhostType,
        tick: Tick,
        baseline: Option<&Self>,
        model: &CompressionModel,
        reader: &mut BitReader<'_>,
    ) -> NetResult<Self> {
        let zero;
        let baseline = match baseline {
            Some(baseline) => baseline,
            None => {
                zero = Self::zero(ghost_type, Tick::ZERO);
                &zero
            }
        };
        match (ghost_type, baseline) {
            (GhostType::Avatar, Self::Avatar(b)) => {
                AvatarSnapshot::decode(tick, b, model, reader).map(Self::Avatar)
            }
            (GhostType::Projectile, Self::Projectile(b)) => {
                ProjectileSnapshot::decode(tick, b, model, reader).map(Self::Projectile)
            }
            _ => Err(NetError::GhostTypeMismatch { ghost: ghost.0 }),
        }
    }

    /// Predicts the state at `target`; see [`GhostSnapshot::predict`].
    ///
    /// Baselines of a different type than `current` are ignored.
    #[must_use]
    pub fn predict(&self, target: Tick, first: Option<&Self>, second: Option<&Self>) -> Self {
        match self {
            Self::Avatar(current) => Self::Avatar(AvatarSnapshot::predict(
                current,
                target,
                first.and_then(Self::as_avatar),
                second.and_then(Self::as_avatar),
            )),
            Self::Projectile(current) => Self::Projectile(ProjectileSnapshot::predict(
                current,
                target,
                first.and_then(Self::as_projectile),
                second.and_then(Self::as_projectile),
            )),
        }
    }

    /// Blends towards `target`. `None` if the types differ.
    #[must_use]
    pub fn interpolate(&self, target: &Self, factor: f32) -> Option<Self> {
        match (self, target) {
            (Self::Avatar(a), Self::Avatar(b)) => Some(Self::Avatar(a.interpolate(b, factor))),
            (Self::Projectile(a), Self::Projectile(b)) => {
                Some(Self::Projectile(a.interpolate(b, factor)))
            }
            _ => None,
        }
    }

    /// Avatar payload, if this is an avatar.
    #[must_use]
    pub const fn as_avatar(&self) -> Option<&AvatarSnapshot> {
        match self {
            Self::Avatar(s) => Some(s),
            Self::Projectile(_) => None,
        }
    }

    /// Projectile payload, if this is a projectile.
    #[must_use]
    pub const fn as_projectile(&self) -> Option<&ProjectileSnapshot> {
        match self {
            Self::Projectile(s) => Some(s),
            Self::Avatar(_) => None,
        }
    }
}
