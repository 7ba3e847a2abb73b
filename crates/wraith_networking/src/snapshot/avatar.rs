//! Player avatar snapshot.
//!
//! | Bit | Group    | Fields              | Scale  |
//! |-----|----------|---------------------|--------|
//! | 0   | rotation | quaternion `y`      | 0.001  |
//! | 1   | position | `x`, `y`, `z`       | 0.01   |
//!
//! Rotation is yaw only. See [`crate::quantize`] for why pitch and roll are
//! not representable.

use wraith_shared::{Quaternion, Vec3};

use super::{read_group, read_mask, write_groups, ChangeMask, GhostSnapshot, GhostType};
use crate::error::NetResult;
use crate::prediction::predict_fields;
use crate::protocol::{BitReader, BitWriter, CompressionModel};
use crate::quantize::{
    dequantize_vec3, dequantize_yaw_rotation, quantize_vec3, quantize_yaw_rotation, POSITION_SCALE,
};
use crate::tick::Tick;

const ROTATION_BIT: u32 = 0;
const POSITION_BIT: u32 = 1;

/// Quantized avatar state for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AvatarSnapshot {
    /// Tick this state belongs to.
    pub tick: Tick,
    /// Quantized quaternion `y` component.
    pub rotation: i32,
    /// Quantized position.
    pub position: [i32; 3],
    /// Mask the snapshot was encoded with.
    pub mask: ChangeMask,
}

impl AvatarSnapshot {
    /// Quantizes a physical avatar state.
    #[must_use]
    pub fn new(tick: Tick, position: Vec3, rotation: Quaternion) -> Self {
        Self {
            tick,
            rotation: quantize_yaw_rotation(rotation),
            position: quantize_vec3(position, POSITION_SCALE),
            mask: ChangeMask::EMPTY,
        }
    }

    /// Dequantized position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        dequantize_vec3(self.position, POSITION_SCALE)
    }

    /// Reconstructed yaw rotation.
    #[must_use]
    pub fn rotation(&self) -> Quaternion {
        dequantize_yaw_rotation(self.rotation)
    }
}

impl GhostSnapshot for AvatarSnapshot {
    const GHOST_TYPE: GhostType = GhostType::Avatar;

    fn tick(&self) -> Tick {
        self.tick
    }

    fn change_mask(&self) -> ChangeMask {
        self.mask
    }

    fn zero(tick: Tick) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    fn diff_mask(&self, baseline: &Self) -> ChangeMask {
        ChangeMask::EMPTY
            .with(ROTATION_BIT, self.rotation != baseline.rotation)
            .with(POSITION_BIT, self.position != baseline.position)
    }

    fn encode(
        &self,
        baseline: &Self,
        model: &CompressionModel,
        writer: &mut BitWriter,
    ) -> NetResult<Self> {
        let mask = self.diff_mask(baseline);
        write_groups(
            model,
            writer,
            mask,
            baseline.mask,
            &[
                (&[self.rotation][..], &[baseline.rotation][..]),
                (&self.position[..], &baseline.position[..]),
            ],
        )?;
        Ok(Self { mask, ..*self })
    }

    fn decode(
        tick: Tick,
        baseline: &Self,
        model: &CompressionModel,
        reader: &mut BitReader<'_>,
    ) -> NetResult<Self> {
        let mask = read_mask(model, reader, baseline.mask)?;
        let mut rotation = [baseline.rotation];
        let mut position = baseline.position;
        read_group(model, reader, mask, ROTATION_BIT, &mut rotation)?;
        read_group(model, reader, mask, POSITION_BIT, &mut position)?;
        Ok(Self {
            tick,
            rotation: rotation[0],
            position,
            mask,
        })
    }

    fn predict(current: &Self, target: Tick, first: Option<&Self>, second: Option<&Self>) -> Self {
        let [rotation] = predict_fields(
            target,
            [current.rotation],
            first.map(|s| (s.tick, [s.rotation])),
            second.map(|s| (s.tick, [s.rotation])),
        );
        let position = predict_fields(
            target,
            current.position,
            first.map(|s| (s.tick, s.position)),
            second.map(|s| (s.tick, s.position)),
        );
        Self {
            tick: target,
            rotation,
            position,
            mask: ChangeMask::EMPTY,
        }
    }

    fn interpolate(&self, target: &Self, factor: f32) -> Self {
        let t = factor.clamp(0.0, 1.0);
        let rotation = self.rotation().slerp(target.rotation(), t);
        let position = self.position().lerp(target.position(), t);
        Self {
            rotation: quantize_yaw_rotation(rotation),
            position: quantize_vec3(position, POSITION_SCALE),
            ..*target
        }
    }
}
