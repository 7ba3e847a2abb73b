//! Projectile snapshot: position (bit 0) and velocity (bit 1), both at 0.01.

use wraith_shared::Vec3;

use super::{read_group, read_mask, write_groups, ChangeMask, GhostSnapshot, GhostType};
use crate::error::NetResult;
use crate::prediction::predict_fields;
use crate::protocol::{BitReader, BitWriter, CompressionModel};
use crate::quantize::{dequantize_vec3, quantize_vec3, POSITION_SCALE, VELOCITY_SCALE};
use crate::tick::Tick;

const POSITION_BIT: u32 = 0;
const VELOCITY_BIT: u32 = 1;

/// Quantized projectile state for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProjectileSnapshot {
    /// Tick this state belongs to.
    pub tick: Tick,
    /// Quantized position.
    pub position: [i32; 3],
    /// Quantized velocity (units per second).
    pub velocity: [i32; 3],
    /// Mask the snapshot was encoded with.
    pub mask: ChangeMask,
}

impl ProjectileSnapshot {
    /// Quantizes a physical projectile state.
    #[must_use]
    pub fn new(tick: Tick, position: Vec3, velocity: Vec3) -> Self {
        Self {
            tick,
            position: quantize_vec3(position, POSITION_SCALE),
            velocity: quantize_vec3(velocity, VELOCITY_SCALE),
            mask: ChangeMask::EMPTY,
        }
    }

    /// Dequantized position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        dequantize_vec3(self.position, POSITION_SCALE)
    }

    /// Dequantized velocity.
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        dequantize_vec3(self.velocity, VELOCITY_SCALE)
    }
}

impl GhostSnapshot for ProjectileSnapshot {
    const GHOST_TYPE: GhostType = GhostType::Projectile;

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
            .with(POSITION_BIT, self.position != baseline.position)
            .with(VELOCITY_BIT, self.velocity != baseline.velocity)
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
                (&self.position[..], &baseline.position[..]),
                (&self.velocity[..], &baseline.velocity[..]),
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
        let mut position = baseline.position;
        let mut velocity = baseline.velocity;
        read_group(model, reader, mask, POSITION_BIT, &mut position)?;
        read_group(model, reader, mask, VELOCITY_BIT, &mut velocity)?;
        Ok(Self {
            tick,
            position,
            velocity,
            mask,
        })
    }

    fn predict(current: &Self, target: Tick, first: Option<&Self>, second: Option<&Self>) -> Self {
        Self {
            tick: target,
            position: predict_fields(
                target,
                current.position,
                first.map(|s| (s.tick, s.position)),
                second.map(|s| (s.tick, s.position)),
            ),
            velocity: predict_fields(
                target,
                current.velocity,
                first.map(|s| (s.tick, s.velocity)),
                second.map(|s| (s.tick, s.velocity)),
            ),
            mask: ChangeMask::EMPTY,
        }
    }

    fn interpolate(&self, target: &Self, factor: f32) -> Self {
        let t = factor.clamp(0.0, 1.0);
        Self {
            position: quantize_vec3(self.position().lerp(target.position(), t), POSITION_SCALE),
            velocity: quantize_vec3(self.velocity().lerp(target.velocity(), t), VELOCITY_SCALE),
            ..*target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_only_change() {
        let model = CompressionModel::default();
        let baseline = ProjectileSnapshot {
            mask: ChangeMask(0b11),
            ..ProjectileSnapshot::new(Tick(3), Vec3::new(5.0, 1.0, 0.0), Vec3::new(10.0, 0.0, 0.0))
        };
        let current =
            ProjectileSnapshot::new(Tick(4), Vec3::new(5.0, 1.0, 0.0), Vec3::new(9.5, -0.5, 0.0));

        let mut writer = BitWriter::new(128);
        let sent = current.encode(&baseline, &model, &mut writer).unwrap();
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let decoded = ProjectileSnapshot::decode(Tick(4), &baseline, &model, &mut reader).unwrap();

        assert_eq!(sent.mask, ChangeMask(0b10));
        assert_eq!(decoded, sent);
        assert_eq!(decoded.position, baseline.position);
        assert_eq!(decoded.velocity, [950, -50, 0]);
    }

    #[test]
    fn test_linear_flight_predicts_exactly() {
        let at = |tick: u32| {
            let x = f32::from(u16::try_from(tick).unwrap()) * 0.5;
            ProjectileSnapshot::new(Tick(tick), Vec3::new(x, 0.0, 0.0), Vec3::new(30.0, 0.0, 0.0))
        };
        let predicted = ProjectileSnapshot::predict(&at(8), Tick(9), Some(&at(8)), Some(&at(6)));
        assert_eq!(predicted.position, at(9).position);
        assert_eq!(predicted.velocity, at(9).velocity);
    }
}
