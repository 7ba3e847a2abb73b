//! # Quantization
//!
//! Fixed-point mapping between physical values and the integers carried on
//! the wire. Scales are part of the wire contract.
//!
//! | Field                 | Scale | Resolution |
//! |-----------------------|-------|------------|
//! | Position (per axis)   | 100   | 0.01 units |
//! | Velocity (per axis)   | 100   | 0.01 u/s   |
//! | Rotation (quat `y`)   | 1000  | 0.001      |
//!
//! ## Single-axis rotation
//!
//! Rotations are stored as the `y` component of a unit quaternion about the
//! up axis. The other components are rebuilt by assuming `x = z = 0` and a
//! non-negative `w`. Any pitch or roll is discarded: ghosts using
//! [`quantize_yaw_rotation`] can only represent yaw. That loss is the
//! bandwidth trade, not a defect.

use wraith_shared::{Quaternion, Vec3};

/// Integer steps per position unit.
pub const POSITION_SCALE: f32 = 100.0;

/// Integer steps per velocity unit.
pub const VELOCITY_SCALE: f32 = 100.0;

/// Integer steps per unit of quaternion component.
pub const ROTATION_SCALE: f32 = 1000.0;

/// Quantizes one scalar, rounding to nearest and saturating to `i32`.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize(value: f32, scale: f32) -> i32 {
    // `as` saturates for out-of-range floats and maps NaN to 0.
    (value * scale).round() as i32
}

/// Inverse of [`quantize`].
#[inline]
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn dequantize(value: i32, scale: f32) -> f32 {
    value as f32 / scale
}

/// Quantizes a vector per component.
#[inline]
#[must_use]
pub fn quantize_vec3(value: Vec3, scale: f32) -> [i32; 3] {
    [
        quantize(value.x, scale),
        quantize(value.y, scale),
        quantize(value.z, scale),
    ]
}

/// Inverse of [`quantize_vec3`].
#[inline]
#[must_use]
pub fn dequantize_vec3(value: [i32; 3], scale: f32) -> Vec3 {
    Vec3::new(
        dequantize(value[0], scale),
        dequantize(value[1], scale),
        dequantize(value[2], scale),
    )
}

/// Stores the `y` component of a yaw-only rotation.
///
/// The quaternion is first flipped into the `w >= 0` hemisphere so the
/// reconstruction in [`dequantize_yaw_rotation`] returns the same rotation.
#[inline]
#[must_use]
pub fn quantize_yaw_rotation(rotation: Quaternion) -> i32 {
    let q = rotation.normalize();
    let y = if q.w < 0.0 { -q.y } else { q.y };
    quantize(y, ROTATION_SCALE).clamp(-ROTATION_UNIT, ROTATION_UNIT)
}

/// Rebuilds a unit yaw rotation from its stored `y` component.
#[inline]
#[must_use]
pub fn dequantize_yaw_rotation(value: i32) -> Quaternion {
    let y = dequantize(value.clamp(-ROTATION_UNIT, ROTATION_UNIT), ROTATION_SCALE);
    let w = (1.0 - y * y).max(0.0).sqrt();
    Quaternion::new(0.0, y, 0.0, w)
}

/// Quantized value of a unit quaternion component.
#[allow(clippy::cast_possible_truncation)]
const ROTATION_UNIT: i32 = ROTATION_SCALE as i32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_resolution() {
        assert_eq!(quantize(1.234, POSITION_SCALE), 123);
        assert_eq!(quantize(-1.236, POSITION_SCALE), -124);
        assert!((dequantize(123, POSITION_SCALE) - 1.23).abs() < 1e-6);
    }

    #[test]
    fn test_quantize_saturates() {
        assert_eq!(quantize(f32::MAX, POSITION_SCALE), i32::MAX);
        assert_eq!(quantize(f32::MIN, POSITION_SCALE), i32::MIN);
        assert_eq!(quantize(f32::NAN, POSITION_SCALE), 0);
    }

    #[test]
    fn test_vec3_within_one_unit() {
        let v = Vec3::new(12.345, -0.004, 987.654);
        let back = dequantize_vec3(quantize_vec3(v, POSITION_SCALE), POSITION_SCALE);
        assert!((back.x - v.x).abs() <= 0.01);
        assert!((back.y - v.y).abs() <= 0.01);
        assert!((back.z - v.z).abs() <= 0.01);
    }

    #[test]
    fn test_yaw_rotation_roundtrip() {
        for degrees in [-179.0f32, -90.0, -1.0, 0.0, 33.0, 90.0, 179.0] {
            let q = Quaternion::from_yaw(degrees.to_radians());
            let back = dequantize_yaw_rotation(quantize_yaw_rotation(q));
            // Same rotation up to sign.
            assert!(q.dot(back).abs() > 0.999_99, "yaw {degrees}");
            assert!(back.w >= 0.0);
        }
    }

    #[test]
    fn test_negative_hemisphere_is_folded() {
        let q = Quaternion::from_yaw(0.7);
        assert_eq!(quantize_yaw_rotation(q), quantize_yaw_rotation(-q));
    }

    #[test]
    fn test_pitch_is_discarded() {
        // Rotation about X only: y component is zero, so it decodes to identity.
        let half = 0.4f32;
        let pitch = Quaternion::new(half.sin(), 0.0, 0.0, half.cos());
        let back = dequantize_yaw_rotation(quantize_yaw_rotation(pitch));
        assert_eq!(back, Quaternion::IDENTITY);
    }
}
