//! Mathematical types shared between client and server.
//!
//! These are the canonical physical-domain representations. The wire only
//! ever carries their quantized integer forms.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, velocity, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Per-component linear interpolation.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `radians` about the Y (up) axis.
    #[must_use]
    pub fn from_yaw(radians: f32) -> Self {
        let half = radians * 0.5;
        Self::new(0.0, half.sin(), 0.0, half.cos())
    }

    /// Yaw angle in radians, assuming a rotation about Y only.
    #[must_use]
    pub fn yaw(self) -> f32 {
        2.0 * self.y.atan2(self.w)
    }

    /// Dot product (4D).
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Returns the unit-length quaternion, or identity for a degenerate input.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Shortest-arc spherical interpolation.
    ///
    /// `t` is clamped to `[0, 1]`. Falls back to normalized lerp when the
    /// two rotations are nearly parallel.
    #[must_use]
    pub fn slerp(self, other: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut end = other;
        let mut cos_theta = self.dot(other);
        if cos_theta < 0.0 {
            end = -end;
            cos_theta = -cos_theta;
        }

        if cos_theta > 0.9995 {
            return Self::new(
                self.x + (end.x - self.x) * t,
                self.y + (end.y - self.y) * t,
                self.z + (end.z - self.z) * t,
                self.w + (end.w - self.w) * t,
            )
            .normalize();
        }

        let theta = cos_theta.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;
        Self::new(
            self.x * a + end.x * b,
            self.y * a + end.y * b,
            self.z * a + end.z * b,
            self.w * a + end.w * b,
        )
    }

    /// Rotates a vector by this (unit) quaternion.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let uv = cross(u, v);
        let uuv = cross(u, uv);
        v + (uv * self.w + uuv) * 2.0
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Neg for Quaternion {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, -self.w)
    }
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(a.dot(b), 32.0);

        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(2.5, 3.5, 4.5));
    }

    #[test]
    fn test_vec3_bytemuck() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn test_yaw_roundtrip() {
        let q = Quaternion::from_yaw(1.25);
        assert!((q.yaw() - 1.25).abs() < 1e-5);
        assert!((q.dot(q) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_slerp_endpoints_and_midpoint() {
        let a = Quaternion::from_yaw(0.0);
        let b = Quaternion::from_yaw(1.0);

        assert!((a.slerp(b, 0.0).yaw() - 0.0).abs() < 1e-5);
        assert!((a.slerp(b, 1.0).yaw() - 1.0).abs() < 1e-5);
        assert!((a.slerp(b, 0.5).yaw() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_slerp_takes_shortest_arc() {
        // -170 and +170 degrees are 20 degrees apart through 180.
        let a = Quaternion::from_yaw(-170f32.to_radians());
        let b = Quaternion::from_yaw(170f32.to_radians());
        let mid = a.slerp(b, 0.5);
        assert!((mid.yaw().abs() - std::f32::consts::PI).abs() < 1e-3);
    }

    #[test]
    fn test_rotate_about_y() {
        let q = Quaternion::from_yaw(std::f32::consts::FRAC_PI_2);
        let v = q.rotate(Vec3::Z);
        assert!((v.x - 1.0).abs() < 1e-5);
        assert!(v.z.abs() < 1e-5);
    }
}
