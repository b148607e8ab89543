//! 3D Vector
//!
//! Small float vector used by movement, hitscan and grenade physics.
//! The arena floor is the XZ plane; Y points up.

use std::fmt;
use std::ops::{Add, Sub, Neg, Mul};
use serde::{Serialize, Deserialize};

/// 3D vector with `f32` components.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component (east/west)
    pub x: f32,
    /// Y component (height)
    pub y: f32,
    /// Z component (north/south)
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Unit facing direction on the floor plane for a yaw angle.
    ///
    /// Yaw 0 faces +Z, yaw pi/2 faces +X.
    #[inline]
    pub fn from_yaw(yaw: f32) -> Self {
        Self::new(yaw.sin(), 0.0, yaw.cos())
    }

    /// Unit look direction for a yaw/pitch pair.
    ///
    /// Positive pitch looks down.
    #[inline]
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Self {
        let cos_p = pitch.cos();
        Self::new(yaw.sin() * cos_p, -pitch.sin(), yaw.cos() * cos_p).normalize()
    }

    /// Scale by a scalar.
    #[inline]
    pub fn scale(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }

    /// Dot product with another vector.
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Squared length.
    #[inline]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Distance to another point ignoring height.
    #[inline]
    pub fn distance_xz(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Copy with the height component zeroed.
    #[inline]
    pub fn flatten(self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    /// Normalize to unit length.
    /// Returns ZERO if length is zero.
    #[inline]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        self.scale(1.0 / len)
    }

    /// True when every component is finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f32) -> Self {
        self.scale(scalar)
    }
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec3({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_yaw_zero_faces_positive_z() {
        let dir = Vec3::from_yaw(0.0);
        assert!(approx(dir.x, 0.0));
        assert!(approx(dir.z, 1.0));
    }

    #[test]
    fn test_positive_pitch_looks_down() {
        let dir = Vec3::from_yaw_pitch(0.0, 0.5);
        assert!(dir.y < 0.0);
        assert!(approx(dir.length(), 1.0));
    }

    #[test]
    fn test_distance_xz_ignores_height() {
        let a = Vec3::new(0.0, 10.0, 0.0);
        let b = Vec3::new(3.0, -4.0, 4.0);
        assert!(approx(a.distance_xz(b), 5.0));
    }

    #[test]
    fn test_normalize_zero() {
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }
}
