//! Math utilities and types
//!
//! Stage positions are plain `nalgebra` vectors. Because `f32` is neither
//! `Eq` nor `Hash`, the allocator registry keys on [`Coordinate`], which
//! captures the exact bit pattern of each component.

use std::fmt;

pub use nalgebra::Vector3;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Exact, hashable form of a [`Vec3`] used as a registry key
///
/// Two coordinates are equal when their components compare equal as
/// floats, with the exception that `NaN` components match themselves.
/// Negative zero is folded into positive zero so that `(-0, 0, 0)` and
/// `(0, 0, 0)` occupy the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coordinate {
    bits: [u32; 3],
}

impl Coordinate {
    /// Build the key for a position
    pub fn from_vec3(position: &Vec3) -> Self {
        Self {
            bits: [
                canonical_bits(position.x),
                canonical_bits(position.y),
                canonical_bits(position.z),
            ],
        }
    }

    /// Recover the position this key was built from
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(
            f32::from_bits(self.bits[0]),
            f32::from_bits(self.bits[1]),
            f32::from_bits(self.bits[2]),
        )
    }
}

impl From<Vec3> for Coordinate {
    fn from(position: Vec3) -> Self {
        Self::from_vec3(&position)
    }
}

impl From<Coordinate> for Vec3 {
    fn from(coordinate: Coordinate) -> Self {
        coordinate.to_vec3()
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.to_vec3();
        write!(f, "({}, {}, {})", v.x, v.y, v.z)
    }
}

fn canonical_bits(value: f32) -> u32 {
    if value == 0.0 {
        0.0f32.to_bits()
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equal_positions_share_a_key() {
        let a = Coordinate::from(Vec3::new(10000.0, 10000.0, 11000.0));
        let b = Coordinate::from(Vec3::new(10000.0, 10000.0, 10000.0) + Vec3::new(0.0, 0.0, 1000.0));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_negative_zero_folds_to_zero() {
        let a = Coordinate::from(Vec3::new(-0.0, 0.0, -0.0));
        let b = Coordinate::from(Vec3::zeros());
        assert_eq!(a, b);
        assert!(a.to_vec3().x.is_sign_positive());
    }

    #[test]
    fn test_distinct_positions_differ() {
        let a = Coordinate::from(Vec3::new(1.0, 2.0, 3.0));
        let b = Coordinate::from(Vec3::new(1.0, 2.0, 3.5));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let c = Coordinate::from(Vec3::new(1.0, -2.5, 3.0));
        assert_eq!(c.to_string(), "(1, -2.5, 3)");
    }
}
