//! Planar coordinates and the distance function supplied by the world.

use serde::{Deserialize, Serialize};

/// A position on the world grid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Coordinates {
    /// Create a coordinate pair.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Heading towards `other` as an angle normalised to `[-1, 1]`
    /// (multiples of pi), matching the bike orientation convention.
    pub fn heading_to(self, other: Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x) / core::f64::consts::PI
    }

    /// Returns `true` if both components are finite.
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Coordinates::new(0.0, 0.0);
        let b = Coordinates::new(3.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < f64::EPSILON);
        assert!((b.distance_to(a) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn heading_is_normalised() {
        let origin = Coordinates::new(0.0, 0.0);
        assert!(origin.heading_to(Coordinates::new(1.0, 0.0)).abs() < f64::EPSILON);
        assert!((origin.heading_to(Coordinates::new(0.0, 1.0)) - 0.5).abs() < f64::EPSILON);
        assert!((origin.heading_to(Coordinates::new(-1.0, 0.0)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn nan_is_not_finite() {
        assert!(!Coordinates::new(f64::NAN, 0.0).is_finite());
        assert!(Coordinates::new(1.0, 2.0).is_finite());
    }
}
