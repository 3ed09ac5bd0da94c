//! Contact geometry, body motion and force response types.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Geometry of one contact, in SU.
///
/// The normal points from body B toward body A, so a positive normal force
/// along it pushes A away from B.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactGeometry {
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
    /// Overlap depth (positive when penetrating).
    pub penetration: f64,
    /// Contact point relative to A's center.
    pub arm_a: Vector3<f64>,
    /// Contact point relative to B's reference point.
    pub arm_b: Vector3<f64>,
}

impl ContactGeometry {
    /// Contact between two equal spheres with integer centers.
    ///
    /// The test is exact: contact iff `|a - b|^2 < (2 r)^2` in 128-bit
    /// integer arithmetic. Coincident centers have no defined normal and
    /// yield `None`.
    ///
    /// ```
    /// use gran_contact::ContactGeometry;
    ///
    /// assert!(ContactGeometry::sphere_sphere([0, 0, 0], [200, 0, 0], 100).is_none());
    /// let c = ContactGeometry::sphere_sphere([0, 0, 0], [0, 150, 0], 100).unwrap();
    /// assert!((c.penetration - 50.0).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn sphere_sphere(a: [i64; 3], b: [i64; 3], radius: i64) -> Option<Self> {
        let dist_sq = squared_distance(a, b);
        let reach = 2 * i128::from(radius);
        if dist_sq >= reach * reach || dist_sq == 0 {
            return None;
        }

        let dist = (dist_sq as f64).sqrt();
        let delta = Vector3::new(
            (a[0] - b[0]) as f64,
            (a[1] - b[1]) as f64,
            (a[2] - b[2]) as f64,
        );
        let normal = delta / dist;
        let r = radius as f64;
        Some(Self {
            normal,
            penetration: 2.0 * r - dist,
            arm_a: -normal * r,
            arm_b: normal * r,
        })
    }

    /// Contact of a sphere against a surface described by its closest point.
    ///
    /// `normal` points from the surface toward the sphere center and
    /// `penetration` is how far the sphere overlaps the surface. `arm_b` is
    /// the contact point relative to the surface body's reference point.
    #[must_use]
    pub fn sphere_surface(
        normal: Vector3<f64>,
        penetration: f64,
        radius: f64,
        arm_b: Vector3<f64>,
    ) -> Self {
        Self {
            normal,
            penetration,
            arm_a: -normal * radius,
            arm_b,
        }
    }
}

/// Squared distance of two integer points without overflow.
#[must_use]
pub fn squared_distance(a: [i64; 3], b: [i64; 3]) -> i128 {
    (0..3)
        .map(|axis| {
            let d = i128::from(a[axis]) - i128::from(b[axis]);
            d * d
        })
        .sum()
}

/// Velocity state of a contacting body, in SU per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyMotion {
    /// Linear velocity of the reference point.
    pub linear: Vector3<f64>,
    /// Angular velocity (rad per tick).
    pub angular: Vector3<f64>,
}

impl BodyMotion {
    /// Create a new motion.
    #[must_use]
    pub fn new(linear: Vector3<f64>, angular: Vector3<f64>) -> Self {
        Self { linear, angular }
    }

    /// Zero velocity.
    #[must_use]
    pub fn at_rest() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }

    /// Pure translation.
    #[must_use]
    pub fn translating(linear: Vector3<f64>) -> Self {
        Self::new(linear, Vector3::zeros())
    }

    /// Velocity of the material point at `arm` from the reference point.
    #[must_use]
    pub fn point_velocity(&self, arm: &Vector3<f64>) -> Vector3<f64> {
        self.linear + self.angular.cross(arm)
    }
}

/// Force and torques produced by one contact, in SU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResponse {
    /// Force on A (B receives the negation).
    pub force: Vector3<f64>,
    /// Torque on A about its center.
    pub torque_a: Vector3<f64>,
    /// Torque on B about its reference point.
    pub torque_b: Vector3<f64>,
    /// Repulsive normal force magnitude before cohesion.
    pub normal_force: f64,
}

impl ContactResponse {
    /// No force.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque_a: Vector3::zeros(),
            torque_b: Vector3::zeros(),
            normal_force: 0.0,
        }
    }
}
