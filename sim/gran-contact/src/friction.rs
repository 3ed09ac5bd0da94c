//! Coulomb friction cone and tangential displacement clamp.
//!
//! ```text
//! |F_t| <= mu * F_n
//! ```
//!
//! In multi-step mode the tangential force is `-k s` for an accumulated
//! displacement `s`. When the trial force leaves the cone, the
//! displacement itself is rescaled so that `k |s| = mu F_n`. The stored
//! history therefore never exceeds what the cone allows, and clamping an
//! already clamped displacement is a no-op.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative slack accepted by [`FrictionCone::clamp_displacement`] before rescaling.
const CLAMP_TOLERANCE: f64 = 1e-12;

/// Friction cone for one material pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionCone {
    /// Coulomb friction coefficient.
    pub mu: f64,
}

impl FrictionCone {
    /// Create a new friction cone with the given coefficient.
    #[must_use]
    pub fn new(mu: f64) -> Self {
        Self { mu: mu.max(0.0) }
    }

    /// Create a frictionless cone (μ = 0).
    #[must_use]
    pub fn frictionless() -> Self {
        Self { mu: 0.0 }
    }

    /// Largest tangential force magnitude for a given normal force.
    #[must_use]
    pub fn max_friction(&self, normal_magnitude: f64) -> f64 {
        self.mu * normal_magnitude.max(0.0)
    }

    /// Check if a tangential force is within the friction cone.
    #[must_use]
    pub fn contains(&self, tangent_force: &Vector3<f64>, normal_magnitude: f64) -> bool {
        tangent_force.norm() <= self.max_friction(normal_magnitude) * (1.0 + CLAMP_TOLERANCE)
    }

    /// Scale a tangential force onto the cone, preserving direction.
    #[must_use]
    pub fn project(&self, tangent_force: Vector3<f64>, normal_magnitude: f64) -> Vector3<f64> {
        let limit = self.max_friction(normal_magnitude);
        let magnitude = tangent_force.norm();
        if magnitude <= limit {
            tangent_force
        } else if limit <= 0.0 {
            Vector3::zeros()
        } else {
            tangent_force * (limit / magnitude)
        }
    }

    /// Rescale a tangential displacement so `stiffness * |s| <= mu * F_n`.
    ///
    /// Direction is preserved. Idempotent: the output of one call passes
    /// through a second call unchanged.
    ///
    /// ```
    /// use gran_contact::FrictionCone;
    /// use nalgebra::Vector3;
    ///
    /// let cone = FrictionCone::new(0.5);
    /// let s = Vector3::new(3.0, 4.0, 0.0);
    /// let once = cone.clamp_displacement(s, 2.0, 4.0); // |s| <= 0.5 * 4 / 2 = 1
    /// assert!((once.norm() - 1.0).abs() < 1e-12);
    /// assert_eq!(cone.clamp_displacement(once, 2.0, 4.0), once);
    /// ```
    #[must_use]
    pub fn clamp_displacement(
        &self,
        displacement: Vector3<f64>,
        stiffness: f64,
        normal_magnitude: f64,
    ) -> Vector3<f64> {
        if stiffness <= 0.0 {
            return displacement;
        }
        let limit = self.max_friction(normal_magnitude) / stiffness;
        let magnitude = displacement.norm();
        if magnitude <= limit * (1.0 + CLAMP_TOLERANCE) {
            displacement
        } else if limit <= 0.0 {
            Vector3::zeros()
        } else {
            displacement * (limit / magnitude)
        }
    }
}

/// Rotates a stored displacement into the plane normal to `normal`.
///
/// The in-plane component is kept and rescaled to the original length, so
/// a contact frame that turns between steps does not bleed off history.
#[must_use]
pub fn rotate_into_plane(displacement: Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    let magnitude = displacement.norm();
    if magnitude == 0.0 {
        return displacement;
    }
    let in_plane = displacement - normal * displacement.dot(normal);
    let in_plane_magnitude = in_plane.norm();
    if in_plane_magnitude <= magnitude * 1e-12 {
        Vector3::zeros()
    } else {
        in_plane * (magnitude / in_plane_magnitude)
    }
}
