//! Contact material parameters per interaction pair, in user units.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Spring-damper and friction parameters for one kind of contact.
///
/// Damping coefficients are mass-normalized rates (1/time): the force
/// applied is `gamma * m_eff * v`. Cohesion is expressed as a multiple of
/// the sphere's weight.
///
/// # Example
///
/// ```
/// use gran_types::MaterialPair;
///
/// let pair = MaterialPair::new(1e7)
///     .damping(1e4)
///     .tangential(2e6, 1e4)
///     .friction(0.5);
/// assert!(pair.validate("sphere-sphere").is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialPair {
    /// Normal spring stiffness.
    pub normal_stiffness: f64,
    /// Normal damping rate.
    pub normal_damping: f64,
    /// Tangential spring stiffness.
    pub tangential_stiffness: f64,
    /// Tangential damping rate.
    pub tangential_damping: f64,
    /// Coulomb friction coefficient.
    pub static_friction: f64,
    /// Rolling resistance: a rate for viscous rolling, a coefficient for Coulomb rolling.
    pub rolling_resistance: f64,
    /// Cohesive (sphere-sphere) or adhesive (sphere-boundary) pull, in sphere weights.
    pub cohesion_ratio: f64,
}

impl Default for MaterialPair {
    fn default() -> Self {
        Self {
            normal_stiffness: 1e7,
            normal_damping: 1e4,
            tangential_stiffness: 2e6,
            tangential_damping: 1e4,
            static_friction: 0.5,
            rolling_resistance: 0.0,
            cohesion_ratio: 0.0,
        }
    }
}

impl MaterialPair {
    /// Undamped, frictionless pair with the given normal stiffness.
    #[must_use]
    pub fn new(normal_stiffness: f64) -> Self {
        Self {
            normal_stiffness,
            normal_damping: 0.0,
            tangential_stiffness: 0.0,
            tangential_damping: 0.0,
            static_friction: 0.0,
            rolling_resistance: 0.0,
            cohesion_ratio: 0.0,
        }
    }

    /// Set the normal damping rate.
    #[must_use]
    pub fn damping(mut self, normal_damping: f64) -> Self {
        self.normal_damping = normal_damping;
        self
    }

    /// Set tangential stiffness and damping.
    #[must_use]
    pub fn tangential(mut self, stiffness: f64, damping: f64) -> Self {
        self.tangential_stiffness = stiffness;
        self.tangential_damping = damping;
        self
    }

    /// Set the Coulomb friction coefficient.
    #[must_use]
    pub fn friction(mut self, mu: f64) -> Self {
        self.static_friction = mu;
        self
    }

    /// Set the rolling resistance coefficient.
    #[must_use]
    pub fn rolling(mut self, coefficient: f64) -> Self {
        self.rolling_resistance = coefficient;
        self
    }

    /// Set the cohesion/adhesion ratio.
    #[must_use]
    pub fn cohesion(mut self, ratio: f64) -> Self {
        self.cohesion_ratio = ratio;
        self
    }

    /// Validate the pair; `name` labels the pair in error messages.
    pub fn validate(&self, name: &str) -> crate::Result<()> {
        if !(self.normal_stiffness.is_finite() && self.normal_stiffness > 0.0) {
            return Err(SimError::degenerate_scaling(format!(
                "{name} normal stiffness must be positive, got {}",
                self.normal_stiffness
            )));
        }
        let non_negative = [
            ("normal damping", self.normal_damping),
            ("tangential stiffness", self.tangential_stiffness),
            ("tangential damping", self.tangential_damping),
            ("friction coefficient", self.static_friction),
            ("rolling resistance", self.rolling_resistance),
            ("cohesion ratio", self.cohesion_ratio),
        ];
        for (label, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SimError::invalid_config(format!(
                    "{name} {label} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Materials for the three interaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaterialTable {
    /// Sphere against sphere.
    pub sphere_sphere: MaterialPair,
    /// Sphere against box walls and boundary conditions.
    pub sphere_wall: MaterialPair,
    /// Sphere against mesh triangles.
    pub sphere_mesh: MaterialPair,
}

impl MaterialTable {
    /// Same parameters for every interaction kind.
    #[must_use]
    pub fn uniform(pair: MaterialPair) -> Self {
        Self {
            sphere_sphere: pair,
            sphere_wall: pair,
            sphere_mesh: pair,
        }
    }

    /// Largest normal stiffness, which sets the unit system's time scale.
    #[must_use]
    pub fn max_normal_stiffness(&self) -> f64 {
        self.sphere_sphere
            .normal_stiffness
            .max(self.sphere_wall.normal_stiffness)
            .max(self.sphere_mesh.normal_stiffness)
    }

    /// Validate all three pairs.
    pub fn validate(&self) -> crate::Result<()> {
        self.sphere_sphere.validate("sphere-sphere")?;
        self.sphere_wall.validate("sphere-wall")?;
        self.sphere_mesh.validate("sphere-mesh")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let pair = MaterialPair::new(5e6).damping(100.0).friction(0.3).cohesion(2.0);
        assert_eq!(pair.normal_stiffness, 5e6);
        assert_eq!(pair.normal_damping, 100.0);
        assert_eq!(pair.static_friction, 0.3);
        assert_eq!(pair.cohesion_ratio, 2.0);
        assert_eq!(pair.tangential_stiffness, 0.0);
    }

    #[test]
    fn test_validation() {
        assert!(MaterialPair::default().validate("x").is_ok());

        let err = MaterialPair::new(0.0).validate("sphere-wall").unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("sphere-wall"));

        assert!(MaterialPair::new(1.0).friction(-0.1).validate("x").is_err());
        assert!(MaterialPair::new(1.0).damping(f64::NAN).validate("x").is_err());
    }

    #[test]
    fn test_max_stiffness() {
        let mut table = MaterialTable::uniform(MaterialPair::new(1e5));
        table.sphere_mesh.normal_stiffness = 3e7;
        assert_eq!(table.max_normal_stiffness(), 3e7);
        assert!(table.validate().is_ok());
    }
}
