//! Contact parameters scaled into simulation units.

use gran_types::{MaterialPair, RollingMode, UnitSystem};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Material parameters of one interaction kind, in SU.
///
/// Produced once at initialization from a user-unit [`MaterialPair`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactParams {
    /// Normal spring stiffness.
    pub normal_stiffness: f64,
    /// Normal damping rate (per tick).
    pub normal_damping: f64,
    /// Tangential spring stiffness.
    pub tangential_stiffness: f64,
    /// Tangential damping rate (per tick).
    pub tangential_damping: f64,
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Rolling resistance, per tick for viscous rolling, dimensionless for Coulomb.
    pub rolling_resistance: f64,
    /// Constant attractive force along the normal while in contact.
    pub cohesion_force: f64,
}

impl ContactParams {
    /// Scales a user-unit material pair.
    ///
    /// Cohesion is `ratio * |g|` times one sphere mass, which is 1 in SU.
    #[must_use]
    pub fn from_material(
        pair: &MaterialPair,
        units: &UnitSystem,
        rolling: RollingMode,
        gravity_magnitude: f64,
    ) -> Self {
        let rolling_resistance = match rolling {
            RollingMode::None => 0.0,
            RollingMode::Viscous => units.damping_to_su(pair.rolling_resistance),
            RollingMode::Coulomb => pair.rolling_resistance,
        };
        Self {
            normal_stiffness: units.stiffness_to_su(pair.normal_stiffness),
            normal_damping: units.damping_to_su(pair.normal_damping),
            tangential_stiffness: units.stiffness_to_su(pair.tangential_stiffness),
            tangential_damping: units.damping_to_su(pair.tangential_damping),
            friction: pair.static_friction,
            rolling_resistance,
            cohesion_force: pair.cohesion_ratio * gravity_magnitude / units.acceleration(),
        }
    }
}
