//! User-unit to simulation-unit scaling.
//!
//! The scaling is computed once, at initialization, and passed by
//! reference to everything that converts values in or out.
//!
//! ```text
//!   M = 4/3 pi r^3 rho                 (one sphere)
//!   K = max normal stiffness
//!   T0 = sqrt(M / (psi_h K)) / psi_T   (stiffest contact resolved in ~psi_T ticks)
//!   T = dt / ceil(dt / T0)             (user step is a whole number of ticks)
//!   L = M |g| / (psi_L K)              (gravity-driven overlap spans ~psi_L SU)
//! ```

use nalgebra::{Point3, Vector3};
use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SimError;
use crate::fixed::{self, LINEAR_FRACTION_BITS};

/// Length divisor used when gravity is zero: `L = r / 2^20`.
pub const ZERO_GRAVITY_RADIUS_SU: f64 = 1_048_576.0;

/// Smallest sphere radius, in SU, that still resolves contact geometry.
pub const MIN_RADIUS_SU: f64 = 64.0;

/// Largest coordinate magnitude, in SU, the integer state may reach.
pub const MAX_COORDINATE_SU: f64 = 1_099_511_627_776.0; // 2^40

/// `K dt^2 / m` above which a warning is logged.
pub const STABILITY_WARNING_RATIO: f64 = 0.1;

const MAX_STEP_TICKS: f64 = 1_073_741_824.0; // 2^30

/// Tuning factors of the unit system.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PsiFactors {
    /// Ticks per characteristic contact time (`psi_T`).
    pub time: f64,
    /// Stiffness safety factor (`psi_h`).
    pub stiffness: f64,
    /// SU per characteristic gravitational overlap (`psi_L`).
    pub length: f64,
}

impl Default for PsiFactors {
    fn default() -> Self {
        Self {
            time: 16.0,
            stiffness: 4.0,
            length: 65536.0,
        }
    }
}

impl PsiFactors {
    /// Create custom factors.
    #[must_use]
    pub fn new(time: f64, stiffness: f64, length: f64) -> Self {
        Self {
            time,
            stiffness,
            length,
        }
    }

    /// All factors must be positive and finite.
    pub fn validate(&self) -> crate::Result<()> {
        for (label, value) in [
            ("psi_T", self.time),
            ("psi_h", self.stiffness),
            ("psi_L", self.length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::degenerate_scaling(format!(
                    "{label} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Physical inputs of the scaling computation, in user units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingInputs {
    /// Sphere radius.
    pub sphere_radius: f64,
    /// Sphere material density.
    pub sphere_density: f64,
    /// Full box extents.
    pub box_dims: Vector3<f64>,
    /// Largest normal contact stiffness.
    pub max_stiffness: f64,
    /// Gravity vector.
    pub gravity: Vector3<f64>,
    /// User time step.
    pub timestep: f64,
    /// Tuning factors.
    pub psi: PsiFactors,
}

/// Conversion factors between user units and simulation units.
///
/// Each factor is the size of one SU expressed in user units, so
/// `uu = su * factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnitSystem {
    mass: f64,
    length: f64,
    time: f64,
    step_ticks: i64,
}

impl UnitSystem {
    /// Derives the unit system from physical inputs.
    ///
    /// # Errors
    ///
    /// [`SimError::DegenerateScaling`] for non-positive or non-finite
    /// physical inputs, [`SimError::InvalidTimestep`] for a bad step, and
    /// [`SimError::InvalidConfig`] when the resulting SU grid is too coarse
    /// for the sphere or too large for the integer coordinate range.
    pub fn derive(inputs: &ScalingInputs) -> crate::Result<Self> {
        let positive = |label: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SimError::degenerate_scaling(format!(
                    "{label} must be positive, got {value}"
                )))
            }
        };
        positive("sphere radius", inputs.sphere_radius)?;
        positive("sphere density", inputs.sphere_density)?;
        positive("normal stiffness", inputs.max_stiffness)?;
        for (axis, extent) in inputs.box_dims.iter().enumerate() {
            positive(&format!("box extent along axis {axis}"), *extent)?;
        }
        if !(inputs.timestep.is_finite() && inputs.timestep > 0.0) {
            return Err(SimError::InvalidTimestep(inputs.timestep));
        }
        if !inputs.gravity.iter().all(|g| g.is_finite()) {
            return Err(SimError::degenerate_scaling("gravity must be finite"));
        }
        inputs.psi.validate()?;

        let psi = inputs.psi;
        let k = inputs.max_stiffness;
        let radius = inputs.sphere_radius;
        let mass = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3) * inputs.sphere_density;

        let base_tick = (mass / (psi.stiffness * k)).sqrt() / psi.time;
        let ticks = (inputs.timestep / base_tick).ceil().max(1.0);
        if ticks > MAX_STEP_TICKS {
            return Err(SimError::invalid_config(format!(
                "time step {} spans {ticks} contact ticks; reduce the step",
                inputs.timestep
            )));
        }
        let time = inputs.timestep / ticks;

        let g = inputs.gravity.norm();
        let length = if g > 0.0 {
            mass * g / (psi.length * k)
        } else {
            radius / ZERO_GRAVITY_RADIUS_SU
        };

        let radius_su = radius / length;
        if radius_su < MIN_RADIUS_SU {
            return Err(SimError::invalid_config(format!(
                "sphere radius resolves to {radius_su:.1} SU (minimum {MIN_RADIUS_SU}); raise psi_L"
            )));
        }
        let extent_su = inputs.box_dims.max() / length;
        if extent_su > MAX_COORDINATE_SU {
            return Err(SimError::invalid_config(format!(
                "box extent resolves to {extent_su:.3e} SU (maximum {MAX_COORDINATE_SU:.3e}); lower psi_L"
            )));
        }

        let stability = k * inputs.timestep * inputs.timestep / mass;
        if stability > STABILITY_WARNING_RATIO {
            warn!(
                ratio = stability,
                limit = STABILITY_WARNING_RATIO,
                "time step is large for the contact stiffness; expect an unstable run"
            );
        }

        Ok(Self {
            mass,
            length,
            time,
            step_ticks: ticks as i64,
        })
    }

    /// Mass of one SU in user units (one sphere).
    #[must_use]
    pub const fn mass(&self) -> f64 {
        self.mass
    }

    /// Length of one SU in user units.
    #[must_use]
    pub const fn length(&self) -> f64 {
        self.length
    }

    /// Duration of one tick in user units.
    #[must_use]
    pub const fn time(&self) -> f64 {
        self.time
    }

    /// Ticks per user time step (`h`).
    #[must_use]
    pub const fn step_ticks(&self) -> i64 {
        self.step_ticks
    }

    /// Velocity factor `L / T`.
    #[must_use]
    pub fn velocity(&self) -> f64 {
        self.length / self.time
    }

    /// Acceleration factor `L / T^2`.
    #[must_use]
    pub fn acceleration(&self) -> f64 {
        self.length / (self.time * self.time)
    }

    /// Force factor `M L / T^2`.
    #[must_use]
    pub fn force(&self) -> f64 {
        self.mass * self.acceleration()
    }

    /// Torque factor `M L^2 / T^2`.
    #[must_use]
    pub fn torque(&self) -> f64 {
        self.force() * self.length
    }

    /// Stiffness factor `M / T^2`.
    #[must_use]
    pub fn stiffness(&self) -> f64 {
        self.mass / (self.time * self.time)
    }

    /// Damping-rate factor `1 / T`.
    #[must_use]
    pub fn damping_rate(&self) -> f64 {
        1.0 / self.time
    }

    /// Length in SU (real-valued).
    #[must_use]
    pub fn length_to_su(&self, uu: f64) -> f64 {
        uu / self.length
    }

    /// Length in whole SU.
    #[must_use]
    pub fn length_to_su_int(&self, uu: f64) -> i64 {
        self.length_to_su(uu).round() as i64
    }

    /// Vector of lengths in SU (real-valued).
    #[must_use]
    pub fn vector_to_su(&self, uu: &Vector3<f64>) -> Vector3<f64> {
        uu / self.length
    }

    /// World point to integer SU coordinates.
    #[must_use]
    pub fn point_to_su(&self, p: &Point3<f64>) -> [i64; 3] {
        [
            self.length_to_su_int(p.x),
            self.length_to_su_int(p.y),
            self.length_to_su_int(p.z),
        ]
    }

    /// Integer SU coordinates to a world point.
    #[must_use]
    pub fn point_to_uu(&self, su: [i64; 3]) -> Point3<f64> {
        Point3::new(
            su[0] as f64 * self.length,
            su[1] as f64 * self.length,
            su[2] as f64 * self.length,
        )
    }

    /// Velocity in SU per tick (real-valued).
    #[must_use]
    pub fn velocity_to_su(&self, uu: &Vector3<f64>) -> Vector3<f64> {
        uu / self.velocity()
    }

    /// Velocity in fixed-point SU per tick.
    #[must_use]
    pub fn velocity_to_fixed(&self, uu: &Vector3<f64>) -> [i64; 3] {
        fixed::vector_to_fixed(&self.velocity_to_su(uu), LINEAR_FRACTION_BITS)
    }

    /// Fixed-point SU velocity back to user units.
    #[must_use]
    pub fn fixed_to_velocity(&self, raw: [i64; 3]) -> Vector3<f64> {
        fixed::vector_from_fixed(raw, LINEAR_FRACTION_BITS) * self.velocity()
    }

    /// Angular velocity in rad per tick.
    #[must_use]
    pub fn angular_velocity_to_su(&self, uu: &Vector3<f64>) -> Vector3<f64> {
        uu * self.time
    }

    /// Acceleration in SU per tick squared.
    #[must_use]
    pub fn acceleration_to_su(&self, uu: &Vector3<f64>) -> Vector3<f64> {
        uu / self.acceleration()
    }

    /// Mass in sphere masses.
    #[must_use]
    pub fn mass_to_su(&self, uu: f64) -> f64 {
        uu / self.mass
    }

    /// Stiffness in SU.
    #[must_use]
    pub fn stiffness_to_su(&self, uu: f64) -> f64 {
        uu / self.stiffness()
    }

    /// Damping rate in SU.
    #[must_use]
    pub fn damping_to_su(&self, uu: f64) -> f64 {
        uu / self.damping_rate()
    }

    /// SU force to user units.
    #[must_use]
    pub fn force_to_uu(&self, su: &Vector3<f64>) -> Vector3<f64> {
        su * self.force()
    }

    /// SU torque to user units.
    #[must_use]
    pub fn torque_to_uu(&self, su: &Vector3<f64>) -> Vector3<f64> {
        su * self.torque()
    }
}
