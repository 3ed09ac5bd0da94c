//! Configuration types for granular simulation.
//!
//! One configuration-driven engine covers every variant: the friction
//! mode, normal contact model, rolling mode and integration scheme are
//! plain enums checked where they matter, not separate engine types.

use nalgebra::Vector3;

use crate::dynamics::{FrameMotion, Gravity};
use crate::material::{MaterialPair, MaterialTable};
use crate::units::{PsiFactors, ScalingInputs};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Main configuration for a granular system, in user units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GranularConfig {
    /// Radius shared by all spheres.
    pub sphere_radius: f64,
    /// Sphere material density.
    pub sphere_density: f64,
    /// Full extents of the big domain.
    pub box_dims: Vector3<f64>,
    /// Gravity configuration.
    pub gravity: Gravity,
    /// Fixed user time step.
    pub timestep: f64,
    /// Velocity/position update scheme.
    pub integrator: IntegrationMethod,
    /// Tangential force model.
    pub friction_mode: FrictionMode,
    /// Normal force model.
    pub contact_model: NormalContactModel,
    /// Rolling resistance model.
    pub rolling_mode: RollingMode,
    /// Contact parameters per interaction kind.
    pub materials: MaterialTable,
    /// Unit system tuning factors.
    pub psi: PsiFactors,
    /// Motion of the big-domain frame.
    pub frame_motion: FrameMotion,
    /// Target sphere diameters per SD edge, per axis.
    pub spheres_per_sd: [f64; 3],
    /// Accept (and clamp) spheres placed outside the big domain.
    pub clamp_to_domain: bool,
}

impl Default for GranularConfig {
    fn default() -> Self {
        Self {
            sphere_radius: 0.5,
            sphere_density: 2.5,
            box_dims: Vector3::new(20.0, 20.0, 20.0),
            gravity: Gravity::cgs_earth(),
            timestep: 1e-5,
            integrator: IntegrationMethod::default(),
            friction_mode: FrictionMode::default(),
            contact_model: NormalContactModel::default(),
            rolling_mode: RollingMode::default(),
            materials: MaterialTable::default(),
            psi: PsiFactors::default(),
            frame_motion: FrameMotion::Fixed,
            spheres_per_sd: [4.0; 3],
            clamp_to_domain: true,
        }
    }
}

impl GranularConfig {
    /// Create a configuration for the given sphere and box.
    #[must_use]
    pub fn new(sphere_radius: f64, sphere_density: f64, box_dims: Vector3<f64>) -> Self {
        Self {
            sphere_radius,
            sphere_density,
            box_dims,
            ..Default::default()
        }
    }

    /// Set the user time step.
    #[must_use]
    pub fn timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    /// Set gravity.
    #[must_use]
    pub fn gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    /// Disable gravity.
    #[must_use]
    pub fn zero_gravity(mut self) -> Self {
        self.gravity = Gravity::zero();
        self
    }

    /// Set the integration scheme.
    #[must_use]
    pub fn integrator(mut self, method: IntegrationMethod) -> Self {
        self.integrator = method;
        self
    }

    /// Set the friction mode.
    #[must_use]
    pub fn friction_mode(mut self, mode: FrictionMode) -> Self {
        self.friction_mode = mode;
        self
    }

    /// Set the normal contact model.
    #[must_use]
    pub fn contact_model(mut self, model: NormalContactModel) -> Self {
        self.contact_model = model;
        self
    }

    /// Set the rolling resistance model.
    #[must_use]
    pub fn rolling_mode(mut self, mode: RollingMode) -> Self {
        self.rolling_mode = mode;
        self
    }

    /// Replace all materials.
    #[must_use]
    pub fn materials(mut self, materials: MaterialTable) -> Self {
        self.materials = materials;
        self
    }

    /// Use one material pair for every interaction kind.
    #[must_use]
    pub fn uniform_material(mut self, pair: MaterialPair) -> Self {
        self.materials = MaterialTable::uniform(pair);
        self
    }

    /// Set the unit system tuning factors (`psi_T`, `psi_h`, `psi_L`).
    #[must_use]
    pub fn psi(mut self, psi: PsiFactors) -> Self {
        self.psi = psi;
        self
    }

    /// Set the big-domain frame motion.
    #[must_use]
    pub fn frame_motion(mut self, motion: FrameMotion) -> Self {
        self.frame_motion = motion;
        self
    }

    /// Set the target sphere diameters per SD edge.
    #[must_use]
    pub fn spheres_per_sd(mut self, per_axis: [f64; 3]) -> Self {
        self.spheres_per_sd = per_axis;
        self
    }

    /// Reject spheres placed outside the big domain instead of clamping them.
    #[must_use]
    pub fn strict_domain(mut self) -> Self {
        self.clamp_to_domain = false;
        self
    }

    /// Inputs for [`UnitSystem::derive`](crate::UnitSystem::derive).
    #[must_use]
    pub fn scaling_inputs(&self) -> ScalingInputs {
        ScalingInputs {
            sphere_radius: self.sphere_radius,
            sphere_density: self.sphere_density,
            box_dims: self.box_dims,
            max_stiffness: self.materials.max_normal_stiffness(),
            gravity: self.gravity.acceleration,
            timestep: self.timestep,
            psi: self.psi,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.timestep));
        }
        if !(self.sphere_radius.is_finite() && self.sphere_radius > 0.0) {
            return Err(crate::SimError::degenerate_scaling(format!(
                "sphere radius must be positive, got {}",
                self.sphere_radius
            )));
        }
        if !(self.sphere_density.is_finite() && self.sphere_density > 0.0) {
            return Err(crate::SimError::degenerate_scaling(format!(
                "sphere density must be positive, got {}",
                self.sphere_density
            )));
        }
        if self.box_dims.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(crate::SimError::degenerate_scaling(format!(
                "box dimensions must be positive, got {:?}",
                self.box_dims.as_slice()
            )));
        }
        if self
            .spheres_per_sd
            .iter()
            .any(|n| !(n.is_finite() && *n >= 1.0))
        {
            return Err(crate::SimError::invalid_config(format!(
                "spheres per SD must be at least 1 on every axis, got {:?}",
                self.spheres_per_sd
            )));
        }
        if !self.gravity.acceleration.iter().all(|g| g.is_finite()) {
            return Err(crate::SimError::invalid_config("gravity must be finite"));
        }
        if self.rolling_mode == RollingMode::Coulomb
            && self.friction_mode == FrictionMode::Frictionless
        {
            return Err(crate::SimError::invalid_config(
                "Coulomb rolling resistance requires a frictional contact mode",
            ));
        }

        self.materials.validate()?;
        self.psi.validate()?;
        self.frame_motion.validate()?;

        Ok(())
    }
}

/// Time integration scheme for sphere velocities and positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IntegrationMethod {
    /// `v += h a; x += h v` (velocity first).
    #[default]
    ForwardEuler,
    /// `x += h v + h^2 a / 2; v += h a`.
    ExtendedTaylor,
    /// Chung's two-step explicit scheme with `beta = 28/27`, `gamma = 3/2`.
    Chung,
}

impl IntegrationMethod {
    /// Get the order of accuracy for this method.
    #[must_use]
    pub const fn order(self) -> usize {
        match self {
            Self::ForwardEuler => 1,
            Self::ExtendedTaylor | Self::Chung => 2,
        }
    }

    /// True if the scheme reads the previous step's acceleration.
    #[must_use]
    pub const fn needs_previous_acceleration(self) -> bool {
        matches!(self, Self::Chung)
    }
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForwardEuler => write!(f, "Forward Euler"),
            Self::ExtendedTaylor => write!(f, "Extended Taylor"),
            Self::Chung => write!(f, "Chung"),
        }
    }
}

/// How tangential contact forces are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrictionMode {
    /// No tangential force.
    Frictionless,
    /// From the instantaneous tangential velocity only.
    SingleStep,
    /// From a tangential displacement accumulated over the contact's lifetime.
    #[default]
    MultiStep,
}

impl FrictionMode {
    /// True if contacts need persistent displacement history.
    #[must_use]
    pub const fn tracks_history(self) -> bool {
        matches!(self, Self::MultiStep)
    }

    /// True if tangential forces are applied at all.
    #[must_use]
    pub const fn has_friction(self) -> bool {
        !matches!(self, Self::Frictionless)
    }
}

impl std::fmt::Display for FrictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frictionless => write!(f, "frictionless"),
            Self::SingleStep => write!(f, "single-step"),
            Self::MultiStep => write!(f, "multi-step"),
        }
    }
}

/// Normal force law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NormalContactModel {
    /// Linear spring-damper.
    #[default]
    Hooke,
    /// Spring-damper scaled by `sqrt(penetration / radius)`.
    Hertz,
}

/// Rolling resistance law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RollingMode {
    /// No rolling resistance.
    #[default]
    None,
    /// Torque proportional to relative angular velocity.
    Viscous,
    /// Constant-magnitude torque `mu_r r F_n` opposing relative rotation.
    Coulomb,
}
