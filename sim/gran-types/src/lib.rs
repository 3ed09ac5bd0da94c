//! Core types for granular (discrete-element) simulation.
//!
//! This crate holds the pure data shared by the contact model and the
//! engine:
//!
//! - [`GranularConfig`] - Sphere size, box, gravity, step, schemes, materials
//! - [`MaterialTable`] / [`MaterialPair`] - Per-pair contact parameters in user units
//! - [`UnitSystem`] - The user-unit to simulation-unit scaling, computed once
//! - [`FrameMotion`] - Closed set of motion profiles for the big-domain frame
//! - [`FamilyPose`], [`FamilyTwist`], [`GeneralizedForce`] - Mesh family exchange data
//! - [`SimError`] - Error taxonomy for configuration and fatal kernel conditions
//!
//! # Units
//!
//! Callers speak *user units* (UU): whatever consistent length/mass/time
//! system they configure (the defaults are CGS). Internally everything runs
//! in *simulation units* (SU):
//!
//! ```text
//!   mass   : one sphere            = 1 SU
//!   length : m |g| / (psi_L K)     = 1 SU   (integer positions)
//!   time   : dt / step_ticks       = 1 SU   (one tick)
//! ```
//!
//! Positions are `i64` SU. Linear velocities and accelerations are `i64`
//! with [`fixed::LINEAR_FRACTION_BITS`] fractional bits, angular ones with
//! [`fixed::ANGULAR_FRACTION_BITS`].
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed
//!
//! # Example
//!
//! ```
//! use gran_types::{GranularConfig, Gravity, UnitSystem};
//! use nalgebra::Vector3;
//!
//! let config = GranularConfig::new(0.5, 2.5, Vector3::new(20.0, 20.0, 40.0))
//!     .timestep(1e-5)
//!     .gravity(Gravity::cgs_earth());
//! config.validate().unwrap();
//!
//! let units = UnitSystem::derive(&config.scaling_inputs()).unwrap();
//! // One sphere weighs one mass unit
//! let sphere_mass = 4.0 / 3.0 * std::f64::consts::PI * 0.5_f64.powi(3) * 2.5;
//! assert!((units.mass() - sphere_mass).abs() < 1e-12);
//! ```

#![doc(html_root_url = "https://docs.rs/gran-types/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
// Allow certain clippy lints that are overly pedantic for type definitions
#![allow(
    clippy::missing_const_for_fn,     // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,         // mul_add style changes aren't always clearer
    clippy::cast_precision_loss,      // i64 to f64 is fine for SU magnitudes below 2^52
    clippy::cast_possible_truncation, // Rounded f64 to i64 conversions saturate
    clippy::missing_errors_doc,       // Error docs added where non-obvious
)]

mod body;
mod config;
mod dynamics;
mod error;
pub mod fixed;
mod material;
mod units;

pub use body::{BoundaryId, FamilyId, FamilyPose, FamilyTwist, GeneralizedForce, SphereId};
pub use config::{
    FrictionMode, GranularConfig, IntegrationMethod, NormalContactModel, RollingMode,
};
pub use dynamics::{FrameMotion, Gravity};
pub use error::SimError;
pub use material::{MaterialPair, MaterialTable};
pub use units::{PsiFactors, ScalingInputs, UnitSystem};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Hard capacity of one sub-domain's member list.
pub const MAX_SPHERES_PER_SD: u32 = 256;
