//! Gravity and big-domain frame motion.

use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SimError;

/// Gravity configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gravity {
    /// Acceleration due to gravity, in user units.
    pub acceleration: Vector3<f64>,
}

impl Default for Gravity {
    fn default() -> Self {
        Self::cgs_earth()
    }
}

impl Gravity {
    /// Earth gravity in CGS units (980 cm/s² in -Z direction).
    #[must_use]
    pub fn cgs_earth() -> Self {
        Self {
            acceleration: Vector3::new(0.0, 0.0, -980.0),
        }
    }

    /// Earth gravity in SI units (9.81 m/s² in -Z direction).
    #[must_use]
    pub fn earth() -> Self {
        Self {
            acceleration: Vector3::new(0.0, 0.0, -9.81),
        }
    }

    /// Zero gravity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            acceleration: Vector3::zeros(),
        }
    }

    /// Custom gravity vector.
    #[must_use]
    pub fn custom(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }

    /// Magnitude of the acceleration.
    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.acceleration.norm()
    }
}

/// Motion of the big-domain frame, evaluated on the host once per step.
///
/// The offset moves the whole box (its six walls and its SD grid) relative
/// to world coordinates. Particle coordinates are never rewritten; the
/// broadphase subtracts the offset instead.
///
/// # Example
///
/// ```
/// use gran_types::FrameMotion;
/// use nalgebra::Vector3;
///
/// // Box shaken vertically: 0.5 amplitude at 10 rad/s
/// let motion = FrameMotion::Sinusoidal {
///     amplitude: Vector3::new(0.0, 0.0, 0.5),
///     angular_frequency: 10.0,
///     phase: 0.0,
/// };
/// assert!(motion.offset(0.0).norm() < 1e-12);
/// assert!((motion.velocity(0.0).z - 5.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameMotion {
    /// The box never moves.
    #[default]
    Fixed,
    /// Constant displacement from the world origin.
    Constant {
        /// Offset of the box center.
        offset: Vector3<f64>,
    },
    /// `amplitude * sin(angular_frequency * t + phase)` per axis.
    Sinusoidal {
        /// Peak displacement per axis.
        amplitude: Vector3<f64>,
        /// Angular frequency (rad per time unit).
        angular_frequency: f64,
        /// Phase at `t = 0` (rad).
        phase: f64,
    },
    /// `sum_i coefficients[i] * t^i`.
    Polynomial {
        /// Coefficients in increasing power order.
        coefficients: Vec<Vector3<f64>>,
    },
}

impl FrameMotion {
    /// Offset of the box center at time `t`.
    #[must_use]
    pub fn offset(&self, t: f64) -> Vector3<f64> {
        match self {
            Self::Fixed => Vector3::zeros(),
            Self::Constant { offset } => *offset,
            Self::Sinusoidal {
                amplitude,
                angular_frequency,
                phase,
            } => amplitude * (angular_frequency * t + phase).sin(),
            Self::Polynomial { coefficients } => coefficients
                .iter()
                .rev()
                .fold(Vector3::zeros(), |acc, c| acc * t + c),
        }
    }

    /// Velocity of the box at time `t`.
    #[must_use]
    pub fn velocity(&self, t: f64) -> Vector3<f64> {
        match self {
            Self::Fixed | Self::Constant { .. } => Vector3::zeros(),
            Self::Sinusoidal {
                amplitude,
                angular_frequency,
                phase,
            } => amplitude * (angular_frequency * (angular_frequency * t + phase).cos()),
            Self::Polynomial { coefficients } => coefficients
                .iter()
                .enumerate()
                .skip(1)
                .rev()
                .fold(Vector3::zeros(), |acc, (power, c)| acc * t + c * power as f64),
        }
    }

    /// True if the box never moves.
    #[must_use]
    pub fn is_stationary(&self) -> bool {
        match self {
            Self::Fixed | Self::Constant { .. } => true,
            Self::Sinusoidal { amplitude, .. } => amplitude.norm() == 0.0,
            Self::Polynomial { coefficients } => {
                coefficients.iter().skip(1).all(|c| c.norm() == 0.0)
            }
        }
    }

    /// Rejects non-finite parameters.
    pub fn validate(&self) -> crate::Result<()> {
        let finite = |v: &Vector3<f64>| v.iter().all(|x| x.is_finite());
        let ok = match self {
            Self::Fixed => true,
            Self::Constant { offset } => finite(offset),
            Self::Sinusoidal {
                amplitude,
                angular_frequency,
                phase,
            } => finite(amplitude) && angular_frequency.is_finite() && phase.is_finite(),
            Self::Polynomial { coefficients } => coefficients.iter().all(finite),
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::invalid_config("frame motion has non-finite parameters"))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gravity_presets() {
        assert_relative_eq!(Gravity::cgs_earth().magnitude(), 980.0);
        assert_relative_eq!(Gravity::earth().acceleration.z, -9.81);
        assert_eq!(Gravity::zero().magnitude(), 0.0);
    }

    #[test]
    fn test_polynomial_offset_and_velocity() {
        // p(t) = (1, 0, 0) + (0, 2, 0) t + (0, 0, 3) t^2
        let motion = FrameMotion::Polynomial {
            coefficients: vec![
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 2.0, 0.0),
                Vector3::new(0.0, 0.0, 3.0),
            ],
        };
        let p = motion.offset(2.0);
        assert_relative_eq!(p, Vector3::new(1.0, 4.0, 12.0));
        let v = motion.velocity(2.0);
        assert_relative_eq!(v, Vector3::new(0.0, 2.0, 12.0));
        assert!(!motion.is_stationary());
    }

    #[test]
    fn test_sinusoidal_quarter_period() {
        let motion = FrameMotion::Sinusoidal {
            amplitude: Vector3::new(2.0, 0.0, 0.0),
            angular_frequency: std::f64::consts::PI,
            phase: 0.0,
        };
        assert_relative_eq!(motion.offset(0.5).x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(motion.velocity(0.5).x, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stationary_profiles() {
        assert!(FrameMotion::Fixed.is_stationary());
        let constant = FrameMotion::Constant {
            offset: Vector3::new(1.0, 2.0, 3.0),
        };
        assert!(constant.is_stationary());
        assert_eq!(constant.velocity(5.0), Vector3::zeros());
        assert_eq!(constant.offset(5.0), Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let motion = FrameMotion::Sinusoidal {
            amplitude: Vector3::new(f64::NAN, 0.0, 0.0),
            angular_frequency: 1.0,
            phase: 0.0,
        };
        assert!(motion.validate().is_err());
        assert!(FrameMotion::Fixed.validate().is_ok());
    }
}
