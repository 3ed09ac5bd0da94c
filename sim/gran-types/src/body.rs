//! Identifiers and the mesh-family exchange types.

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::SimError;

macro_rules! dense_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u32);

        impl $name {
            /// Create a new ID.
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Get the raw ID value.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// The ID as an array index.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

dense_id!(
    /// Dense index of a sphere, `[0, n_spheres)`.
    SphereId,
    "Sphere"
);
dense_id!(
    /// Dense index of a mesh triangle family.
    FamilyId,
    "Family"
);
dense_id!(
    /// Handle of a registered boundary condition.
    BoundaryId,
    "Boundary"
);

/// Pose of a mesh family as supplied by the external rigid-body solver.
///
/// The flat wire form is 7 doubles: position `x, y, z` then the
/// orientation quaternion `e0, e1, e2, e3` with `e0` the scalar part.
///
/// # Example
///
/// ```
/// use gran_types::FamilyPose;
///
/// let pose = FamilyPose::from_array(&[1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.0]).unwrap();
/// assert_eq!(pose.position.y, 2.0);
/// assert!(pose.orientation.angle() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FamilyPose {
    /// Origin of the family frame in world coordinates.
    pub position: Point3<f64>,
    /// Rotation from family frame to world frame.
    pub orientation: UnitQuaternion<f64>,
}

impl FamilyPose {
    /// Number of doubles per family in the flat pose array.
    pub const STRIDE: usize = 7;

    /// Identity pose at the world origin.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Point3::origin(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Parses one 7-double record. The quaternion is renormalized.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] for non-finite entries or a quaternion
    /// too close to zero to normalize.
    pub fn from_array(data: &[f64; 7]) -> crate::Result<Self> {
        if !data.iter().all(|x| x.is_finite()) {
            return Err(SimError::invalid_config(format!(
                "mesh family pose must be finite, got {data:?}"
            )));
        }
        let q = Quaternion::new(data[3], data[4], data[5], data[6]);
        if q.norm() < f64::EPSILON {
            return Err(SimError::invalid_config(
                "mesh family orientation quaternion has zero norm",
            ));
        }
        Ok(Self {
            position: Point3::new(data[0], data[1], data[2]),
            orientation: UnitQuaternion::from_quaternion(q),
        })
    }

    /// Parses a flat array of `n_families` records.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] unless `data` holds exactly
    /// `7 * n_families` doubles, otherwise as [`from_array`](Self::from_array).
    pub fn parse_all(data: &[f64], n_families: usize) -> crate::Result<Vec<Self>> {
        if data.len() != n_families * Self::STRIDE {
            return Err(SimError::mismatched_lengths(
                "mesh family poses",
                n_families * Self::STRIDE,
                data.len(),
            ));
        }
        data.chunks_exact(Self::STRIDE)
            .map(|chunk| {
                let mut record = [0.0; Self::STRIDE];
                record.copy_from_slice(chunk);
                Self::from_array(&record)
            })
            .collect()
    }
}

/// Linear and angular velocity of a mesh family, world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FamilyTwist {
    /// Velocity of the family origin.
    pub linear: Vector3<f64>,
    /// Angular velocity.
    pub angular: Vector3<f64>,
}

impl FamilyTwist {
    /// Number of doubles per family in the flat velocity array.
    pub const STRIDE: usize = 6;

    /// Zero velocity.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }

    /// Parses a flat array of `n_families` records.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] unless `data` holds exactly
    /// `6 * n_families` doubles; [`SimError::InvalidConfig`] for non-finite
    /// entries.
    pub fn parse_all(data: &[f64], n_families: usize) -> crate::Result<Vec<Self>> {
        if data.len() != n_families * Self::STRIDE {
            return Err(SimError::mismatched_lengths(
                "mesh family velocities",
                n_families * Self::STRIDE,
                data.len(),
            ));
        }
        if let Some(x) = data.iter().find(|x| !x.is_finite()) {
            return Err(SimError::invalid_config(format!(
                "mesh family velocity must be finite, got {x}"
            )));
        }
        Ok(data
            .chunks_exact(Self::STRIDE)
            .map(|d| Self {
                linear: Vector3::new(d[0], d[1], d[2]),
                angular: Vector3::new(d[3], d[4], d[5]),
            })
            .collect())
    }
}

/// Net contact force and torque exerted by the spheres on one mesh family.
///
/// Torque is taken about the family origin. The flat wire form is 6
/// doubles: force then torque.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeneralizedForce {
    /// Net force.
    pub force: Vector3<f64>,
    /// Net torque about the family origin.
    pub torque: Vector3<f64>,
}

impl GeneralizedForce {
    /// Number of doubles per family in the flat force array.
    pub const STRIDE: usize = 6;

    /// Zero force and torque.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }

    /// Flat `[fx, fy, fz, tx, ty, tz]` form.
    #[must_use]
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.force.x,
            self.force.y,
            self.force.z,
            self.torque.x,
            self.torque.y,
            self.torque.z,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ids() {
        let id = SphereId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.index(), 42);
        assert_eq!(id.to_string(), "Sphere(42)");
        assert_eq!(FamilyId::from(3).to_string(), "Family(3)");
        assert_eq!(BoundaryId::new(1).to_string(), "Boundary(1)");
    }

    #[test]
    fn test_pose_parsing() {
        let half = std::f64::consts::FRAC_1_SQRT_2;
        // 90 degrees about z
        let data = [0.0, 0.0, 1.0, half, 0.0, 0.0, half, 5.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let poses = FamilyPose::parse_all(&data, 2).unwrap();
        assert_eq!(poses.len(), 2);
        let rotated = poses[0].orientation * Vector3::x();
        assert_relative_eq!(rotated, Vector3::y(), epsilon = 1e-12);
        assert_eq!(poses[1].position.x, 5.0);
    }

    #[test]
    fn test_pose_length_mismatch() {
        let err = FamilyPose::parse_all(&[0.0; 13], 2).unwrap_err();
        assert_eq!(
            err,
            SimError::MismatchedLengths {
                what: "mesh family poses".into(),
                expected: 14,
                actual: 13,
            }
        );
        assert!(FamilyTwist::parse_all(&[0.0; 5], 1).is_err());
    }

    #[test]
    fn test_pose_rejects_degenerate_records() {
        let zero_quat = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!(FamilyPose::from_array(&zero_quat).unwrap_err().is_config_error());

        let nan_position = [f64::NAN, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        assert!(FamilyPose::parse_all(&nan_position, 1).is_err());

        // Non-unit quaternions are renormalized
        let pose = FamilyPose::from_array(&[0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(pose.orientation.angle() < 1e-12);

        let twist = [0.0, f64::INFINITY, 0.0, 0.0, 0.0, 0.0];
        assert!(FamilyTwist::parse_all(&twist, 1).unwrap_err().is_config_error());
    }

    #[test]
    fn test_twist_and_force_layout() {
        let twists = FamilyTwist::parse_all(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 1).unwrap();
        assert_eq!(twists[0].angular, Vector3::new(4.0, 5.0, 6.0));

        let gf = GeneralizedForce {
            force: Vector3::new(1.0, 2.0, 3.0),
            torque: Vector3::new(4.0, 5.0, 6.0),
        };
        assert_eq!(gf.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
