//! Integer particle state and the per-step accumulators kernels write into.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use gran_types::SimError;
use gran_types::fixed::{self, ANGULAR_FRACTION_BITS, LINEAR_FRACTION_BITS};
use nalgebra::Vector3;
use rayon::prelude::*;

/// Sphere moment of inertia over `m r^2`.
pub(crate) const INERTIA_FACTOR: f64 = 0.4;

/// Structure-of-arrays sphere state in SU.
///
/// Positions are world-frame SU. Linear velocities carry
/// [`LINEAR_FRACTION_BITS`], angular velocities [`ANGULAR_FRACTION_BITS`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SphereState {
    pub(crate) positions: Vec<[i64; 3]>,
    pub(crate) velocities: Vec<[i64; 3]>,
    pub(crate) angular_velocities: Vec<[i64; 3]>,
    /// Linear acceleration of the previous step, for multi-step schemes.
    pub(crate) previous_accelerations: Vec<[i64; 3]>,
    pub(crate) has_previous: bool,
}

impl SphereState {
    /// State at rest at the given positions.
    #[must_use]
    pub fn at_positions(positions: Vec<[i64; 3]>) -> Self {
        let n = positions.len();
        Self {
            positions,
            velocities: vec![[0; 3]; n],
            angular_velocities: vec![[0; 3]; n],
            previous_accelerations: vec![[0; 3]; n],
            has_previous: false,
        }
    }

    /// Number of spheres.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True if there are no spheres.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions in SU.
    #[must_use]
    pub fn positions(&self) -> &[[i64; 3]] {
        &self.positions
    }

    /// Fixed-point linear velocities.
    #[must_use]
    pub fn velocities(&self) -> &[[i64; 3]] {
        &self.velocities
    }

    /// Fixed-point angular velocities.
    #[must_use]
    pub fn angular_velocities(&self) -> &[[i64; 3]] {
        &self.angular_velocities
    }

    /// Linear velocity of sphere `i` in SU per tick.
    pub(crate) fn linear_velocity(&self, i: usize) -> Vector3<f64> {
        fixed::vector_from_fixed(self.velocities[i], LINEAR_FRACTION_BITS)
    }

    /// Angular velocity of sphere `i` in rad per tick.
    pub(crate) fn angular_velocity(&self, i: usize) -> Vector3<f64> {
        fixed::vector_from_fixed(self.angular_velocities[i], ANGULAR_FRACTION_BITS)
    }
}

/// Per-sphere fixed-point acceleration sums.
///
/// Every contact contribution is quantized once and added with an integer
/// atomic add, so the totals do not depend on the order contacts ran in.
#[derive(Debug)]
pub struct ForceAccumulator {
    linear: Vec<[AtomicI64; 3]>,
    angular: Vec<[AtomicI64; 3]>,
    angular_scale: f64,
}

impl ForceAccumulator {
    /// Zeroed accumulators for `spheres` spheres of `radius` SU.
    #[must_use]
    pub fn new(spheres: usize, radius: f64) -> Self {
        let zeros = || -> [AtomicI64; 3] { std::array::from_fn(|_| AtomicI64::new(0)) };
        Self {
            linear: (0..spheres).map(|_| zeros()).collect(),
            angular: (0..spheres).map(|_| zeros()).collect(),
            angular_scale: 1.0 / (INERTIA_FACTOR * radius * radius),
        }
    }

    /// Quantizes an SU force (equal to the acceleration of a unit mass).
    #[must_use]
    pub fn quantize_force(force: &Vector3<f64>) -> [i64; 3] {
        fixed::vector_to_fixed(force, LINEAR_FRACTION_BITS)
    }

    /// Quantizes an SU torque into a fixed-point angular acceleration.
    #[must_use]
    pub fn quantize_torque(&self, torque: &Vector3<f64>) -> [i64; 3] {
        fixed::vector_to_fixed(&(torque * self.angular_scale), ANGULAR_FRACTION_BITS)
    }

    /// Adds a quantized linear contribution to sphere `i`.
    pub fn add_linear(&self, i: usize, q: [i64; 3]) {
        for (slot, value) in self.linear[i].iter().zip(q) {
            if value != 0 {
                slot.fetch_add(value, Ordering::Relaxed);
            }
        }
    }

    /// Subtracts a quantized linear contribution from sphere `i`.
    pub fn sub_linear(&self, i: usize, q: [i64; 3]) {
        self.add_linear(i, q.map(|v| -v));
    }

    /// Adds a quantized angular contribution to sphere `i`.
    pub fn add_angular(&self, i: usize, q: [i64; 3]) {
        for (slot, value) in self.angular[i].iter().zip(q) {
            if value != 0 {
                slot.fetch_add(value, Ordering::Relaxed);
            }
        }
    }

    /// Reads and clears the accumulated `(linear, angular)` accelerations.
    pub(crate) fn take(&self, i: usize) -> ([i64; 3], [i64; 3]) {
        let linear = std::array::from_fn(|k| self.linear[i][k].swap(0, Ordering::Relaxed));
        let angular = std::array::from_fn(|k| self.angular[i][k].swap(0, Ordering::Relaxed));
        (linear, angular)
    }

    /// Current linear sum of sphere `i` without clearing.
    #[must_use]
    pub fn linear(&self, i: usize) -> [i64; 3] {
        std::array::from_fn(|k| self.linear[i][k].load(Ordering::Relaxed))
    }

    /// Clears every accumulator.
    pub fn clear(&self) {
        self.linear
            .par_iter()
            .zip(self.angular.par_iter())
            .for_each(|(lin, ang)| {
                for slot in lin.iter().chain(ang) {
                    slot.store(0, Ordering::Relaxed);
                }
            });
    }
}

/// First fatal condition raised by a parallel kernel.
///
/// Workers check [`is_raised`](Self::is_raised) to stop early; the host
/// collects the error at the kernel boundary.
#[derive(Debug, Default)]
pub struct FatalFlag {
    raised: AtomicBool,
    first: OnceLock<SimError>,
}

impl FatalFlag {
    /// Records `error` unless an earlier one is already recorded.
    pub fn raise(&self, error: SimError) {
        let _ = self.first.set(error);
        self.raised.store(true, Ordering::Relaxed);
    }

    /// True once any worker raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Relaxed)
    }

    /// Takes the recorded error and resets the flag.
    pub fn take(&mut self) -> Option<SimError> {
        *self.raised.get_mut() = false;
        self.first.take()
    }
}
