//! Fixed-point time integration of sphere velocities and positions.
//!
//! All schemes work per axis on integers: positions in SU, velocities and
//! accelerations with [`LINEAR_FRACTION_BITS`] fractional bits, `h` in
//! ticks. Intermediates use `i128`; rounding is half-up, so results are
//! bit-reproducible.
//!
//! | Scheme | Position | Velocity |
//! |--------|----------|----------|
//! | Forward Euler | `x += h v'` | `v' = v + h a` |
//! | Extended Taylor | `x += h v + h² a / 2` | `v += h a` |
//! | Chung | `x += h v + h² (β a + (½ − β) a₋)` | `v += h (γ a + (1 − γ) a₋)` |
//!
//! with `β = 28/27`, `γ = 3/2` and `a₋` the previous step's acceleration.
//! Angular velocities always use explicit Euler.
//!
//! # Example
//!
//! ```
//! use gran_core::integrators::{ForwardEuler, Integrator};
//!
//! // Unit acceleration (1.0 in 16-bit fixed point) for 4 ticks from rest
//! let mut x = 0;
//! let mut v = 0;
//! ForwardEuler::advance_axis(&mut x, &mut v, 1 << 16, 0, 4);
//! assert_eq!(v, 4 << 16);
//! assert_eq!(x, 16);
//! ```

use gran_types::IntegrationMethod;
use gran_types::fixed::{LINEAR_FRACTION_BITS, div_round, round_shift};

/// Trait for integration schemes.
pub trait Integrator {
    /// Advance one axis by `h` ticks.
    ///
    /// # Arguments
    ///
    /// * `x` - Position (SU), updated in place
    /// * `v` - Fixed-point velocity, updated in place
    /// * `a` - Fixed-point acceleration of this step
    /// * `a_prev` - Fixed-point acceleration of the previous step
    /// * `h` - Step length in ticks
    fn advance_axis(x: &mut i64, v: &mut i64, a: i64, a_prev: i64, h: i64);

    /// Advance all three axes.
    fn advance(x: &mut [i64; 3], v: &mut [i64; 3], a: [i64; 3], a_prev: [i64; 3], h: i64) {
        for axis in 0..3 {
            Self::advance_axis(&mut x[axis], &mut v[axis], a[axis], a_prev[axis], h);
        }
    }
}

/// Dispatch to the scheme selected by `method`.
pub fn integrate_with_method(
    method: IntegrationMethod,
    x: &mut [i64; 3],
    v: &mut [i64; 3],
    a: [i64; 3],
    a_prev: [i64; 3],
    h: i64,
) {
    match method {
        IntegrationMethod::ForwardEuler => ForwardEuler::advance(x, v, a, a_prev, h),
        IntegrationMethod::ExtendedTaylor => ExtendedTaylor::advance(x, v, a, a_prev, h),
        IntegrationMethod::Chung => Chung::advance(x, v, a, a_prev, h),
    }
}

/// Semi-implicit forward Euler: velocity first, then position with the new velocity.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardEuler;

impl Integrator for ForwardEuler {
    fn advance_axis(x: &mut i64, v: &mut i64, a: i64, _a_prev: i64, h: i64) {
        *v += h * a;
        *x += round_shift(i128::from(h) * i128::from(*v), LINEAR_FRACTION_BITS);
    }
}

/// Second-order Taylor expansion of the position.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtendedTaylor;

impl Integrator for ExtendedTaylor {
    fn advance_axis(x: &mut i64, v: &mut i64, a: i64, _a_prev: i64, h: i64) {
        let h = i128::from(h);
        let dx = h * i128::from(*v) + div_round(h * h * i128::from(a), 2);
        *x += round_shift(dx, LINEAR_FRACTION_BITS);
        *v += (h * i128::from(a)) as i64;
    }
}

/// Chung's explicit two-step scheme (`β = 28/27`, `γ = 3/2`).
///
/// Numerically dissipates high-frequency contact oscillation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chung;

impl Integrator for Chung {
    fn advance_axis(x: &mut i64, v: &mut i64, a: i64, a_prev: i64, h: i64) {
        let h = i128::from(h);
        let a = i128::from(a);
        let a_prev = i128::from(a_prev);
        // beta a + (1/2 - beta) a_prev = (56 a - 29 a_prev) / 54
        let dx = h * i128::from(*v) + div_round(h * h * (56 * a - 29 * a_prev), 54);
        *x += round_shift(dx, LINEAR_FRACTION_BITS);
        // gamma a + (1 - gamma) a_prev = (3 a - a_prev) / 2
        *v += div_round(h * (3 * a - a_prev), 2) as i64;
    }
}

/// Explicit Euler update of a fixed-point angular velocity.
pub fn advance_angular(omega: &mut [i64; 3], alpha: [i64; 3], h: i64) {
    for (w, a) in omega.iter_mut().zip(alpha) {
        *w += h * a;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    const ONE: i64 = 1 << LINEAR_FRACTION_BITS;

    fn fall(method: IntegrationMethod, steps: usize, h: i64) -> (i64, i64) {
        let mut x = [0; 3];
        let mut v = [0; 3];
        let a = [0, 0, -ONE];
        for _ in 0..steps {
            integrate_with_method(method, &mut x, &mut v, a, a, h);
        }
        (x[2], v[2])
    }

    #[test]
    fn test_constant_acceleration_velocity() {
        // Every scheme is exact for the velocity under constant acceleration
        for method in [
            IntegrationMethod::ForwardEuler,
            IntegrationMethod::ExtendedTaylor,
            IntegrationMethod::Chung,
        ] {
            let (_, v) = fall(method, 10, 2);
            assert_eq!(v, -20 * ONE, "{method}");
        }
    }

    #[test]
    fn test_taylor_position_is_exact() {
        // x = -a t^2 / 2 with t = 20 ticks
        let (x, _) = fall(IntegrationMethod::ExtendedTaylor, 10, 2);
        assert_eq!(x, -200);
    }

    #[test]
    fn test_euler_position_overshoots_by_half_step() {
        // Semi-implicit Euler: x_n = -a h^2 n (n + 1) / 2
        let (x, _) = fall(IntegrationMethod::ForwardEuler, 10, 2);
        assert_eq!(x, -220);
    }

    #[test]
    fn test_chung_constant_acceleration() {
        // With a_prev == a: dx = h v + h^2 a 27/54 = h v + h^2 a / 2
        let (x, _) = fall(IntegrationMethod::Chung, 10, 2);
        assert_eq!(x, -200);
    }

    #[test]
    fn test_chung_uses_previous_acceleration() {
        let mut x = 0;
        let mut v = 0;
        // a = 1, a_prev = 0, h = 1: v += 3/2, x += 56 / 54
        Chung::advance_axis(&mut x, &mut v, 54 * ONE, 0, 1);
        assert_eq!(v, 81 * ONE);
        assert_eq!(x, 56);
    }

    #[test]
    fn test_angular_euler() {
        let mut omega = [1, 2, 3];
        advance_angular(&mut omega, [10, 0, -1], 3);
        assert_eq!(omega, [31, 2, 0]);
    }
}
