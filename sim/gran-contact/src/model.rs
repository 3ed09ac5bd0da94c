//! Penalty contact force model.
//!
//! Every contact in the engine (sphere-sphere, sphere-wall, sphere-boundary
//! and sphere-triangle) goes through [`ContactModel::compute`]; only the
//! geometry, the partner's motion and the effective mass differ.

use gran_types::{FrictionMode, NormalContactModel, RollingMode};
use nalgebra::Vector3;

use crate::contact::{BodyMotion, ContactGeometry, ContactResponse};
use crate::friction::{FrictionCone, rotate_into_plane};
use crate::params::ContactParams;

/// Sphere moment of inertia per unit mass, over `r^2`.
const INERTIA_FACTOR: f64 = 0.4;

/// Angular speeds below this (rad per tick) produce no rolling torque.
const ROLLING_SPEED_EPSILON: f64 = 1e-15;

/// Contact force model for one interaction kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModel {
    params: ContactParams,
    friction_mode: FrictionMode,
    normal_model: NormalContactModel,
    rolling_mode: RollingMode,
    radius: f64,
    step: f64,
}

impl ContactModel {
    /// Create a model for spheres of `radius` SU advanced `step` ticks per step.
    ///
    /// Defaults to frictionless Hookean contact without rolling resistance.
    #[must_use]
    pub fn new(params: ContactParams, radius: f64, step: f64) -> Self {
        Self {
            params,
            friction_mode: FrictionMode::Frictionless,
            normal_model: NormalContactModel::Hooke,
            rolling_mode: RollingMode::None,
            radius,
            step,
        }
    }

    /// Set the tangential force mode.
    #[must_use]
    pub fn with_friction_mode(mut self, mode: FrictionMode) -> Self {
        self.friction_mode = mode;
        self
    }

    /// Set the normal force law.
    #[must_use]
    pub fn with_normal_model(mut self, model: NormalContactModel) -> Self {
        self.normal_model = model;
        self
    }

    /// Set the rolling resistance law.
    #[must_use]
    pub fn with_rolling_mode(mut self, mode: RollingMode) -> Self {
        self.rolling_mode = mode;
        self
    }

    /// Get the scaled parameters.
    #[must_use]
    pub fn params(&self) -> &ContactParams {
        &self.params
    }

    /// Get the friction mode.
    #[must_use]
    pub fn friction_mode(&self) -> FrictionMode {
        self.friction_mode
    }

    /// Stiffness multiplier for a given penetration.
    #[must_use]
    pub fn stiffness_factor(&self, penetration: f64) -> f64 {
        match self.normal_model {
            NormalContactModel::Hooke => 1.0,
            NormalContactModel::Hertz => (penetration.max(0.0) / self.radius).sqrt(),
        }
    }

    /// Compute the response of one contact.
    ///
    /// `history` is the contact's accumulated tangential displacement; it
    /// is read and updated in multi-step mode and ignored otherwise.
    #[must_use]
    pub fn compute(
        &self,
        geometry: &ContactGeometry,
        body_a: &BodyMotion,
        body_b: &BodyMotion,
        effective_mass: f64,
        history: Option<&mut Vector3<f64>>,
    ) -> ContactResponse {
        let n = geometry.normal;
        let p = &self.params;

        let v_rel =
            body_a.point_velocity(&geometry.arm_a) - body_b.point_velocity(&geometry.arm_b);
        let v_n = v_rel.dot(&n);
        let v_t = v_rel - n * v_n;

        let factor = self.stiffness_factor(geometry.penetration);
        let normal_force = (factor
            * (p.normal_stiffness * geometry.penetration
                - p.normal_damping * effective_mass * v_n))
            .max(0.0);

        let tangential =
            self.tangential_force(&n, &v_t, factor, normal_force, effective_mass, history);

        let force = n * (normal_force - p.cohesion_force) + tangential;
        let mut torque_a = geometry.arm_a.cross(&force);
        let mut torque_b = geometry.arm_b.cross(&(-force));

        let rolling = self.rolling_torque(body_a, body_b, normal_force, effective_mass);
        torque_a += rolling;
        torque_b -= rolling;

        ContactResponse {
            force,
            torque_a,
            torque_b,
            normal_force,
        }
    }

    fn tangential_force(
        &self,
        normal: &Vector3<f64>,
        v_t: &Vector3<f64>,
        factor: f64,
        normal_force: f64,
        effective_mass: f64,
        history: Option<&mut Vector3<f64>>,
    ) -> Vector3<f64> {
        let p = &self.params;
        let cone = FrictionCone::new(p.friction);
        let stiffness = factor * p.tangential_stiffness;
        let damping = -(v_t * (factor * p.tangential_damping * effective_mass));

        match self.friction_mode {
            FrictionMode::Frictionless => Vector3::zeros(),
            FrictionMode::SingleStep => {
                let trial = -(v_t * (self.step * stiffness)) + damping;
                cone.project(trial, normal_force)
            }
            FrictionMode::MultiStep => {
                let mut scratch = Vector3::zeros();
                let displacement = history.unwrap_or(&mut scratch);
                let mut s = rotate_into_plane(*displacement, normal) + v_t * self.step;

                let force = if stiffness > 0.0 {
                    let trial = -(s * stiffness) + damping;
                    if cone.contains(&trial, normal_force) {
                        trial
                    } else {
                        s = cone.clamp_displacement(s, stiffness, normal_force);
                        -(s * stiffness)
                    }
                } else {
                    s = Vector3::zeros();
                    cone.project(damping, normal_force)
                };
                *displacement = s;
                force
            }
        }
    }

    fn rolling_torque(
        &self,
        body_a: &BodyMotion,
        body_b: &BodyMotion,
        normal_force: f64,
        effective_mass: f64,
    ) -> Vector3<f64> {
        let omega = body_a.angular - body_b.angular;
        let speed = omega.norm();
        if speed < ROLLING_SPEED_EPSILON {
            return Vector3::zeros();
        }
        let r = self.radius;
        let coefficient = self.params.rolling_resistance;
        match self.rolling_mode {
            RollingMode::None => Vector3::zeros(),
            RollingMode::Viscous => -(omega * (coefficient * effective_mass * r * r)),
            RollingMode::Coulomb => {
                // Never more than what stops the relative spin within one step
                let stopping = INERTIA_FACTOR * effective_mass * r * r * speed / self.step;
                let magnitude = (coefficient * r * normal_force).min(stopping);
                -(omega * (magnitude / speed))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const R: f64 = 1000.0;

    fn params() -> ContactParams {
        ContactParams {
            normal_stiffness: 1e-3,
            normal_damping: 0.0,
            tangential_stiffness: 5e-4,
            tangential_damping: 0.0,
            friction: 0.5,
            rolling_resistance: 0.0,
            cohesion_force: 0.0,
        }
    }

    fn floor_contact(penetration: f64) -> ContactGeometry {
        ContactGeometry::sphere_surface(Vector3::z(), penetration, R, Vector3::zeros())
    }

    fn against_floor(
        model: &ContactModel,
        penetration: f64,
        sphere: &BodyMotion,
        history: Option<&mut Vector3<f64>>,
    ) -> ContactResponse {
        model.compute(
            &floor_contact(penetration),
            sphere,
            &BodyMotion::at_rest(),
            1.0,
            history,
        )
    }

    #[test]
    fn test_hooke_normal_force() {
        let model = ContactModel::new(params(), R, 1.0);
        let response = against_floor(&model, 10.0, &BodyMotion::at_rest(), None);
        assert_relative_eq!(response.force, Vector3::new(0.0, 0.0, 0.01), epsilon = 1e-15);
        assert_relative_eq!(response.normal_force, 0.01, max_relative = 1e-12);
        assert_relative_eq!(response.torque_a, Vector3::zeros());
    }

    #[test]
    fn test_hertz_scales_with_sqrt_penetration() {
        let model =
            ContactModel::new(params(), R, 1.0).with_normal_model(NormalContactModel::Hertz);
        let response = against_floor(&model, 10.0, &BodyMotion::at_rest(), None);
        let expected = 0.01 * (10.0_f64 / R).sqrt();
        assert_relative_eq!(response.normal_force, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_damping_opposes_approach_but_never_pulls() {
        let mut p = params();
        p.normal_damping = 0.1;
        let model = ContactModel::new(p, R, 1.0);

        let approaching = BodyMotion::translating(Vector3::new(0.0, 0.0, -1.0));
        let response = against_floor(&model, 10.0, &approaching, None);
        assert_relative_eq!(response.normal_force, 0.01 + 0.1, max_relative = 1e-12);

        let separating = BodyMotion::translating(Vector3::new(0.0, 0.0, 10.0));
        let response = against_floor(&model, 10.0, &separating, None);
        assert_eq!(response.normal_force, 0.0);
    }

    #[test]
    fn test_cohesion_pulls_along_normal() {
        let mut p = params();
        p.cohesion_force = 0.004;
        let model = ContactModel::new(p, R, 1.0);
        let response = against_floor(&model, 1.0, &BodyMotion::at_rest(), None);
        assert_relative_eq!(response.force.z, 0.001 - 0.004, max_relative = 1e-12);
    }

    #[test]
    fn test_frictionless_has_no_tangential_force() {
        let model = ContactModel::new(params(), R, 1.0);
        let sliding = BodyMotion::translating(Vector3::new(3.0, 0.0, 0.0));
        let response = against_floor(&model, 10.0, &sliding, None);
        assert_eq!(response.force.x, 0.0);
    }

    #[test]
    fn test_single_step_friction_opposes_sliding_and_is_capped() {
        let model =
            ContactModel::new(params(), R, 1.0).with_friction_mode(FrictionMode::SingleStep);
        let sliding = BodyMotion::translating(Vector3::new(100.0, 0.0, 0.0));
        let response = against_floor(&model, 10.0, &sliding, None);
        // Trial 5e-2 exceeds mu * F_n = 5e-3
        assert_relative_eq!(response.force.x, -0.005, max_relative = 1e-12);
        // Friction at the contact point spins the sphere
        assert!(response.torque_a.y.abs() > 0.0);
    }

    #[test]
    fn test_multi_step_history_accumulates_then_clamps() {
        let model =
            ContactModel::new(params(), R, 2.0).with_friction_mode(FrictionMode::MultiStep);
        let sliding = BodyMotion::translating(Vector3::new(1.0, 0.0, 0.0));
        let mut history = Vector3::zeros();

        let first = against_floor(&model, 10.0, &sliding, Some(&mut history));
        assert_relative_eq!(history, Vector3::new(2.0, 0.0, 0.0));
        assert_relative_eq!(first.force.x, -1e-3, max_relative = 1e-12);

        let second = against_floor(&model, 10.0, &sliding, Some(&mut history));
        assert_relative_eq!(history.x, 4.0);
        assert_relative_eq!(second.force.x, -2e-3, max_relative = 1e-12);

        // Keep sliding until the cone caps the force at mu F_n = 5e-3
        for _ in 0..10 {
            let _ = against_floor(&model, 10.0, &sliding, Some(&mut history));
        }
        assert_relative_eq!(history.x, 10.0, max_relative = 1e-12);
        let capped = against_floor(&model, 10.0, &sliding, Some(&mut history));
        assert_relative_eq!(capped.force.x, -0.005, max_relative = 1e-12);
    }

    #[test]
    fn test_multi_step_history_rotates_with_normal() {
        let model =
            ContactModel::new(params(), R, 1.0).with_friction_mode(FrictionMode::MultiStep);
        let mut history = Vector3::new(0.0, 0.0, 3.0);
        let _ = against_floor(&model, 10.0, &BodyMotion::at_rest(), Some(&mut history));
        // A purely normal displacement has no tangential part to keep
        assert_eq!(history, Vector3::zeros());
    }

    #[test]
    fn test_viscous_rolling_opposes_spin() {
        let mut p = params();
        p.rolling_resistance = 1e-3;
        let model = ContactModel::new(p, R, 1.0).with_rolling_mode(RollingMode::Viscous);
        let spinning = BodyMotion::new(Vector3::zeros(), Vector3::new(0.0, 1e-4, 0.0));
        let response = against_floor(&model, 10.0, &spinning, None);
        assert_relative_eq!(response.torque_a.y, -1e-3 * R * R * 1e-4, max_relative = 1e-12);
        assert_relative_eq!(response.torque_b.y, -response.torque_a.y);
    }

    #[test]
    fn test_coulomb_rolling_bounded_by_stopping_torque() {
        let mut p = params();
        p.rolling_resistance = 0.1;
        let model = ContactModel::new(p, R, 1.0).with_rolling_mode(RollingMode::Coulomb);

        let fast = BodyMotion::new(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let response = against_floor(&model, 10.0, &fast, None);
        assert_relative_eq!(response.torque_a.x, -0.1 * R * 0.01, max_relative = 1e-12);

        let slow = BodyMotion::new(Vector3::zeros(), Vector3::new(1e-12, 0.0, 0.0));
        let response = against_floor(&model, 10.0, &slow, None);
        assert_relative_eq!(response.torque_a.x, -0.4 * R * R * 1e-12, max_relative = 1e-9);
    }
}
