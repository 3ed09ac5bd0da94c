//! Step pipeline: resolve contacts, release stale slots, integrate, rebuild.
//!
//! ```text
//!  frame offset(t) ──► clear reactions ──► bin triangles
//!        │
//!        ▼
//!  resolve (per SD, parallel) ──► fatal? ──► poison + Err
//!        │
//!        ▼
//!  release unclaimed slots ──► integrate (per sphere, parallel)
//!        │
//!        ▼
//!  t += dt ──► rebuild SD membership at offset(t + dt)
//! ```
//!
//! Any fatal condition raised inside a kernel is collected at the kernel
//! boundary, logged, and poisons the system: every later call returns
//! [`SimError::Poisoned`].

use gran_types::{GranularConfig, SimError};
use rayon::prelude::*;
use tracing::{debug, error, trace};

use crate::boundary::BoundarySet;
use crate::broad_phase::TriangleMembership;
use crate::integrators::{advance_angular, integrate_with_method};
use crate::resolve::ResolveContext;
use crate::world::{Engine, GranularSystem, frame_offset};

/// Slack when converting a duration into a whole number of steps.
const STEP_COUNT_TOLERANCE: f64 = 1e-9;

/// Counters describing one completed step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Index of the step, starting at 1.
    pub step: u64,
    /// Sphere-sphere contacts resolved.
    pub sphere_contacts: usize,
    /// Sphere-wall contacts resolved.
    pub wall_contacts: usize,
    /// Sphere-boundary contacts resolved.
    pub boundary_contacts: usize,
    /// Sphere-triangle contacts resolved.
    pub mesh_contacts: usize,
    /// Contact slots released at the end of the step.
    pub released_slots: usize,
    /// Largest SD member count after the rebuild.
    pub max_occupancy: u32,
}

impl StepStats {
    /// Total contacts of every kind.
    #[must_use]
    pub fn total_contacts(&self) -> usize {
        self.sphere_contacts + self.wall_contacts + self.boundary_contacts + self.mesh_contacts
    }
}

impl Engine {
    /// Runs one step starting at time `t`.
    fn step(
        &mut self,
        config: &GranularConfig,
        boundaries: &BoundarySet,
        t: f64,
    ) -> gran_types::Result<StepStats> {
        let motion = &config.frame_motion;
        let offset = frame_offset(motion, t, &self.units);
        let frame_velocity = self.units.velocity_to_su(&motion.velocity(t));

        boundaries.clear_reactions();
        if let Some(mesh) = self.mesh.as_ref() {
            mesh.clear_reactions();
        }
        let mesh = match self.mesh.as_ref() {
            Some(mesh) if mesh.is_enabled() => {
                self.triangle_bins =
                    TriangleMembership::build(self.partition.grid(), &mesh.broad_bounds(offset));
                Some((mesh, &self.triangle_bins))
            }
            _ => None,
        };

        ResolveContext {
            grid: self.partition.grid(),
            radius: self.partition.radius(),
            offset,
            frame_velocity,
            spheres: &self.spheres,
            membership: &self.membership,
            table: &self.table,
            partners: self.partners,
            models: &self.models,
            boundaries,
            mesh,
            forces: &self.forces,
            fatal: &self.fatal,
            counters: &self.counters,
        }
        .run();
        if let Some(err) = self.fatal.take() {
            return Err(err);
        }
        let (sphere_contacts, wall_contacts, boundary_contacts, mesh_contacts) =
            self.counters.take();

        let released_slots = self.table.end_step();
        self.integrate(config);

        let next = frame_offset(motion, t + config.timestep, &self.units);
        self.membership.rebuild(
            self.partition.grid(),
            &self.spheres.positions,
            next,
            self.partition.radius(),
        )?;
        self.offset = next;

        Ok(StepStats {
            step: 0,
            sphere_contacts,
            wall_contacts,
            boundary_contacts,
            mesh_contacts,
            released_slots,
            max_occupancy: self.membership.max_occupancy(),
        })
    }

    /// Applies accumulated forces and gravity to every sphere.
    fn integrate(&mut self, config: &GranularConfig) {
        let h = self.units.step_ticks();
        let method = config.integrator;
        let gravity = self.gravity;
        let forces = &self.forces;
        let first_step = !self.spheres.has_previous;
        let state = &mut self.spheres;

        (
            state.positions.par_iter_mut(),
            state.velocities.par_iter_mut(),
            state.angular_velocities.par_iter_mut(),
            state.previous_accelerations.par_iter_mut(),
        )
            .into_par_iter()
            .enumerate()
            .for_each(|(i, (x, v, omega, a_prev))| {
                let (linear, angular) = forces.take(i);
                let a: [i64; 3] = std::array::from_fn(|k| linear[k] + gravity[k]);
                let previous = if first_step { a } else { *a_prev };
                integrate_with_method(method, x, v, a, previous, h);
                *a_prev = a;
                advance_angular(omega, angular, h);
            });
        state.has_previous = true;
    }
}

impl GranularSystem {
    /// Advances the system by one time step.
    ///
    /// # Errors
    ///
    /// [`SimError::NotInitialized`] before [`initialize`](Self::initialize),
    /// [`SimError::Poisoned`] after a fatal condition, and the fatal
    /// condition itself ([`SimError::ContactTableFull`],
    /// [`SimError::SubdomainOverflow`]) on the step that hit it.
    pub fn step(&mut self) -> gran_types::Result<StepStats> {
        if let Some(cause) = &self.poisoned {
            return Err(SimError::Poisoned {
                cause: cause.clone(),
            });
        }
        let engine = self.engine.as_mut().ok_or(SimError::NotInitialized)?;
        match engine.step(&self.config, &self.boundaries, self.time) {
            Ok(mut stats) => {
                self.steps_taken += 1;
                self.time += self.config.timestep;
                stats.step = self.steps_taken;
                trace!(
                    step = stats.step,
                    contacts = stats.total_contacts(),
                    released = stats.released_slots,
                    "step complete"
                );
                self.last_stats = stats;
                Ok(stats)
            }
            Err(err) => {
                error!(
                    error = %err,
                    step = self.steps_taken + 1,
                    time = self.time,
                    "fatal condition, halting granular system"
                );
                self.poisoned = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Advances by `duration` user time, as a whole number of steps.
    ///
    /// Returns the number of steps taken.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidTimestep`] for a negative or non-finite duration,
    /// otherwise whatever [`step`](Self::step) returns.
    pub fn advance_simulation(&mut self, duration: f64) -> gran_types::Result<usize> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(SimError::InvalidTimestep(duration));
        }
        let steps = (duration / self.config.timestep - STEP_COUNT_TOLERANCE)
            .ceil()
            .max(0.0) as usize;
        debug!(steps, duration, t = self.time, "advancing simulation");
        for _ in 0..steps {
            self.step()?;
        }
        Ok(steps)
    }
}
