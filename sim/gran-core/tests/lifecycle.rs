//! System lifecycle: setup ordering, initialization errors, stepping, free fall.

use approx::assert_relative_eq;
use gran_core::{GranularSystem, SimError};
use gran_types::GranularConfig;
use nalgebra::{Point3, Vector3};

fn small_box() -> GranularConfig {
    GranularConfig::new(0.5, 2.5, Vector3::new(10.0, 10.0, 10.0)).timestep(1e-5)
}

fn single_sphere(config: GranularConfig) -> GranularSystem {
    let mut system = GranularSystem::new(config).expect("valid config");
    system
        .set_particle_positions(vec![Point3::new(0.3, -0.7, 0.0)])
        .expect("positions");
    system.initialize().expect("initialize");
    system
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn step_before_initialize_fails() {
    let mut system = GranularSystem::new(small_box()).unwrap();
    assert_eq!(system.step().unwrap_err(), SimError::NotInitialized);
    assert_eq!(
        system.advance_simulation(1e-3).unwrap_err(),
        SimError::NotInitialized
    );
    assert!(system.bc_reaction_force(gran_types::BoundaryId::new(0)).is_err());
}

#[test]
fn initialize_only_once() {
    let mut system = single_sphere(small_box());
    assert!(system.is_initialized());
    assert_eq!(system.initialize().unwrap_err(), SimError::AlreadyInitialized);
    assert_eq!(
        system
            .set_particle_positions(vec![Point3::origin()])
            .unwrap_err(),
        SimError::AlreadyInitialized
    );
}

#[test]
fn invalid_config_rejected_up_front() {
    let config = small_box().timestep(-1.0);
    assert!(matches!(
        GranularSystem::new(config),
        Err(SimError::InvalidTimestep(_))
    ));
}

#[test]
fn velocities_need_one_per_sphere() {
    let mut system = single_sphere(small_box());
    let err = system
        .set_particle_velocities(&[Vector3::zeros(), Vector3::zeros()])
        .unwrap_err();
    assert!(matches!(
        err,
        SimError::MismatchedLengths {
            expected: 1,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn velocities_settable_after_initialize() {
    let mut system = single_sphere(small_box().zero_gravity());
    system
        .set_particle_velocities(&[Vector3::new(5.0, 0.0, 0.0)])
        .unwrap();
    assert_relative_eq!(system.velocities()[0].x, 5.0, max_relative = 1e-4);

    system.advance_simulation(0.01).unwrap();
    // Coasting at 5 cm/s for 0.01 s
    assert_relative_eq!(system.positions()[0].x, 0.35, epsilon = 1e-4);
}

#[test]
fn negative_duration_rejected() {
    let mut system = single_sphere(small_box());
    assert!(matches!(
        system.advance_simulation(-1.0),
        Err(SimError::InvalidTimestep(_))
    ));
    assert_eq!(system.advance_simulation(0.0).unwrap(), 0);
}

// ============================================================================
// Domain checks
// ============================================================================

#[test]
fn strict_domain_rejects_outside_spheres() {
    let mut system = GranularSystem::new(small_box().strict_domain()).unwrap();
    system
        .set_particle_positions(vec![Point3::origin(), Point3::new(100.0, 0.0, 0.0)])
        .unwrap();
    let err = system.initialize().unwrap_err();
    assert!(err.is_config_error(), "unexpected error {err:?}");
    assert!(!system.is_initialized());
}

#[test]
fn permissive_domain_accepts_outside_spheres() {
    let mut system = GranularSystem::new(small_box()).unwrap();
    system
        .set_particle_positions(vec![Point3::new(100.0, 1.2, 1.2)])
        .unwrap();
    system.initialize().unwrap();
    // Clamped into the last SD along x
    assert_eq!(system.touched_counts(), &[1]);
}

#[test]
fn packed_subdomain_overflows_at_initialize() {
    let mut system = GranularSystem::new(small_box()).unwrap();
    system
        .set_particle_positions(vec![Point3::new(1.0, 1.0, 1.0); 300])
        .unwrap();
    let err = system.initialize().unwrap_err();
    assert!(matches!(
        err,
        SimError::SubdomainOverflow { capacity: 256, .. }
    ));
    assert!(err.is_fatal());
}

#[test]
fn empty_system_steps() {
    let mut system = GranularSystem::new(small_box()).unwrap();
    system.initialize().unwrap();
    assert_eq!(system.n_spheres(), 0);
    assert_eq!(system.advance_simulation(1e-4).unwrap(), 10);
    assert_eq!(system.max_z(), None);
}

// ============================================================================
// Stepping
// ============================================================================

#[test]
fn advance_counts_whole_steps() {
    let mut system = single_sphere(small_box());
    assert_eq!(system.advance_simulation(1e-3).unwrap(), 100);
    assert_relative_eq!(system.time(), 1e-3, max_relative = 1e-9);
    assert_eq!(system.last_step_stats().step, 100);

    // A partial step rounds up
    assert_eq!(system.advance_simulation(1.5e-5).unwrap(), 2);
}

#[test]
fn free_fall_matches_gravity() {
    let mut system = single_sphere(small_box());
    system.advance_simulation(0.01).unwrap();

    let v = system.velocities()[0];
    assert_relative_eq!(v.z, -9.8, max_relative = 1e-3);
    assert_relative_eq!(v.x, 0.0);
    assert_relative_eq!(v.y, 0.0);

    let p = system.positions()[0];
    assert_relative_eq!(p.z, -0.049, epsilon = 1e-3);
    assert_relative_eq!(p.x, 0.3, epsilon = 1e-5);
    assert_eq!(system.last_step_stats().total_contacts(), 0);
}

#[test]
fn integrators_agree_in_free_fall() {
    use gran_types::IntegrationMethod;

    let mut heights = Vec::new();
    for method in [
        IntegrationMethod::ForwardEuler,
        IntegrationMethod::ExtendedTaylor,
        IntegrationMethod::Chung,
    ] {
        let mut system = single_sphere(small_box().integrator(method));
        system.advance_simulation(0.01).unwrap();
        heights.push(system.positions()[0].z);
    }
    for z in &heights {
        assert_relative_eq!(*z, -0.049, epsilon = 1e-3);
    }
}

#[test]
fn angular_velocity_starts_at_rest() {
    let mut system = single_sphere(small_box());
    system.advance_simulation(1e-4).unwrap();
    assert_eq!(system.angular_velocities(), vec![Vector3::zeros()]);
}
