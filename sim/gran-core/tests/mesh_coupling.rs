//! Two-way coupling with rigid mesh families: poses in, generalized forces out.

use std::fs;

use approx::assert_relative_eq;
use gran_core::{GranularSystem, MeshSoup, Partner, SimError, SphereId, Triangle};
use gran_types::GranularConfig;
use nalgebra::{Point3, Vector3};
use tempfile::tempdir;

fn sphere_weight() -> f64 {
    4.0 / 3.0 * std::f64::consts::PI * 0.125 * 2.5 * 980.0
}

/// An 8 x 8 square in the family's z = 0 plane, facing +z.
fn square() -> Vec<Triangle> {
    let a = Point3::new(-4.0, -4.0, 0.0);
    let b = Point3::new(4.0, -4.0, 0.0);
    let c = Point3::new(4.0, 4.0, 0.0);
    let d = Point3::new(-4.0, 4.0, 0.0);
    vec![[a, b, c], [a, c, d]]
}

fn unit_scale() -> Vector3<f64> {
    Vector3::repeat(1.0)
}

/// Identity orientation at height `z`.
fn pose_at(z: f64) -> [f64; 7] {
    [0.0, 0.0, z, 1.0, 0.0, 0.0, 0.0]
}

fn system_over_square(sphere: Point3<f64>) -> GranularSystem {
    let config = GranularConfig::new(0.5, 2.5, Vector3::new(10.0, 10.0, 10.0)).timestep(1e-4);
    let mut system = GranularSystem::new(config).expect("valid config");
    system.set_particle_positions(vec![sphere]).expect("positions");
    let soup =
        MeshSoup::new(vec![square()], &[unit_scale()], &[1e6], &[false], &[0.0]).expect("soup");
    system.load_mesh_soup(soup).expect("load soup");
    system.initialize().expect("initialize");
    system
        .apply_rigid_body_motion(&pose_at(-2.0), &[0.0; 6])
        .expect("pose");
    system
}

/// A sphere resting on the square pushes it down with its weight and,
/// off-center, twists it about the family origin.
#[test]
fn resting_sphere_loads_mesh() {
    let mut system = system_over_square(Point3::new(0.5, 0.0, -1.0));
    assert_eq!(system.mesh_family_count(), 1);
    assert_eq!(system.triangle_count(), 2);

    system.advance_simulation(0.2).unwrap();
    assert_relative_eq!(system.positions()[0].z, -1.5, epsilon = 1e-2);
    assert!(system.last_step_stats().mesh_contacts >= 1);

    let mut out = [0.0; 6];
    system.collect_generalized_forces(&mut out).unwrap();
    let w = sphere_weight();
    assert_relative_eq!(out[2], -w, max_relative = 1e-2);
    assert_relative_eq!(out[0], 0.0, epsilon = 1e-6);
    assert_relative_eq!(out[1], 0.0, epsilon = 1e-6);
    // Lever arm of 0.5 along x
    assert_relative_eq!(out[4], 0.5 * w, max_relative = 2e-2);

    // Collection clears the accumulators
    let mut again = [0.0; 6];
    system.collect_generalized_forces(&mut again).unwrap();
    assert_eq!(again, [0.0; 6]);

    let partners = system.contact_partners(SphereId::new(0));
    assert!(partners.iter().all(|p| matches!(p, Partner::Triangle(_))));
}

/// Turning mesh collision off lets spheres fall through.
#[test]
fn disabled_mesh_is_ignored() {
    let mut system = system_over_square(Point3::new(0.5, 0.0, -1.0));
    system.set_mesh_collision(false);
    system.advance_simulation(0.2).unwrap();
    assert!(system.max_z().unwrap() < -2.5);
    assert_eq!(system.last_step_stats().mesh_contacts, 0);

    let mut out = [0.0; 6];
    system.collect_generalized_forces(&mut out).unwrap();
    assert_eq!(out, [0.0; 6]);
}

/// Raising the square lifts the sphere resting on it.
#[test]
fn moving_mesh_carries_sphere() {
    let mut system = system_over_square(Point3::new(0.0, 0.0, -1.0));
    system.advance_simulation(0.1).unwrap();
    let resting = system.positions()[0].z;

    // Lift by 1 cm in small increments at 10 cm/s
    let mut z = -2.0;
    for _ in 0..100 {
        z += 0.01;
        system
            .apply_rigid_body_motion(&pose_at(z), &[0.0, 0.0, 10.0, 0.0, 0.0, 0.0])
            .unwrap();
        system.advance_simulation(1e-3).unwrap();
    }
    system
        .apply_rigid_body_motion(&pose_at(z), &[0.0; 6])
        .unwrap();
    system.advance_simulation(0.1).unwrap();
    assert_relative_eq!(system.positions()[0].z, resting + 1.0, epsilon = 2e-2);
}

/// Poses and twists must match the family count.
#[test]
fn exchange_lengths_checked() {
    let mut system = system_over_square(Point3::new(0.0, 0.0, 0.0));
    let err = system
        .apply_rigid_body_motion(&[0.0; 6], &[0.0; 6])
        .unwrap_err();
    assert!(matches!(err, SimError::MismatchedLengths { .. }));

    let err = system
        .apply_rigid_body_motion(&pose_at(0.0), &[0.0; 5])
        .unwrap_err();
    assert!(matches!(err, SimError::MismatchedLengths { .. }));

    let mut short = [0.0; 5];
    assert!(matches!(
        system.collect_generalized_forces(&mut short),
        Err(SimError::MismatchedLengths {
            expected: 6,
            actual: 5,
            ..
        })
    ));
}

/// Degenerate poses and twists are rejected and the mesh stays where it was.
#[test]
fn degenerate_motion_rejected() {
    let mut system = system_over_square(Point3::new(0.5, 0.0, -1.0));

    let zero_quaternion = [0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0];
    let err = system
        .apply_rigid_body_motion(&zero_quaternion, &[0.0; 6])
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidConfig { .. }));

    let nan_pose = [0.0, f64::NAN, -1.0, 1.0, 0.0, 0.0, 0.0];
    assert!(system.apply_rigid_body_motion(&nan_pose, &[0.0; 6]).is_err());
    let inf_twist = [0.0, 0.0, f64::INFINITY, 0.0, 0.0, 0.0];
    assert!(system.apply_rigid_body_motion(&pose_at(-1.0), &inf_twist).is_err());
    assert!(!system.is_poisoned());

    for vertex in system.mesh_triangles().iter().flatten() {
        assert_relative_eq!(vertex.z, -2.0, epsilon = 1e-6);
    }
    // The square still carries the sphere
    system.advance_simulation(0.2).unwrap();
    assert_relative_eq!(system.positions()[0].z, -1.5, epsilon = 1e-2);
    assert!(system.last_step_stats().mesh_contacts >= 1);
}

const HALF_SQUARE_OBJ: &str = "\
# 1 x 1 square facing +z, scaled up on load
v -0.5 -0.5 0
v 0.5 -0.5 0
v 0.5 0.5 0
v -0.5 0.5 0
f 1 2 3 4
";

/// Families loaded from files are scaled per family before use.
#[test]
fn mesh_files_loaded_with_scaling() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("square.obj");
    fs::write(&path, HALF_SQUARE_OBJ).unwrap();

    let scale = [Vector3::new(8.0, 8.0, 1.0)];
    let soup = MeshSoup::from_files(&[&path], &scale, &[1e6], &[false], &[0.0]).unwrap();
    assert_eq!(soup.family_count(), 1);
    assert_eq!(soup.triangle_count(), 2);

    let config = GranularConfig::new(0.5, 2.5, Vector3::new(10.0, 10.0, 10.0)).timestep(1e-4);
    let mut system = GranularSystem::new(config).unwrap();
    system
        .set_particle_positions(vec![Point3::new(3.5, -3.5, -1.0)])
        .unwrap();
    system
        .load_meshes(&[&path], &scale, &[1e6], &[false], &[0.0])
        .unwrap();
    system.initialize().unwrap();
    assert_eq!(system.triangle_count(), 2);
    assert_eq!(
        system
            .load_meshes(&[&path], &scale, &[1e6], &[false], &[0.0])
            .unwrap_err(),
        SimError::AlreadyInitialized
    );
    system
        .apply_rigid_body_motion(&pose_at(-2.0), &[0.0; 6])
        .unwrap();

    let xs: Vec<f64> = system.mesh_triangles().iter().flatten().map(|v| v.x).collect();
    let max_x = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(max_x, 4.0, epsilon = 1e-6);

    // Near the scaled corner, well outside the unscaled square
    system.advance_simulation(0.2).unwrap();
    assert_relative_eq!(system.positions()[0].z, -1.5, epsilon = 1e-2);
}

/// The per-family arrays are checked against the file list before any
/// file is read, and unreadable files surface as mesh file errors.
#[test]
fn mesh_file_list_errors() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("square.obj");
    fs::write(&good, HALF_SQUARE_OBJ).unwrap();
    let missing = dir.path().join("missing.obj");
    let unknown = dir.path().join("square.dae");
    fs::write(&unknown, HALF_SQUARE_OBJ).unwrap();

    let scale = [unit_scale()];
    let err = MeshSoup::from_files(&[&missing, &good], &scale, &[1.0], &[false], &[0.0])
        .unwrap_err();
    assert_eq!(err, SimError::mismatched_lengths("mesh scalings", 2, 1));

    let err = MeshSoup::from_files(&[&good], &scale, &[1.0, 2.0], &[false], &[0.0])
        .unwrap_err();
    assert_eq!(err, SimError::mismatched_lengths("mesh masses", 1, 2));

    for path in [&missing, &unknown] {
        let err = MeshSoup::from_files(&[path], &scale, &[1.0], &[false], &[0.0]).unwrap_err();
        assert!(matches!(err, SimError::MeshFile { .. }), "{err}");
        assert!(err.is_config_error());
    }

    let broken = dir.path().join("broken.obj");
    fs::write(&broken, "v 0 0 0\nf 1 2 3\n").unwrap();
    let err = MeshSoup::from_files(&[&broken], &scale, &[1.0], &[false], &[0.0]).unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");
}

/// Soup arrays must agree on the family count.
#[test]
fn soup_lengths_checked() {
    let scales = [unit_scale(); 2];
    let err = MeshSoup::new(
        vec![square(), square()],
        &scales,
        &[1.0],
        &[false, false],
        &[0.0, 0.0],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SimError::MismatchedLengths {
            expected: 2,
            actual: 1,
            ..
        }
    ));

    let err = MeshSoup::new(
        vec![square(), square()],
        &scales[..1],
        &[1.0, 1.0],
        &[false, false],
        &[0.0, 0.0],
    )
    .unwrap_err();
    assert_eq!(err, SimError::mismatched_lengths("mesh scalings", 2, 1));
}

#[test]
fn mesh_loading_closed_after_initialize() {
    let mut system = system_over_square(Point3::origin());
    let soup = MeshSoup::new(vec![square()], &[unit_scale()], &[1.0], &[false], &[0.0]).unwrap();
    assert_eq!(
        system.load_mesh_soup(soup).unwrap_err(),
        SimError::AlreadyInitialized
    );
}

#[test]
fn world_triangles_follow_pose() {
    let system = system_over_square(Point3::origin());
    let triangles = system.mesh_triangles();
    assert_eq!(triangles.len(), 2);
    for vertex in triangles.iter().flatten() {
        assert_relative_eq!(vertex.z, -2.0, epsilon = 1e-6);
    }
}
