//! Benchmarks for granular stepping throughput.
//!
//! Run with: `cargo bench -p gran-core`
//!
//! Measures full steps (resolve, integrate, rebuild) and the broadphase
//! rebuild alone for HCP packings of growing size.

#![allow(missing_docs, clippy::unwrap_used, clippy::cast_possible_truncation)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use gran_core::GranularSystem;
use gran_core::broad_phase::SdMembership;
use gran_core::sampling::HcpSampler;
use gran_types::GranularConfig;
use nalgebra::{Point3, Vector3};

/// A packing resting near the floor of a 20 cm box.
fn packed_system(half_extent: f64) -> GranularSystem {
    let config = GranularConfig::new(0.5, 2.5, Vector3::new(20.0, 20.0, 20.0)).timestep(1e-4);
    let mut system = GranularSystem::new(config).unwrap();
    let center = Point3::new(0.0, 0.0, -9.0 + half_extent);
    let positions = HcpSampler::new(1.2).sample_box(center, Vector3::repeat(half_extent));
    system.set_particle_positions(positions).unwrap();
    system.initialize().unwrap();
    // Let the bottom layers make contact
    system.advance_simulation(0.02).unwrap();
    system
}

fn bench_step(c: &mut Criterion) {
    let steps_per_iter = 10;
    let mut group = c.benchmark_group("granular_step");

    for &half in &[2.0, 4.0, 7.0] {
        let mut system = packed_system(half);
        let n = system.n_spheres();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                for _ in 0..steps_per_iter {
                    system.step().unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadphase_rebuild");

    for &half in &[2.0, 4.0, 7.0] {
        let system = packed_system(half);
        let grid = system.grid().unwrap().clone();
        let radius = system.radius_su().unwrap();
        let positions = system.positions_su().to_vec();
        let mut membership = SdMembership::new(grid.count(), positions.len());

        group.bench_with_input(
            BenchmarkId::from_parameter(positions.len()),
            &positions,
            |b, positions| {
                b.iter(|| membership.rebuild(&grid, positions, [0; 3], radius).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_step, bench_rebuild);
criterion_main!(benches);
