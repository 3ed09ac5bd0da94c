//! Contact resolution kernel: one unit of parallel work per sub-domain.
//!
//! Each SD loads its member list and resolves:
//!
//! - sphere-sphere pairs whose midpoint this SD owns,
//! - sphere-wall and sphere-boundary contacts of spheres whose center this
//!   SD owns,
//! - sphere-triangle contacts whose contact point this SD owns.
//!
//! The ownership rules give every contact exactly one resolving SD even
//! though a sphere can be a member of up to eight. Forces go into the
//! shared accumulators through integer atomic adds.

use std::sync::atomic::{AtomicUsize, Ordering};

use gran_contact::{BodyMotion, ContactGeometry, ContactModel, ContactResponse, ContactTable, PartnerSpace};
use gran_spatial::{SdIndex, SubdomainGrid};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::boundary::BoundarySet;
use crate::broad_phase::{SdMembership, TriangleMembership, to_local};
use crate::mesh::MeshState;
use crate::state::{FatalFlag, ForceAccumulator, SphereState};

/// Effective mass of two unit-mass spheres.
const SPHERE_PAIR_MASS: f64 = 0.5;

/// Effective mass against an immovable wall or boundary.
const FIXED_PARTNER_MASS: f64 = 1.0;

/// The three contact models of a system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactModels {
    /// Sphere against sphere.
    pub sphere_sphere: ContactModel,
    /// Sphere against box walls and boundary conditions.
    pub sphere_wall: ContactModel,
    /// Sphere against mesh triangles.
    pub sphere_mesh: ContactModel,
}

/// Contacts resolved during one step, by partner kind.
#[derive(Debug, Default)]
pub struct ContactCounters {
    pub(crate) spheres: AtomicUsize,
    pub(crate) walls: AtomicUsize,
    pub(crate) boundaries: AtomicUsize,
    pub(crate) triangles: AtomicUsize,
}

impl ContactCounters {
    /// `(spheres, walls, boundaries, triangles)` and reset to zero.
    pub fn take(&self) -> (usize, usize, usize, usize) {
        (
            self.spheres.swap(0, Ordering::Relaxed),
            self.walls.swap(0, Ordering::Relaxed),
            self.boundaries.swap(0, Ordering::Relaxed),
            self.triangles.swap(0, Ordering::Relaxed),
        )
    }
}

/// Everything the kernel reads or writes during one step.
pub struct ResolveContext<'a> {
    /// Sub-domain grid.
    pub grid: &'a SubdomainGrid,
    /// Sphere radius in SU.
    pub radius: i64,
    /// Big-domain frame offset in SU.
    pub offset: [i64; 3],
    /// Big-domain frame velocity in SU per tick.
    pub frame_velocity: Vector3<f64>,
    /// Sphere state.
    pub spheres: &'a SphereState,
    /// SD membership from the last rebuild.
    pub membership: &'a SdMembership,
    /// Persistent contact slots.
    pub table: &'a ContactTable,
    /// Partner id layout.
    pub partners: PartnerSpace,
    /// Contact models.
    pub models: &'a ContactModels,
    /// Boundary conditions.
    pub boundaries: &'a BoundarySet,
    /// Mesh and its SD bins, when mesh collision is on.
    pub mesh: Option<(&'a MeshState, &'a TriangleMembership)>,
    /// Force accumulators.
    pub forces: &'a ForceAccumulator,
    /// Fatal condition sink.
    pub fatal: &'a FatalFlag,
    /// Contact counters.
    pub counters: &'a ContactCounters,
}

impl ResolveContext<'_> {
    /// Resolves every sub-domain in parallel.
    pub fn run(&self) {
        (0..self.grid.count())
            .into_par_iter()
            .for_each(|sd| self.resolve_subdomain(sd));
    }

    fn resolve_subdomain(&self, sd: u32) {
        if self.fatal.is_raised() {
            return;
        }
        let members = self.membership.members(sd);
        let sd = SdIndex::new(sd);

        self.sphere_pairs(sd, &members);
        for &sphere in &members {
            if self.owner_of(self.spheres.positions[sphere as usize]) == sd {
                self.walls(sphere);
                self.boundaries(sphere);
            }
        }
        if let Some((mesh, bins)) = self.mesh {
            self.triangles(sd, &members, mesh, bins);
        }
    }

    fn owner_of(&self, world: [i64; 3]) -> SdIndex {
        self.grid.owner(to_local(world, self.offset))
    }

    fn motion(&self, sphere: u32) -> BodyMotion {
        let i = sphere as usize;
        BodyMotion::new(
            self.spheres.linear_velocity(i),
            self.spheres.angular_velocity(i),
        )
    }

    fn center(&self, sphere: u32) -> Point3<f64> {
        let p = self.spheres.positions[sphere as usize];
        Point3::new(p[0] as f64, p[1] as f64, p[2] as f64)
    }

    /// Claims the slot of `(sphere, partner)` and evaluates `model` with its history.
    fn evaluate(
        &self,
        sphere: u32,
        partner: u32,
        model: &ContactModel,
        geometry: &ContactGeometry,
        other: &BodyMotion,
        effective_mass: f64,
    ) -> Option<ContactResponse> {
        let slot = match self.table.claim(sphere, partner) {
            Ok(slot) => slot,
            Err(err) => {
                self.fatal.raise(err);
                return None;
            }
        };
        let own = self.motion(sphere);
        if model.friction_mode().tracks_history() {
            let mut history = self.table.history(slot);
            let response = model.compute(geometry, &own, other, effective_mass, Some(&mut history));
            self.table.set_history(slot, &history);
            Some(response)
        } else {
            Some(model.compute(geometry, &own, other, effective_mass, None))
        }
    }

    fn apply_to_sphere(&self, sphere: u32, response: &ContactResponse) -> [i64; 3] {
        let i = sphere as usize;
        let q = ForceAccumulator::quantize_force(&response.force);
        self.forces.add_linear(i, q);
        self.forces
            .add_angular(i, self.forces.quantize_torque(&response.torque_a));
        q
    }

    fn sphere_pairs(&self, sd: SdIndex, members: &[u32]) {
        let positions = &self.spheres.positions;
        for (k, &a) in members.iter().enumerate() {
            for &b in &members[k + 1..] {
                let (pa, pb) = (positions[a as usize], positions[b as usize]);
                let Some(geometry) = ContactGeometry::sphere_sphere(pa, pb, self.radius) else {
                    continue;
                };
                let midpoint = std::array::from_fn(|axis| (pa[axis] + pb[axis]).div_euclid(2));
                if self.owner_of(midpoint) != sd {
                    continue;
                }
                let other = self.motion(b);
                let Some(response) = self.evaluate(
                    a,
                    self.partners.sphere(b),
                    &self.models.sphere_sphere,
                    &geometry,
                    &other,
                    SPHERE_PAIR_MASS,
                ) else {
                    return;
                };
                let q = self.apply_to_sphere(a, &response);
                self.forces.sub_linear(b as usize, q);
                self.forces
                    .add_angular(b as usize, self.forces.quantize_torque(&response.torque_b));
                self.counters.spheres.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn walls(&self, sphere: u32) {
        let local = to_local(self.spheres.positions[sphere as usize], self.offset);
        let min = self.grid.min_corner();
        let max = self.grid.max_corner();
        let wall = BodyMotion::translating(self.frame_velocity);

        for axis in 0..3 {
            let faces = [
                (local[axis] - min[axis], Vector3::ith(axis, 1.0)),
                (max[axis] - local[axis], -Vector3::ith(axis, 1.0)),
            ];
            for (side, (gap, normal)) in faces.into_iter().enumerate() {
                if gap >= self.radius {
                    continue;
                }
                let geometry = ContactGeometry::sphere_surface(
                    normal,
                    (self.radius - gap) as f64,
                    self.radius as f64,
                    Vector3::zeros(),
                );
                let face = (2 * axis + side) as u32;
                let Some(response) = self.evaluate(
                    sphere,
                    self.partners.wall(face),
                    &self.models.sphere_wall,
                    &geometry,
                    &wall,
                    FIXED_PARTNER_MASS,
                ) else {
                    return;
                };
                self.apply_to_sphere(sphere, &response);
                self.counters.walls.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn boundaries(&self, sphere: u32) {
        let center = self.center(sphere);
        let radius = self.radius as f64;
        let at_rest = BodyMotion::at_rest();

        for (index, boundary) in self.boundaries.iter() {
            if !boundary.is_active() {
                continue;
            }
            let Some(contact) = boundary
                .scaled_shape()
                .and_then(|shape| shape.contact(&center, radius))
            else {
                continue;
            };
            let geometry = ContactGeometry::sphere_surface(
                contact.normal,
                contact.penetration,
                radius,
                Vector3::zeros(),
            );
            let Some(response) = self.evaluate(
                sphere,
                self.partners.boundary(index),
                &self.models.sphere_wall,
                &geometry,
                &at_rest,
                FIXED_PARTNER_MASS,
            ) else {
                return;
            };
            let q = self.apply_to_sphere(sphere, &response);
            boundary.add_reaction(q.map(|v| -v));
            self.counters.boundaries.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn triangles(&self, sd: SdIndex, members: &[u32], mesh: &MeshState, bins: &TriangleMembership) {
        let radius = self.radius as f64;
        for &triangle in bins.triangles(sd) {
            let t = triangle as usize;
            for &sphere in members {
                let center = self.center(sphere);
                let Some(contact) = mesh.sphere_contact(t, &center, radius) else {
                    continue;
                };
                let point = contact.point.coords.map(|x| x.round() as i64);
                if self.owner_of([point.x, point.y, point.z]) != sd {
                    continue;
                }
                let geometry = ContactGeometry::sphere_surface(
                    contact.normal,
                    contact.penetration,
                    radius,
                    contact.arm,
                );
                let (linear, angular) = mesh.family_motion(t);
                let Some(response) = self.evaluate(
                    sphere,
                    self.partners.triangle(triangle),
                    &self.models.sphere_mesh,
                    &geometry,
                    &BodyMotion::new(linear, angular),
                    mesh.effective_mass(t),
                ) else {
                    return;
                };
                self.apply_to_sphere(sphere, &response);
                mesh.add_reaction(t, &(-response.force), &response.torque_b);
                self.counters.triangles.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use gran_contact::ContactParams;

    const R: i64 = 100;

    struct Fixture {
        grid: SubdomainGrid,
        spheres: SphereState,
        membership: SdMembership,
        table: ContactTable,
        partners: PartnerSpace,
        models: ContactModels,
        boundaries: BoundarySet,
        forces: ForceAccumulator,
        fatal: FatalFlag,
        counters: ContactCounters,
    }

    impl Fixture {
        fn new(positions: Vec<[i64; 3]>) -> Self {
            // 4 x 4 x 4 SDs of 1000 SU around the origin
            let grid = SubdomainGrid::new([4, 4, 4], [1000, 1000, 1000]).unwrap();
            let n = positions.len();
            let mut membership = SdMembership::new(grid.count(), n);
            membership.rebuild(&grid, &positions, [0; 3], R).unwrap();
            let params = ContactParams {
                normal_stiffness: 1e-2,
                ..ContactParams::default()
            };
            let model = ContactModel::new(params, R as f64, 1.0);
            Self {
                spheres: SphereState::at_positions(positions),
                membership,
                table: ContactTable::new(n),
                partners: PartnerSpace::new(n, 0, 0).unwrap(),
                models: ContactModels {
                    sphere_sphere: model,
                    sphere_wall: model,
                    sphere_mesh: model,
                },
                boundaries: BoundarySet::new(),
                forces: ForceAccumulator::new(n, R as f64),
                fatal: FatalFlag::default(),
                counters: ContactCounters::default(),
                grid,
            }
        }

        fn run(&self) {
            ResolveContext {
                grid: &self.grid,
                radius: R,
                offset: [0; 3],
                frame_velocity: Vector3::zeros(),
                spheres: &self.spheres,
                membership: &self.membership,
                table: &self.table,
                partners: self.partners,
                models: &self.models,
                boundaries: &self.boundaries,
                mesh: None,
                forces: &self.forces,
                fatal: &self.fatal,
                counters: &self.counters,
            }
            .run();
        }
    }

    #[test]
    fn test_straddling_pair_resolved_once() {
        // Pair straddling the x = 0 SD face, 10 SU overlap
        let straddling = Fixture::new(vec![[-95, 500, 500], [95, 500, 500]]);
        straddling.run();
        // Same pair well inside one SD
        let interior = Fixture::new(vec![[405, 500, 500], [595, 500, 500]]);
        interior.run();

        assert_eq!(straddling.counters.take().0, 1);
        assert_eq!(interior.counters.take().0, 1);
        assert_eq!(straddling.forces.linear(0), interior.forces.linear(0));
        assert_eq!(straddling.forces.linear(1), interior.forces.linear(1));
        // 1e-2 * 10 = 0.1 SU along -x on the left sphere
        let expected = ForceAccumulator::quantize_force(&Vector3::new(-0.1, 0.0, 0.0));
        assert_eq!(straddling.forces.linear(0), expected);
        assert_eq!(straddling.table.partners_of(0), vec![1]);
        assert!(straddling.table.partners_of(1).is_empty());
    }

    #[test]
    fn test_corner_pair_resolved_once() {
        // Midpoint lands exactly on the corner shared by eight SDs
        let fixture = Fixture::new(vec![[-50, -50, -50], [50, 50, 50]]);
        fixture.run();
        assert_eq!(fixture.counters.take().0, 1);
    }

    #[test]
    fn test_wall_contact() {
        // Grid spans [-2000, 2000); sphere 30 SU into the floor
        let fixture = Fixture::new(vec![[0, 0, -2000 + R - 30]]);
        fixture.run();
        let (spheres, walls, _, _) = fixture.counters.take();
        assert_eq!(spheres, 0);
        assert_eq!(walls, 1);
        let expected = ForceAccumulator::quantize_force(&Vector3::new(0.0, 0.0, 0.3));
        assert_eq!(fixture.forces.linear(0), expected);
        assert_eq!(
            fixture.table.partners_of(0),
            vec![fixture.partners.wall(4)]
        );
    }

    #[test]
    fn test_table_overflow_raises_fatal() {
        // A sphere buried in a clump with more partners than slots
        let mut positions = vec![[500, 500, 500]];
        for k in 0..30 {
            positions.push([500 + (k % 5) * 10 - 20, 500 + (k / 5) * 10 - 25, 520]);
        }
        let fixture = Fixture::new(positions);
        fixture.run();
        assert!(fixture.fatal.is_raised());
    }
}
