//! Triangle-mesh boundaries driven by an external rigid-body solver.
//!
//! Triangles are grouped into families; each family is one external body
//! with a scaling, a mass, an optional inflation radius and a pose. Poses and twists
//! flow in once per external step, generalized forces flow out:
//!
//! ```text
//!   poses (7 per family) ──▶ frames (f32 broad, f64 narrow) ──▶ world triangles
//!   twists (6 per family) ─▶ contact partner velocities
//!   contact kernel ────────▶ per-family force/torque ──▶ 6 per family (UU)
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use gran_types::fixed::{self, LINEAR_FRACTION_BITS};
use gran_types::{FamilyPose, FamilyTwist, GeneralizedForce, SimError, UnitSystem};
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::mesh_io;

/// Fraction of the sphere radius removed at edge and vertex contacts.
///
/// Rounds off mesh edges so a sphere rolling over a shared edge does not
/// see a spike in penetration.
pub const EDGE_ROUNDING_RATIO: f64 = 0.1;

/// Fractional bits of the accumulated family torque.
const TORQUE_FRACTION_BITS: u32 = 8;

/// A triangle as three family-local vertices, counter-clockwise seen from
/// the contact side.
pub type Triangle = [Point3<f64>; 3];

/// Triangle families with their mass and inflation data, in user units.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSoup {
    families: Vec<Vec<Triangle>>,
    masses: Vec<f64>,
    inflation_radii: Vec<f64>,
}

impl MeshSoup {
    /// Builds a soup from parallel per-family arrays.
    ///
    /// Each family's vertices are scaled component-wise by its entry in
    /// `scalings`; a mirroring scale keeps the faces pointing outward.
    /// Families whose `inflated` flag is false get a zero inflation radius.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] if the arrays disagree on the family
    /// count; [`SimError::InvalidConfig`] for zero or non-finite scalings,
    /// non-positive masses, negative inflation radii or non-finite vertices.
    pub fn new(
        mut families: Vec<Vec<Triangle>>,
        scalings: &[Vector3<f64>],
        masses: &[f64],
        inflated: &[bool],
        inflation_radii: &[f64],
    ) -> gran_types::Result<Self> {
        let n = families.len();
        check_family_lengths(n, scalings, masses, inflated, inflation_radii)?;
        if let Some(s) = scalings
            .iter()
            .find(|s| !s.iter().all(|x| x.is_finite() && *x != 0.0))
        {
            return Err(SimError::invalid_config(format!(
                "mesh scaling must be finite and non-zero, got {s:?}"
            )));
        }

        if let Some(m) = masses.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
            return Err(SimError::invalid_config(format!(
                "mesh family mass must be positive, got {m}"
            )));
        }
        let radii: Vec<f64> = inflated
            .iter()
            .zip(inflation_radii)
            .map(|(&on, &r)| if on { r } else { 0.0 })
            .collect();
        if let Some(r) = radii.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
            return Err(SimError::invalid_config(format!(
                "mesh inflation radius must be non-negative, got {r}"
            )));
        }
        let finite = families
            .iter()
            .flatten()
            .flatten()
            .all(|p| p.coords.iter().all(|x| x.is_finite()));
        if !finite {
            return Err(SimError::invalid_config("mesh vertices must be finite"));
        }
        for (triangles, scale) in families.iter_mut().zip(scalings) {
            let mirrored = scale.x * scale.y * scale.z < 0.0;
            for triangle in triangles.iter_mut() {
                for v in triangle.iter_mut() {
                    v.coords.component_mul_assign(scale);
                }
                if mirrored {
                    triangle.swap(1, 2);
                }
            }
        }

        let soup = Self {
            families,
            masses: masses.to_vec(),
            inflation_radii: radii,
        };
        if soup.triangle_count() == 0 {
            warn!(families = n, "mesh soup has no triangles");
        }
        Ok(soup)
    }

    /// Loads one family per mesh file and builds the soup with
    /// [`new`](Self::new).
    ///
    /// The format is picked from each file's extension (`.obj` or `.stl`).
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] if the per-family arrays disagree with
    /// the number of files, checked before any file is opened;
    /// [`SimError::MeshFile`] for an unreadable or malformed file; otherwise
    /// as [`new`](Self::new).
    pub fn from_files<P: AsRef<Path>>(
        paths: &[P],
        scalings: &[Vector3<f64>],
        masses: &[f64],
        inflated: &[bool],
        inflation_radii: &[f64],
    ) -> gran_types::Result<Self> {
        check_family_lengths(paths.len(), scalings, masses, inflated, inflation_radii)?;
        if paths.is_empty() {
            warn!("no mesh files given");
        }
        let families = paths
            .iter()
            .map(|path| {
                info!(path = %path.as_ref().display(), "importing mesh");
                mesh_io::load_triangles(path)
            })
            .collect::<gran_types::Result<Vec<_>>>()?;
        Self::new(families, scalings, masses, inflated, inflation_radii)
    }

    /// Number of families.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Total number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.families.iter().map(Vec::len).sum()
    }
}

fn check_family_lengths(
    n: usize,
    scalings: &[Vector3<f64>],
    masses: &[f64],
    inflated: &[bool],
    inflation_radii: &[f64],
) -> gran_types::Result<()> {
    for (what, len) in [
        ("mesh scalings", scalings.len()),
        ("mesh masses", masses.len()),
        ("mesh inflation flags", inflated.len()),
        ("mesh inflation radii", inflation_radii.len()),
    ] {
        if len != n {
            return Err(SimError::mismatched_lengths(what, n, len));
        }
    }
    Ok(())
}

/// Closest triangle feature to a query point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Interior of the face.
    Face,
    /// One of the three edges.
    Edge,
    /// One of the three vertices.
    Vertex,
}

/// Closest point on triangle `(v0, v1, v2)` to `p` and the feature it lies on.
///
/// Voronoi-region classification with barycentric coordinates.
#[must_use]
pub fn closest_point_on_triangle(
    v0: Point3<f64>,
    v1: Point3<f64>,
    v2: Point3<f64>,
    p: Point3<f64>,
) -> (Point3<f64>, Feature) {
    let ab = v1 - v0;
    let ac = v2 - v0;
    let ap = p - v0;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (v0, Feature::Vertex);
    }

    let bp = p - v1;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (v1, Feature::Vertex);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (v0 + ab * v, Feature::Edge);
    }

    let cp = p - v2;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (v2, Feature::Vertex);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (v0 + ac * w, Feature::Edge);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (v1 + (v2 - v1) * w, Feature::Edge);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (v0 + ab * v + ac * w, Feature::Face)
}

/// Result of a sphere-triangle narrowphase test, in world SU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleContact {
    /// Unit normal from the triangle toward the sphere center.
    pub normal: Vector3<f64>,
    /// Penetration depth.
    pub penetration: f64,
    /// Contact point on the sphere side; decides which SD owns the contact.
    pub point: Point3<f64>,
    /// Contact point relative to the family origin.
    pub arm: Vector3<f64>,
    /// Feature the closest point lies on.
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq)]
struct FamilyFrame {
    mass: f64,
    inflation: f64,
    broad_rotation: Matrix3<f32>,
    broad_position: Vector3<f32>,
    narrow_rotation: Matrix3<f64>,
    narrow_position: Vector3<f64>,
    linear: Vector3<f64>,
    angular: Vector3<f64>,
}

/// Mesh soup in SU with per-family frames and force accumulators.
#[derive(Debug)]
pub struct MeshState {
    triangle_family: Vec<u32>,
    local: Vec<[Vector3<f64>; 3]>,
    world: Vec<Triangle>,
    families: Vec<FamilyFrame>,
    accumulators: Vec<[AtomicI64; 6]>,
    enabled: bool,
}

impl MeshState {
    /// Scales a soup into SU with every family at the identity pose.
    #[must_use]
    pub fn new(soup: &MeshSoup, units: &UnitSystem) -> Self {
        let mut triangle_family = Vec::with_capacity(soup.triangle_count());
        let mut local = Vec::with_capacity(soup.triangle_count());
        for (family, triangles) in soup.families.iter().enumerate() {
            for triangle in triangles {
                triangle_family.push(family as u32);
                local.push((*triangle).map(|v| units.vector_to_su(&v.coords)));
            }
        }
        let families = soup
            .masses
            .iter()
            .zip(&soup.inflation_radii)
            .map(|(&mass, &inflation)| FamilyFrame {
                mass: units.mass_to_su(mass),
                inflation: units.length_to_su(inflation),
                broad_rotation: Matrix3::identity(),
                broad_position: Vector3::zeros(),
                narrow_rotation: Matrix3::identity(),
                narrow_position: Vector3::zeros(),
                linear: Vector3::zeros(),
                angular: Vector3::zeros(),
            })
            .collect();
        let mut state = Self {
            triangle_family,
            world: Vec::new(),
            local,
            families,
            accumulators: (0..soup.family_count())
                .map(|_| std::array::from_fn(|_| AtomicI64::new(0)))
                .collect(),
            enabled: true,
        };
        state.update_world();
        debug!(
            families = state.family_count(),
            triangles = state.triangle_count(),
            "mesh soup scaled into SU"
        );
        state
    }

    /// Number of families.
    #[must_use]
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    /// Number of triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.local.len()
    }

    /// Whether mesh contacts are computed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns mesh contacts on or off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Family of triangle `t`.
    #[must_use]
    pub fn family_of(&self, triangle: usize) -> usize {
        self.triangle_family[triangle] as usize
    }

    /// Effective mass of a unit sphere against the family of `triangle`.
    #[must_use]
    pub fn effective_mass(&self, triangle: usize) -> f64 {
        let mass = self.families[self.family_of(triangle)].mass;
        mass / (1.0 + mass)
    }

    /// Velocity state of the family of `triangle` in SU per tick.
    #[must_use]
    pub fn family_motion(&self, triangle: usize) -> (Vector3<f64>, Vector3<f64>) {
        let frame = &self.families[self.family_of(triangle)];
        (frame.linear, frame.angular)
    }

    /// Applies external poses and twists, parsed from flat arrays.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] unless `poses` holds 7 and `twists` 6
    /// doubles per family; [`SimError::InvalidConfig`] for non-finite values
    /// or a zero quaternion. On error no family is moved.
    pub fn apply_rigid_body_motion(
        &mut self,
        poses: &[f64],
        twists: &[f64],
        units: &UnitSystem,
    ) -> gran_types::Result<()> {
        let n = self.family_count();
        let poses = FamilyPose::parse_all(poses, n)?;
        let twists = FamilyTwist::parse_all(twists, n)?;
        for ((frame, pose), twist) in self.families.iter_mut().zip(&poses).zip(&twists) {
            let rotation = pose.orientation.to_rotation_matrix().into_inner();
            let position = units.vector_to_su(&pose.position.coords);
            frame.narrow_rotation = rotation;
            frame.narrow_position = position;
            frame.broad_rotation = rotation.cast::<f32>();
            frame.broad_position = position.cast::<f32>();
            frame.linear = units.velocity_to_su(&twist.linear);
            frame.angular = units.angular_velocity_to_su(&twist.angular);
        }
        self.update_world();
        Ok(())
    }

    fn update_world(&mut self) {
        let families = &self.families;
        let family_of = &self.triangle_family;
        self.world = self
            .local
            .par_iter()
            .zip(family_of.par_iter())
            .map(|(vertices, &family)| {
                let frame = &families[family as usize];
                (*vertices).map(|v| Point3::from(frame.narrow_rotation * v + frame.narrow_position))
            })
            .collect();
    }

    /// Inflated local-frame bounding boxes from the single-precision frames.
    #[must_use]
    pub fn broad_bounds(&self, offset: [i64; 3]) -> Vec<([i64; 3], [i64; 3])> {
        let offset = Vector3::new(offset[0] as f64, offset[1] as f64, offset[2] as f64);
        self.local
            .par_iter()
            .zip(self.triangle_family.par_iter())
            .map(|(vertices, &family)| {
                let frame = &self.families[family as usize];
                let mut min = Vector3::repeat(f64::INFINITY);
                let mut max = Vector3::repeat(f64::NEG_INFINITY);
                for v in vertices {
                    let world = frame.broad_rotation * v.cast::<f32>() + frame.broad_position;
                    let local = world.cast::<f64>() - offset;
                    min = min.inf(&local);
                    max = max.sup(&local);
                }
                // Covers the inflation plus single-precision rounding
                let magnitude = min.abs().max().max(max.abs().max());
                let margin = frame.inflation + magnitude * 1e-6 + 2.0;
                let lo: [i64; 3] = min.map(|x| (x - margin).floor() as i64).into();
                let hi: [i64; 3] = max.map(|x| (x + margin).ceil() as i64).into();
                (lo, hi)
            })
            .collect()
    }

    /// Narrowphase test of a sphere against triangle `t`.
    ///
    /// Only the side the face normal points to collides, within a height
    /// window of `[0, r + inflation)`.
    #[must_use]
    pub fn sphere_contact(
        &self,
        triangle: usize,
        center: &Point3<f64>,
        radius: f64,
    ) -> Option<TriangleContact> {
        let frame = &self.families[self.family_of(triangle)];
        let [a, b, c] = self.world[triangle];
        let cross = (b - a).cross(&(c - a));
        let area = cross.norm();
        if area == 0.0 {
            return None;
        }
        let face_normal = cross / area;
        let reach = radius + frame.inflation;
        let height = (center - a).dot(&face_normal);
        if !(0.0..reach).contains(&height) {
            return None;
        }

        let (closest, feature) = closest_point_on_triangle(a, b, c, *center);
        let delta = center - closest;
        let dist = delta.norm();
        let effective = match feature {
            Feature::Face => reach,
            Feature::Edge | Feature::Vertex => reach - EDGE_ROUNDING_RATIO * radius,
        };
        let penetration = effective - dist;
        if penetration <= 0.0 {
            return None;
        }
        let normal = if dist > 0.0 { delta / dist } else { face_normal };
        let point = center - normal * dist.min(radius);
        Some(TriangleContact {
            normal,
            penetration,
            point,
            arm: point.coords - frame.narrow_position,
            feature,
        })
    }

    /// Adds the force and torque the spheres exert on the family of `triangle`.
    pub fn add_reaction(&self, triangle: usize, force: &Vector3<f64>, torque: &Vector3<f64>) {
        let slots = &self.accumulators[self.family_of(triangle)];
        let q_force = fixed::vector_to_fixed(force, LINEAR_FRACTION_BITS);
        let q_torque = fixed::vector_to_fixed(torque, TORQUE_FRACTION_BITS);
        for (slot, value) in slots.iter().zip(q_force.into_iter().chain(q_torque)) {
            slot.fetch_add(value, Ordering::Relaxed);
        }
    }

    /// Zeroes every family accumulator.
    pub fn clear_reactions(&self) {
        for slot in self.accumulators.iter().flatten() {
            slot.store(0, Ordering::Relaxed);
        }
    }

    /// Accumulated generalized forces in user units.
    #[must_use]
    pub fn reactions(&self, units: &UnitSystem) -> Vec<GeneralizedForce> {
        self.accumulators
            .iter()
            .map(|slots| {
                let raw: [i64; 6] = std::array::from_fn(|k| slots[k].load(Ordering::Relaxed));
                let force = fixed::vector_from_fixed([raw[0], raw[1], raw[2]], LINEAR_FRACTION_BITS);
                let torque = fixed::vector_from_fixed([raw[3], raw[4], raw[5]], TORQUE_FRACTION_BITS);
                GeneralizedForce {
                    force: units.force_to_uu(&force),
                    torque: units.torque_to_uu(&torque),
                }
            })
            .collect()
    }

    /// Writes 6 doubles per family into `out` and clears the accumulators.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] unless `out` holds exactly 6 doubles
    /// per family.
    pub fn collect_generalized_forces(
        &self,
        out: &mut [f64],
        units: &UnitSystem,
    ) -> gran_types::Result<()> {
        let expected = self.family_count() * GeneralizedForce::STRIDE;
        if out.len() != expected {
            return Err(SimError::mismatched_lengths(
                "mesh generalized forces",
                expected,
                out.len(),
            ));
        }
        for (chunk, reaction) in out
            .chunks_exact_mut(GeneralizedForce::STRIDE)
            .zip(self.reactions(units))
        {
            chunk.copy_from_slice(&reaction.to_array());
        }
        self.clear_reactions();
        Ok(())
    }

    /// World-frame triangles in user units.
    #[must_use]
    pub fn world_triangles(&self, units: &UnitSystem) -> Vec<Triangle> {
        self.world
            .iter()
            .map(|t| (*t).map(|v| Point3::from(v.coords * units.length())))
            .collect()
    }
}
