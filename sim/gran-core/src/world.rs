//! The granular system: setup, initialization, mesh exchange and queries.
//!
//! A [`GranularSystem`] is configured in user units, initialized exactly
//! once, then stepped:
//!
//! ```text
//!   new(config)
//!     ├─ set_particle_positions / set_particle_velocities
//!     ├─ load_meshes / load_mesh_soup, create_bc_*  (optional)
//!     ▼
//!   initialize()      units, partition, buffers, first broadphase
//!     ▼
//!   loop { apply_rigid_body_motion → advance_simulation → collect_generalized_forces }
//! ```

use std::path::Path;

use gran_contact::{ContactModel, ContactParams, ContactTable, Partner, PartnerSpace};
use gran_spatial::{SdIndex, SubdomainGrid};
use gran_types::fixed::{self, ANGULAR_FRACTION_BITS, LINEAR_FRACTION_BITS};
use gran_types::{
    BoundaryId, FrameMotion, GranularConfig, MaterialPair, SimError, SphereId, UnitSystem,
};
use nalgebra::{Point3, Vector3};
use tracing::{info, warn};

use crate::boundary::{BoundaryShape, BoundarySet, MAX_BOUNDARY_CONDITIONS};
use crate::broad_phase::{SdMembership, TriangleMembership, to_local};
use crate::mesh::{MeshSoup, MeshState, Triangle};
use crate::partition::DomainPartition;
use crate::resolve::{ContactCounters, ContactModels};
use crate::state::{FatalFlag, ForceAccumulator, SphereState};
use crate::stepper::StepStats;

/// Buffers and derived constants that exist once the system is initialized.
#[derive(Debug)]
pub(crate) struct Engine {
    pub(crate) units: UnitSystem,
    pub(crate) partition: DomainPartition,
    pub(crate) spheres: SphereState,
    pub(crate) forces: ForceAccumulator,
    pub(crate) membership: SdMembership,
    pub(crate) table: ContactTable,
    pub(crate) partners: PartnerSpace,
    pub(crate) models: ContactModels,
    pub(crate) mesh: Option<MeshState>,
    pub(crate) triangle_bins: TriangleMembership,
    /// Gravity as a fixed-point acceleration.
    pub(crate) gravity: [i64; 3],
    /// Frame offset the current membership was built with.
    pub(crate) offset: [i64; 3],
    pub(crate) fatal: FatalFlag,
    pub(crate) counters: ContactCounters,
}

/// Big-domain frame offset at time `t`, in whole SU.
pub(crate) fn frame_offset(motion: &FrameMotion, t: f64, units: &UnitSystem) -> [i64; 3] {
    let offset = units.vector_to_su(&motion.offset(t));
    [
        offset.x.round() as i64,
        offset.y.round() as i64,
        offset.z.round() as i64,
    ]
}

/// A monodisperse granular system in a box, with optional mesh and
/// analytic boundaries.
///
/// # Example
///
/// ```
/// use gran_core::GranularSystem;
/// use gran_types::GranularConfig;
/// use nalgebra::{Point3, Vector3};
///
/// let config = GranularConfig::new(0.5, 2.5, Vector3::new(10.0, 10.0, 10.0));
/// let mut system = GranularSystem::new(config).unwrap();
/// system
///     .set_particle_positions(vec![Point3::new(0.0, 0.0, 0.0)])
///     .unwrap();
/// system.initialize().unwrap();
///
/// let steps = system.advance_simulation(1e-3).unwrap();
/// assert_eq!(steps, 100);
/// // Falling under gravity
/// assert!(system.velocities()[0].z < 0.0);
/// ```
#[derive(Debug)]
pub struct GranularSystem {
    pub(crate) config: GranularConfig,
    pending_positions: Vec<Point3<f64>>,
    pending_velocities: Vec<Vector3<f64>>,
    pub(crate) boundaries: BoundarySet,
    soup: Option<MeshSoup>,
    mesh_enabled: bool,
    pub(crate) engine: Option<Engine>,
    pub(crate) time: f64,
    pub(crate) steps_taken: u64,
    pub(crate) poisoned: Option<String>,
    pub(crate) last_stats: StepStats,
}

impl GranularSystem {
    /// Creates an uninitialized system.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`GranularConfig::validate`] finds.
    pub fn new(config: GranularConfig) -> gran_types::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pending_positions: Vec::new(),
            pending_velocities: Vec::new(),
            boundaries: BoundarySet::new(),
            soup: None,
            mesh_enabled: true,
            engine: None,
            time: 0.0,
            steps_taken: 0,
            poisoned: None,
            last_stats: StepStats::default(),
        })
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &GranularConfig {
        &self.config
    }

    fn require_setup(&self) -> gran_types::Result<()> {
        if self.engine.is_some() {
            Err(SimError::AlreadyInitialized)
        } else {
            Ok(())
        }
    }

    fn engine(&self) -> gran_types::Result<&Engine> {
        self.engine.as_ref().ok_or(SimError::NotInitialized)
    }

    /// Sets initial sphere centers in world user units. Velocities reset to zero.
    ///
    /// # Errors
    ///
    /// [`SimError::AlreadyInitialized`] after [`initialize`](Self::initialize);
    /// [`SimError::InvalidConfig`] for non-finite coordinates.
    pub fn set_particle_positions(&mut self, positions: Vec<Point3<f64>>) -> gran_types::Result<()> {
        self.require_setup()?;
        if !positions
            .iter()
            .all(|p| p.coords.iter().all(|x| x.is_finite()))
        {
            return Err(SimError::invalid_config("particle positions must be finite"));
        }
        self.pending_velocities = vec![Vector3::zeros(); positions.len()];
        self.pending_positions = positions;
        Ok(())
    }

    /// Sets sphere velocities in user units, before or after initialization.
    ///
    /// # Errors
    ///
    /// [`SimError::MismatchedLengths`] unless there is one velocity per sphere.
    pub fn set_particle_velocities(&mut self, velocities: &[Vector3<f64>]) -> gran_types::Result<()> {
        let n = self.n_spheres();
        if velocities.len() != n {
            return Err(SimError::mismatched_lengths(
                "particle velocities",
                n,
                velocities.len(),
            ));
        }
        match &mut self.engine {
            Some(engine) => {
                for (slot, v) in engine.spheres.velocities.iter_mut().zip(velocities) {
                    *slot = engine.units.velocity_to_fixed(v);
                }
            }
            None => self.pending_velocities = velocities.to_vec(),
        }
        Ok(())
    }

    /// Loads one mesh family per file (`.obj` or `.stl`), see
    /// [`MeshSoup::from_files`].
    ///
    /// # Errors
    ///
    /// [`SimError::AlreadyInitialized`] after initialization, otherwise
    /// whatever [`MeshSoup::from_files`] returns.
    pub fn load_meshes<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        scalings: &[Vector3<f64>],
        masses: &[f64],
        inflated: &[bool],
        inflation_radii: &[f64],
    ) -> gran_types::Result<()> {
        if self.engine.is_some() {
            return Err(SimError::AlreadyInitialized);
        }
        let soup = MeshSoup::from_files(paths, scalings, masses, inflated, inflation_radii)?;
        self.load_mesh_soup(soup)
    }

    /// Loads the triangle soup of all mesh families.
    ///
    /// # Errors
    ///
    /// [`SimError::AlreadyInitialized`] after initialization.
    pub fn load_mesh_soup(&mut self, soup: MeshSoup) -> gran_types::Result<()> {
        self.require_setup()?;
        self.soup = Some(soup);
        Ok(())
    }

    /// Turns sphere-mesh collision on or off, at any time.
    pub fn set_mesh_collision(&mut self, enabled: bool) {
        self.mesh_enabled = enabled;
        if let Some(mesh) = self.engine.as_mut().and_then(|e| e.mesh.as_mut()) {
            mesh.set_enabled(enabled);
        }
    }

    /// Registers a boundary condition, before or after initialization.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] for a malformed shape or too many boundaries.
    pub fn create_boundary(
        &mut self,
        shape: BoundaryShape,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        let units = self.engine.as_ref().map(|e| e.units);
        self.boundaries.add(shape, track_forces, units.as_ref())
    }

    /// Half-space boundary; spheres stay on the side `normal` points to.
    ///
    /// # Errors
    ///
    /// See [`create_boundary`](Self::create_boundary).
    pub fn create_bc_plane(
        &mut self,
        point: Point3<f64>,
        normal: Vector3<f64>,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        self.create_boundary(BoundaryShape::Plane { point, normal }, track_forces)
    }

    /// Solid sphere boundary; spheres stay outside.
    ///
    /// # Errors
    ///
    /// See [`create_boundary`](Self::create_boundary).
    pub fn create_bc_sphere(
        &mut self,
        center: Point3<f64>,
        radius: f64,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        self.create_boundary(BoundaryShape::Sphere { center, radius }, track_forces)
    }

    /// Z-aligned cylinder boundary; spheres stay inside.
    ///
    /// # Errors
    ///
    /// See [`create_boundary`](Self::create_boundary).
    pub fn create_bc_z_cylinder(
        &mut self,
        center: Point3<f64>,
        radius: f64,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        self.create_boundary(BoundaryShape::ZCylinder { center, radius }, track_forces)
    }

    /// Z-aligned cone boundary opening upward; spheres stay inside.
    ///
    /// # Errors
    ///
    /// See [`create_boundary`](Self::create_boundary).
    pub fn create_bc_z_cone(
        &mut self,
        tip: Point3<f64>,
        slope: f64,
        z_min: f64,
        z_max: f64,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        self.create_boundary(
            BoundaryShape::ZCone {
                tip,
                slope,
                z_min,
                z_max,
            },
            track_forces,
        )
    }

    /// Axis-aligned box obstacle; spheres stay outside.
    ///
    /// # Errors
    ///
    /// See [`create_boundary`](Self::create_boundary).
    pub fn create_bc_aa_box(
        &mut self,
        min: Point3<f64>,
        max: Point3<f64>,
        track_forces: bool,
    ) -> gran_types::Result<BoundaryId> {
        self.create_boundary(BoundaryShape::AaBox { min, max }, track_forces)
    }

    /// Re-activates a boundary.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownBoundary`] for an unknown id.
    pub fn enable_bc(&mut self, id: BoundaryId) -> gran_types::Result<()> {
        self.boundaries.set_active(id, true)
    }

    /// Deactivates a boundary; it stops producing contacts from the next step.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownBoundary`] for an unknown id.
    pub fn disable_bc(&mut self, id: BoundaryId) -> gran_types::Result<()> {
        self.boundaries.set_active(id, false)
    }

    /// Force the spheres exerted on boundary `id` during the last step (UU).
    ///
    /// # Errors
    ///
    /// [`SimError::NotInitialized`], [`SimError::UnknownBoundary`] or
    /// [`SimError::UntrackedBoundary`].
    pub fn bc_reaction_force(&self, id: BoundaryId) -> gran_types::Result<Vector3<f64>> {
        let engine = self.engine()?;
        self.boundaries.reaction_force(id, &engine.units)
    }

    /// Derives units, partitions the domain, allocates buffers and builds
    /// the first broadphase.
    ///
    /// # Errors
    ///
    /// [`SimError::AlreadyInitialized`] on a second call; configuration
    /// errors from unit scaling or partitioning; [`SimError::InvalidConfig`]
    /// for spheres outside a strict domain; [`SimError::SubdomainOverflow`]
    /// if the initial packing overfills an SD.
    pub fn initialize(&mut self) -> gran_types::Result<()> {
        self.require_setup()?;
        let config = &self.config;
        let units = UnitSystem::derive(&config.scaling_inputs())?;
        let partition = DomainPartition::compute(config, &units)?;
        let grid = partition.grid();
        let radius = partition.radius();

        let positions: Vec<[i64; 3]> = self
            .pending_positions
            .iter()
            .map(|p| units.point_to_su(p))
            .collect();
        let n = positions.len();
        if n == 0 {
            warn!("initializing a system without spheres");
        }

        let offset = frame_offset(&config.frame_motion, 0.0, &units);
        let outside = positions
            .iter()
            .filter(|p| !grid.contains_point(to_local(**p, offset)))
            .count();
        if outside > 0 {
            if !config.clamp_to_domain {
                return Err(SimError::invalid_config(format!(
                    "{outside} spheres start outside the big domain"
                )));
            }
            warn!(outside, "spheres outside the big domain are clamped to boundary SDs");
        }

        let mut spheres = SphereState::at_positions(positions);
        for (slot, v) in spheres.velocities.iter_mut().zip(&self.pending_velocities) {
            *slot = units.velocity_to_fixed(v);
        }

        let mut mesh = self.soup.as_ref().map(|soup| MeshState::new(soup, &units));
        if let Some(mesh) = mesh.as_mut() {
            mesh.set_enabled(self.mesh_enabled);
        }
        let triangles = mesh.as_ref().map_or(0, MeshState::triangle_count);
        let partners = PartnerSpace::new(n, MAX_BOUNDARY_CONDITIONS, triangles)?;

        let g = config.gravity.magnitude();
        let model = |pair: &MaterialPair| {
            let params = ContactParams::from_material(pair, &units, config.rolling_mode, g);
            ContactModel::new(params, radius as f64, units.step_ticks() as f64)
                .with_friction_mode(config.friction_mode)
                .with_normal_model(config.contact_model)
                .with_rolling_mode(config.rolling_mode)
        };
        let models = ContactModels {
            sphere_sphere: model(&config.materials.sphere_sphere),
            sphere_wall: model(&config.materials.sphere_wall),
            sphere_mesh: model(&config.materials.sphere_mesh),
        };

        let mut membership = SdMembership::new(grid.count(), n);
        membership.rebuild(grid, &spheres.positions, offset, radius)?;
        let triangle_bins = match &mesh {
            Some(mesh) if mesh.is_enabled() => {
                TriangleMembership::build(grid, &mesh.broad_bounds(offset))
            }
            _ => TriangleMembership::default(),
        };

        self.boundaries.scale_all(&units);
        let gravity = fixed::vector_to_fixed(
            &units.acceleration_to_su(&config.gravity.acceleration),
            LINEAR_FRACTION_BITS,
        );

        info!(
            spheres = n,
            subdomains = grid.count(),
            dims = ?grid.dims(),
            sd_size = ?grid.sd_size(),
            radius_su = radius,
            step_ticks = units.step_ticks(),
            length_unit = units.length(),
            time_unit = units.time(),
            mass_unit = units.mass(),
            "granular system initialized"
        );

        self.engine = Some(Engine {
            forces: ForceAccumulator::new(n, radius as f64),
            table: ContactTable::new(n),
            units,
            partition,
            spheres,
            membership,
            partners,
            models,
            mesh,
            triangle_bins,
            gravity,
            offset,
            fatal: FatalFlag::default(),
            counters: ContactCounters::default(),
        });
        Ok(())
    }

    /// True once [`initialize`](Self::initialize) succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// True after a fatal condition halted the system.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Applies external family poses (7 doubles each) and twists (6 each).
    ///
    /// # Errors
    ///
    /// [`SimError::NotInitialized`], [`SimError::MismatchedLengths`], or
    /// [`SimError::InvalidConfig`] for non-finite values or a zero
    /// quaternion. A rejected call leaves every family where it was.
    pub fn apply_rigid_body_motion(&mut self, poses: &[f64], twists: &[f64]) -> gran_types::Result<()> {
        let engine = self.engine.as_mut().ok_or(SimError::NotInitialized)?;
        match engine.mesh.as_mut() {
            Some(mesh) => mesh.apply_rigid_body_motion(poses, twists, &engine.units),
            None if poses.is_empty() && twists.is_empty() => Ok(()),
            None => Err(SimError::mismatched_lengths(
                "mesh family poses",
                0,
                poses.len(),
            )),
        }
    }

    /// Writes the last step's per-family force and torque (6 doubles each,
    /// UU) into `out` and clears the accumulators.
    ///
    /// # Errors
    ///
    /// [`SimError::NotInitialized`] or [`SimError::MismatchedLengths`].
    pub fn collect_generalized_forces(&self, out: &mut [f64]) -> gran_types::Result<()> {
        let engine = self.engine()?;
        match &engine.mesh {
            Some(mesh) => mesh.collect_generalized_forces(out, &engine.units),
            None if out.is_empty() => Ok(()),
            None => Err(SimError::mismatched_lengths(
                "mesh generalized forces",
                0,
                out.len(),
            )),
        }
    }

    /// Number of spheres.
    #[must_use]
    pub fn n_spheres(&self) -> usize {
        self.engine
            .as_ref()
            .map_or(self.pending_positions.len(), |e| e.spheres.len())
    }

    /// Simulated time in user units.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Sphere centers in world user units.
    #[must_use]
    pub fn positions(&self) -> Vec<Point3<f64>> {
        match &self.engine {
            Some(engine) => engine
                .spheres
                .positions
                .iter()
                .map(|p| engine.units.point_to_uu(*p))
                .collect(),
            None => self.pending_positions.clone(),
        }
    }

    /// Sphere velocities in user units.
    #[must_use]
    pub fn velocities(&self) -> Vec<Vector3<f64>> {
        match &self.engine {
            Some(engine) => engine
                .spheres
                .velocities
                .iter()
                .map(|v| engine.units.fixed_to_velocity(*v))
                .collect(),
            None => self.pending_velocities.clone(),
        }
    }

    /// Sphere angular velocities in user units (rad per time unit).
    #[must_use]
    pub fn angular_velocities(&self) -> Vec<Vector3<f64>> {
        match &self.engine {
            Some(engine) => engine
                .spheres
                .angular_velocities
                .iter()
                .map(|w| fixed::vector_from_fixed(*w, ANGULAR_FRACTION_BITS) / engine.units.time())
                .collect(),
            None => vec![Vector3::zeros(); self.n_spheres()],
        }
    }

    /// Raw SU positions; empty before initialization.
    #[must_use]
    pub fn positions_su(&self) -> &[[i64; 3]] {
        self.engine
            .as_ref()
            .map(|e| e.spheres.positions())
            .unwrap_or_default()
    }

    /// Raw fixed-point velocities; empty before initialization.
    #[must_use]
    pub fn velocities_su(&self) -> &[[i64; 3]] {
        self.engine
            .as_ref()
            .map(|e| e.spheres.velocities())
            .unwrap_or_default()
    }

    /// Highest sphere center in user units.
    #[must_use]
    pub fn max_z(&self) -> Option<f64> {
        self.positions().iter().map(|p| p.z).reduce(f64::max)
    }

    /// Unit system, once initialized.
    #[must_use]
    pub fn units(&self) -> Option<&UnitSystem> {
        self.engine.as_ref().map(|e| &e.units)
    }

    /// Sub-domain grid, once initialized.
    #[must_use]
    pub fn grid(&self) -> Option<&SubdomainGrid> {
        self.engine.as_ref().map(|e| e.partition.grid())
    }

    /// Sphere radius in SU, once initialized.
    #[must_use]
    pub fn radius_su(&self) -> Option<i64> {
        self.engine.as_ref().map(|e| e.partition.radius())
    }

    /// Members of `sd` in the current broadphase.
    #[must_use]
    pub fn subdomain_members(&self, sd: SdIndex) -> Vec<SphereId> {
        match &self.engine {
            Some(engine) if !sd.is_null() && sd.raw() < engine.partition.subdomain_count() => {
                engine
                    .membership
                    .members(sd.raw())
                    .into_iter()
                    .map(SphereId::new)
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// The SD owning the center of `sphere`.
    #[must_use]
    pub fn owner_subdomain(&self, sphere: SphereId) -> Option<SdIndex> {
        let engine = self.engine.as_ref()?;
        let pos = engine.spheres.positions.get(sphere.index())?;
        Some(engine.partition.grid().owner(to_local(*pos, engine.offset)))
    }

    /// Number of SDs each sphere touched in the last broadphase.
    #[must_use]
    pub fn touched_counts(&self) -> &[u8] {
        self.engine
            .as_ref()
            .map(|e| e.membership.touched_counts())
            .unwrap_or_default()
    }

    /// Partners holding a contact slot of `sphere`.
    ///
    /// Sphere pairs are stored under the lower-indexed sphere only.
    #[must_use]
    pub fn contact_partners(&self, sphere: SphereId) -> Vec<Partner> {
        match &self.engine {
            Some(engine) if sphere.index() < engine.spheres.len() => engine
                .table
                .partners_of(sphere.raw())
                .into_iter()
                .filter_map(|id| engine.partners.decode(id))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Statistics of the last completed step.
    #[must_use]
    pub fn last_step_stats(&self) -> &StepStats {
        &self.last_stats
    }

    /// Number of mesh families.
    #[must_use]
    pub fn mesh_family_count(&self) -> usize {
        match (&self.engine, &self.soup) {
            (Some(engine), _) => engine.mesh.as_ref().map_or(0, MeshState::family_count),
            (None, Some(soup)) => soup.family_count(),
            (None, None) => 0,
        }
    }

    /// Number of mesh triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        match (&self.engine, &self.soup) {
            (Some(engine), _) => engine.mesh.as_ref().map_or(0, MeshState::triangle_count),
            (None, Some(soup)) => soup.triangle_count(),
            (None, None) => 0,
        }
    }

    /// World-frame mesh triangles in user units; empty before initialization.
    #[must_use]
    pub fn mesh_triangles(&self) -> Vec<Triangle> {
        self.engine
            .as_ref()
            .and_then(|e| e.mesh.as_ref().map(|m| m.world_triangles(&e.units)))
            .unwrap_or_default()
    }
}
