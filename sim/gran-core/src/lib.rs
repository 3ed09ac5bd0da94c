//! Parallel sub-domain DEM engine for monodisperse granular flow.
//!
//! Spheres of one radius live in a rectangular box (the big domain) that
//! is split into equal sub-domains (SDs). Each step resolves every contact
//! in exactly one SD, in parallel, then integrates all spheres in integer
//! simulation units so results do not depend on thread scheduling.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GranularSystem                          │
//! │  Setup (UU): positions, mesh files, boundary conditions     │
//! │  initialize(): units → partition → buffers → broadphase     │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │ step()
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  resolve    per SD: sphere pairs, walls, BCs, triangles     │
//! │  history    release slots not claimed this step             │
//! │  integrate  per sphere: Euler / Taylor / Chung              │
//! │  broadphase rebuild SD membership (sort and compact)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Ownership
//!
//! - A sphere pair belongs to the SD containing the midpoint of the centers
//! - A wall or boundary contact belongs to the SD containing the center
//! - A triangle contact belongs to the SD containing the contact point
//!
//! # Quick Start
//!
//! ```
//! use gran_core::GranularSystem;
//! use gran_core::sampling::HcpSampler;
//! use gran_types::GranularConfig;
//! use nalgebra::{Point3, Vector3};
//!
//! let config = GranularConfig::new(0.5, 2.5, Vector3::new(8.0, 8.0, 8.0)).timestep(1e-5);
//! let mut system = GranularSystem::new(config).unwrap();
//!
//! let positions = HcpSampler::new(1.2).sample_box(Point3::origin(), Vector3::new(2.0, 2.0, 2.0));
//! system.set_particle_positions(positions).unwrap();
//! system.create_bc_plane(Point3::new(0.0, 0.0, -3.0), Vector3::z(), true).unwrap();
//! system.initialize().unwrap();
//!
//! system.advance_simulation(1e-4).unwrap();
//! assert_eq!(system.last_step_stats().step, 10);
//! ```

#![doc(html_root_url = "https://docs.rs/gran-core/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,       // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,           // mul_add style changes aren't always clearer
    clippy::neg_cmp_op_on_partial_ord,  // !(x > 0.0) is intentional for NaN rejection
    clippy::cast_precision_loss,        // SU magnitudes stay below 2^52
    clippy::cast_possible_truncation,   // Rounded conversions and index widths are checked
    clippy::cast_sign_loss,             // Counts derived from non-negative values
    clippy::too_many_lines,             // Kernels naturally have many steps
    clippy::doc_markdown,               // Not all technical terms need backticks
)]

// Box and boundary conditions
pub mod boundary;

// Sub-domain membership (sort and compact)
pub mod broad_phase;

// Time integration schemes
pub mod integrators;

// Rigid mesh families
pub mod mesh;

// OBJ and STL readers
pub mod mesh_io;

// CSV and VTK snapshots
pub mod output;

// Domain partitioning
pub mod partition;

// Contact resolution kernel
pub mod resolve;

// Initial packings
pub mod sampling;

// Sphere state and accumulators
pub mod state;

mod stepper;
mod world;

pub use boundary::{Boundary, BoundaryContact, BoundarySet, BoundaryShape, MAX_BOUNDARY_CONDITIONS};
pub use broad_phase::{SdMembership, TriangleMembership};
pub use integrators::{Chung, ExtendedTaylor, ForwardEuler, Integrator, integrate_with_method};
pub use mesh::{Feature, MeshSoup, MeshState, Triangle, TriangleContact};
pub use mesh_io::{MeshFormat, load_triangles};
pub use partition::DomainPartition;
pub use sampling::HcpSampler;
pub use state::{FatalFlag, ForceAccumulator, SphereState};
pub use stepper::StepStats;
pub use world::GranularSystem;

// Re-export the layers below for single-import use
pub use gran_contact::{ContactModel, Partner};
pub use gran_spatial::{SdCoord, SdIndex, SubdomainGrid};
pub use gran_types::{BoundaryId, GranularConfig, Result, SimError, SphereId};
