//! Soft-contact force model and persistent contact table for granular flow.
//!
//! Contacts between spheres, walls and mesh triangles are penalty
//! (spring-damper) contacts evaluated in simulation units:
//!
//! ```text
//! F_n = f(d) * (K_n d - Gamma_n m_eff v_n)      f = 1 (Hooke) or sqrt(d / r) (Hertz)
//! F_t = -f(d) * (K_t s + Gamma_t m_eff v_t)     |F_t| <= mu F_n
//! ```
//!
//! Where:
//! - `d` = penetration depth
//! - `v_n`, `v_t` = relative normal / tangential velocity at the contact point
//! - `s` = tangential displacement, either `v_t h` (single-step) or the
//!   accumulated history of the contact (multi-step)
//! - `m_eff` = effective mass of the pair
//!
//! The crate provides:
//!
//! - [`ContactModel`] - Normal, tangential, cohesion and rolling terms
//! - [`ContactParams`] - Material parameters scaled into SU
//! - [`FrictionCone`] - Coulomb limit and idempotent displacement clamp
//! - [`ContactTable`] - Fixed-stride per-sphere slot table with atomic claim
//! - [`PartnerSpace`] - Shared id space for spheres, walls, boundaries, triangles
//!
//! # Example
//!
//! ```
//! use gran_contact::{BodyMotion, ContactGeometry, ContactModel, ContactParams};
//! use nalgebra::Vector3;
//!
//! let params = ContactParams {
//!     normal_stiffness: 1e-3,
//!     ..ContactParams::default()
//! };
//! let model = ContactModel::new(params, 1000.0, 1.0);
//!
//! // Sphere A sits 10 SU inside sphere B along +x
//! let geometry = ContactGeometry::sphere_sphere([0, 0, 0], [1990, 0, 0], 1000).unwrap();
//! let response = model.compute(
//!     &geometry,
//!     &BodyMotion::at_rest(),
//!     &BodyMotion::at_rest(),
//!     0.5,
//!     None,
//! );
//!
//! // A is pushed away from B
//! assert!(response.force.x < 0.0);
//! ```

#![doc(html_root_url = "https://docs.rs/gran-contact/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::cast_precision_loss, // SU magnitudes stay far below 2^52
)]

mod contact;
mod friction;
mod history;
mod model;
mod params;
mod partner;

pub use contact::{BodyMotion, ContactGeometry, ContactResponse, squared_distance};
pub use friction::{FrictionCone, rotate_into_plane};
pub use history::{ContactSlot, ContactTable, MAX_CONTACTS_PER_SPHERE};
pub use model::ContactModel;
pub use params::ContactParams;
pub use partner::{Partner, PartnerSpace, WALL_COUNT};
