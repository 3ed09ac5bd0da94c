//! Uniform sub-domain grid geometry for granular simulation.
//!
//! The simulation box (the *big domain*, BD) is tiled by a regular grid of
//! equally sized sub-domains (SDs). This crate answers the purely geometric
//! questions the broadphase asks every step:
//!
//! - [`SdCoord`] - Integer `(x, y, z)` sub-domain triplet
//! - [`SdIndex`] - Row-major flattened index with a "no SD" sentinel
//! - [`SubdomainGrid`] - Grid layout, owner lookup, sphere/box overlap
//! - [`GridBounds`] - Inclusive range of SDs overlapped by a box
//! - [`TouchedSubdomains`] - The up-to-eight SDs a sphere overlaps
//!
//! # Layer 0 Crate
//!
//! This crate has no simulation state and no floating-point math. All
//! coordinates are integer simulation units (SU) measured in the BD frame,
//! whose origin sits at the center of the grid:
//!
//! ```text
//!   -extent/2                    0                    +extent/2
//!      |---------|---------|-----+-----|---------|---------|
//!      |  SD 0   |  SD 1   |  SD 2     |  SD 3   |  ...    |
//! ```
//!
//! # Edge Policy
//!
//! Lookups never produce an index outside `[0, n - 1]` on any axis. A point
//! beyond the outer faces of the BD is clamped to the boundary SD, since a
//! sphere resting against a wall may poke slightly past it.
//!
//! # Example
//!
//! ```
//! use gran_spatial::{SdCoord, SubdomainGrid};
//!
//! // 4 x 4 x 2 SDs, each 100 SU on a side
//! let grid = SubdomainGrid::new([4, 4, 2], [100, 100, 100]).unwrap();
//! assert_eq!(grid.count(), 32);
//!
//! // The origin is the corner shared by the four central columns
//! let owner = grid.locate([0, 0, 0]);
//! assert_eq!(owner, SdCoord::new(2, 2, 1));
//!
//! // A sphere of radius 10 centered on that corner overlaps 8 SDs
//! let touched = grid.touched_by_sphere([0, 0, 0], 10);
//! assert_eq!(touched.len(), 8);
//! ```

#![doc(html_root_url = "https://docs.rs/gran-spatial/0.3.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // Not all accessors benefit from const
    clippy::cast_possible_truncation, // Clamped indices always fit in i32/u32
    clippy::cast_sign_loss,           // Indices are clamped non-negative first
)]

mod coord;
mod error;
mod grid;

pub use coord::{SdCoord, SdIndex};
pub use error::SpatialError;
pub use grid::{GridBounds, GridBoundsIter, SubdomainGrid, TouchedSubdomains};

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;
