//! Shared id space for contact partners.
//!
//! Slot tables store a single `u32` per partner, so spheres, the six box
//! walls, boundary conditions and mesh triangles share one range:
//!
//! ```text
//! [0, n)                spheres
//! [n, n + 6)            walls  (-x, +x, -y, +y, -z, +z)
//! [n + 6, n + 6 + b)    boundary conditions
//! [n + 6 + b, ...)      mesh triangles
//! ```

use gran_types::{SimError, SphereId};

/// Number of big-domain walls.
pub const WALL_COUNT: u32 = 6;

/// Decoded partner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partner {
    /// Another sphere.
    Sphere(SphereId),
    /// A big-domain wall, numbered `-x, +x, -y, +y, -z, +z`.
    Wall(u32),
    /// A registered boundary condition, by index.
    Boundary(u32),
    /// A mesh triangle, by index.
    Triangle(u32),
}

/// Layout of the partner id range for one system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartnerSpace {
    spheres: u32,
    boundaries: u32,
    triangles: u32,
}

impl PartnerSpace {
    /// Lays out the id range.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if the total does not fit below
    /// the slot table's free marker.
    pub fn new(spheres: usize, boundaries: usize, triangles: usize) -> gran_types::Result<Self> {
        let total = spheres as u64 + u64::from(WALL_COUNT) + boundaries as u64 + triangles as u64;
        if total >= u64::from(u32::MAX) {
            return Err(SimError::invalid_config(format!(
                "{total} contact partners exceed the 32-bit id range"
            )));
        }
        Ok(Self {
            spheres: spheres as u32,
            boundaries: boundaries as u32,
            triangles: triangles as u32,
        })
    }

    /// Id of a sphere.
    #[must_use]
    pub const fn sphere(&self, sphere: u32) -> u32 {
        sphere
    }

    /// Id of a wall (`0..6`).
    #[must_use]
    pub const fn wall(&self, face: u32) -> u32 {
        self.spheres + face
    }

    /// Id of a boundary condition.
    #[must_use]
    pub const fn boundary(&self, index: u32) -> u32 {
        self.spheres + WALL_COUNT + index
    }

    /// Id of a mesh triangle.
    #[must_use]
    pub const fn triangle(&self, index: u32) -> u32 {
        self.spheres + WALL_COUNT + self.boundaries + index
    }

    /// Decodes an id, or `None` past the end of the range.
    #[must_use]
    pub fn decode(&self, id: u32) -> Option<Partner> {
        let walls = self.spheres + WALL_COUNT;
        let boundaries = walls + self.boundaries;
        let triangles = boundaries + self.triangles;
        if id < self.spheres {
            Some(Partner::Sphere(SphereId::new(id)))
        } else if id < walls {
            Some(Partner::Wall(id - self.spheres))
        } else if id < boundaries {
            Some(Partner::Boundary(id - walls))
        } else if id < triangles {
            Some(Partner::Triangle(id - boundaries))
        } else {
            None
        }
    }
}
