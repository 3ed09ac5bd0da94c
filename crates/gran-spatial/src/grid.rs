//! Sub-domain grid layout and overlap queries.

use crate::Result;
use crate::coord::{SdCoord, SdIndex};
use crate::error::SpatialError;

/// Inclusive range of sub-domains, typically the SDs overlapped by an AABB.
///
/// # Example
///
/// ```
/// use gran_spatial::{GridBounds, SdCoord};
///
/// let bounds = GridBounds::new(SdCoord::new(0, 0, 0), SdCoord::new(1, 2, 0));
/// assert_eq!(bounds.volume(), 6);
/// assert_eq!(bounds.iter().count(), 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridBounds {
    /// Minimum corner (inclusive).
    pub min: SdCoord,
    /// Maximum corner (inclusive).
    pub max: SdCoord,
}

impl GridBounds {
    /// Creates bounds from two corners, ordering each axis.
    #[must_use]
    pub fn new(a: SdCoord, b: SdCoord) -> Self {
        Self {
            min: SdCoord::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: SdCoord::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Number of sub-domains in the range.
    #[must_use]
    pub fn volume(&self) -> u64 {
        let span = |lo: i32, hi: i32| u64::from(hi.abs_diff(lo)) + 1;
        span(self.min.x, self.max.x) * span(self.min.y, self.max.y) * span(self.min.z, self.max.z)
    }

    /// True if `coord` lies inside the range.
    #[must_use]
    pub fn contains(&self, coord: SdCoord) -> bool {
        (self.min.x..=self.max.x).contains(&coord.x)
            && (self.min.y..=self.max.y).contains(&coord.y)
            && (self.min.z..=self.max.z).contains(&coord.z)
    }

    /// Iterates the range in row-major order (z fastest).
    #[must_use]
    pub fn iter(&self) -> GridBoundsIter {
        GridBoundsIter {
            bounds: *self,
            current: Some(self.min),
        }
    }
}

impl IntoIterator for GridBounds {
    type Item = SdCoord;
    type IntoIter = GridBoundsIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over all coordinates in a [`GridBounds`].
#[derive(Debug, Clone)]
pub struct GridBoundsIter {
    bounds: GridBounds,
    current: Option<SdCoord>,
}

impl Iterator for GridBoundsIter {
    type Item = SdCoord;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;

        let mut next = current;
        next.z += 1;
        if next.z > self.bounds.max.z {
            next.z = self.bounds.min.z;
            next.y += 1;
            if next.y > self.bounds.max.y {
                next.y = self.bounds.min.y;
                next.x += 1;
                if next.x > self.bounds.max.x {
                    self.current = None;
                    return Some(current);
                }
            }
        }
        self.current = Some(next);

        Some(current)
    }
}

/// The sub-domains overlapped by one sphere.
///
/// Holds eight candidate slots, one per low/high choice on each axis
/// (bit 0 = x, bit 1 = y, bit 2 = z). Slots for axes the sphere does not
/// straddle hold [`SdIndex::NULL`], so valid entries are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchedSubdomains {
    slots: [SdIndex; 8],
}

impl TouchedSubdomains {
    /// Raw candidate slots, sentinel included.
    #[must_use]
    pub const fn slots(&self) -> &[SdIndex; 8] {
        &self.slots
    }

    /// Iterates the valid sub-domains.
    pub fn iter(&self) -> impl Iterator<Item = SdIndex> + '_ {
        self.slots.iter().copied().filter(|sd| !sd.is_null())
    }

    /// Number of valid sub-domains (1 to 8).
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Never true for a sphere inside or clamped to the grid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `sd` is among the valid entries.
    #[must_use]
    pub fn contains(&self, sd: SdIndex) -> bool {
        !sd.is_null() && self.slots.contains(&sd)
    }
}

/// A regular grid of sub-domains centered on the big-domain frame origin.
///
/// Coordinates passed to the query methods are integer SU relative to the
/// BD frame. Sub-domain `(0, 0, 0)` starts at `-extent / 2` on every axis.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubdomainGrid {
    dims: [u32; 3],
    sd_size: [i64; 3],
    origin: [i64; 3],
}

impl SubdomainGrid {
    /// Creates a grid of `dims` sub-domains per axis, each `sd_size` SU long.
    ///
    /// # Errors
    ///
    /// Returns an error if any count or edge is zero, if the flattened index
    /// space would collide with [`SdIndex::NULL`], or if the total extent
    /// overflows `i64`.
    pub fn new(dims: [u32; 3], sd_size: [i64; 3]) -> Result<Self> {
        if dims.contains(&0) {
            return Err(SpatialError::InvalidDimensions {
                x: dims[0],
                y: dims[1],
                z: dims[2],
            });
        }
        for (axis, &size) in sd_size.iter().enumerate() {
            if size <= 0 {
                return Err(SpatialError::InvalidSubdomainSize { axis, size });
            }
        }
        let count = u64::from(dims[0]) * u64::from(dims[1]) * u64::from(dims[2]);
        if count >= u64::from(u32::MAX) {
            return Err(SpatialError::TooManySubdomains { count });
        }

        let mut origin = [0_i64; 3];
        for axis in 0..3 {
            let extent = sd_size[axis]
                .checked_mul(i64::from(dims[axis]))
                .ok_or(SpatialError::ExtentOverflow)?;
            origin[axis] = -(extent / 2);
        }

        Ok(Self {
            dims,
            sd_size,
            origin,
        })
    }

    /// Sub-domains per axis.
    #[must_use]
    pub const fn dims(&self) -> [u32; 3] {
        self.dims
    }

    /// Edge length of one sub-domain per axis, in SU.
    #[must_use]
    pub const fn sd_size(&self) -> [i64; 3] {
        self.sd_size
    }

    /// Total number of sub-domains.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Lower corner of the grid in the BD frame.
    #[must_use]
    pub const fn min_corner(&self) -> [i64; 3] {
        self.origin
    }

    /// Upper corner of the grid in the BD frame.
    #[must_use]
    pub fn max_corner(&self) -> [i64; 3] {
        let mut corner = self.origin;
        for axis in 0..3 {
            corner[axis] += self.sd_size[axis] * i64::from(self.dims[axis]);
        }
        corner
    }

    /// Flattens a coordinate, or returns [`SdIndex::NULL`] if it lies outside the grid.
    #[must_use]
    pub fn encode(&self, coord: SdCoord) -> SdIndex {
        let [x, y, z] = coord.as_array();
        let [nx, ny, nz] = self.dims;
        if x < 0 || y < 0 || z < 0 || x as u32 >= nx || y as u32 >= ny || z as u32 >= nz {
            return SdIndex::NULL;
        }
        SdIndex::new((x as u32 * ny + y as u32) * nz + z as u32)
    }

    /// Inverse of [`encode`](Self::encode).
    #[must_use]
    pub fn decode(&self, index: SdIndex) -> Option<SdCoord> {
        if index.is_null() || index.raw() >= self.count() {
            return None;
        }
        let [_, ny, nz] = self.dims;
        let raw = index.raw();
        let z = raw % nz;
        let y = (raw / nz) % ny;
        let x = raw / (ny * nz);
        Some(SdCoord::new(x as i32, y as i32, z as i32))
    }

    /// Unclamped cell index of `value` along `axis` (floor division).
    #[must_use]
    pub fn axis_cell(&self, axis: usize, value: i64) -> i64 {
        (value - self.origin[axis]).div_euclid(self.sd_size[axis])
    }

    fn clamped_cell(&self, axis: usize, value: i64) -> i32 {
        let last = i64::from(self.dims[axis]) - 1;
        self.axis_cell(axis, value).clamp(0, last) as i32
    }

    /// The sub-domain whose interior contains `pos`, clamped to the grid.
    #[must_use]
    pub fn locate(&self, pos: [i64; 3]) -> SdCoord {
        SdCoord::new(
            self.clamped_cell(0, pos[0]),
            self.clamped_cell(1, pos[1]),
            self.clamped_cell(2, pos[2]),
        )
    }

    /// Flattened index of [`locate`](Self::locate).
    #[must_use]
    pub fn owner(&self, pos: [i64; 3]) -> SdIndex {
        self.encode(self.locate(pos))
    }

    /// True if `pos` lies inside the grid without clamping.
    #[must_use]
    pub fn contains_point(&self, pos: [i64; 3]) -> bool {
        (0..3).all(|axis| {
            let cell = self.axis_cell(axis, pos[axis]);
            cell >= 0 && cell < i64::from(self.dims[axis])
        })
    }

    /// The sub-domains overlapped by a sphere's bounding box.
    ///
    /// Requires `2 * radius <= sd_size` on every axis so a sphere spans at
    /// most two cells per axis.
    #[must_use]
    pub fn touched_by_sphere(&self, center: [i64; 3], radius: i64) -> TouchedSubdomains {
        debug_assert!(self.sd_size.iter().all(|&s| 2 * radius <= s));

        let mut low = [0_i32; 3];
        let mut high = [0_i32; 3];
        for axis in 0..3 {
            low[axis] = self.clamped_cell(axis, center[axis] - radius);
            high[axis] = self.clamped_cell(axis, center[axis] + radius);
        }

        let mut slots = [SdIndex::NULL; 8];
        for (mask, slot) in slots.iter_mut().enumerate() {
            let mut cell = [0_i32; 3];
            let mut valid = true;
            for axis in 0..3 {
                if (mask >> axis) & 1 == 0 {
                    cell[axis] = low[axis];
                } else if high[axis] != low[axis] {
                    cell[axis] = high[axis];
                } else {
                    valid = false;
                }
            }
            if valid {
                *slot = self.encode(SdCoord::from(cell));
            }
        }
        TouchedSubdomains { slots }
    }

    /// Clamped range of sub-domains overlapped by the box `[min, max]`.
    #[must_use]
    pub fn bounds_for_box(&self, min: [i64; 3], max: [i64; 3]) -> GridBounds {
        GridBounds::new(self.locate(min), self.locate(max))
    }
}
