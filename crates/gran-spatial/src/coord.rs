//! Sub-domain coordinate and index types.

/// Integer triplet addressing one sub-domain in the grid.
///
/// Components are signed so intermediate results of floor division below
/// the grid origin can be represented before clamping.
///
/// # Example
///
/// ```
/// use gran_spatial::SdCoord;
///
/// let coord = SdCoord::new(1, 2, 3);
/// assert_eq!(coord.as_array(), [1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SdCoord {
    /// Index along x.
    pub x: i32,
    /// Index along y.
    pub y: i32,
    /// Index along z.
    pub z: i32,
}

impl SdCoord {
    /// Creates a new sub-domain coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the components as `[x, y, z]`.
    #[must_use]
    pub const fn as_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Component along `axis` (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub const fn axis(self, axis: usize) -> i32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl From<[i32; 3]> for SdCoord {
    fn from(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

impl From<SdCoord> for [i32; 3] {
    fn from(coord: SdCoord) -> Self {
        coord.as_array()
    }
}

/// Flattened row-major sub-domain index, `x * nY * nZ + y * nZ + z`.
///
/// [`SdIndex::NULL`] marks "no sub-domain" in fixed-size candidate lists.
///
/// ```
/// use gran_spatial::SdIndex;
///
/// assert!(SdIndex::NULL.is_null());
/// assert!(!SdIndex::new(0).is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SdIndex(pub u32);

impl SdIndex {
    /// Sentinel for an absent or invalid sub-domain.
    pub const NULL: Self = Self(u32::MAX);

    /// Wraps a raw index.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw index value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index as `usize` for slicing per-SD arrays.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// True for the sentinel.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl std::fmt::Display for SdIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "SD(null)")
        } else {
            write!(f, "SD({})", self.0)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_conversions() {
        let coord = SdCoord::from([4, -1, 7]);
        assert_eq!(coord.axis(0), 4);
        assert_eq!(coord.axis(1), -1);
        assert_eq!(coord.axis(2), 7);
        let arr: [i32; 3] = coord.into();
        assert_eq!(arr, [4, -1, 7]);
    }

    #[test]
    fn test_index_display() {
        assert_eq!(SdIndex::new(12).to_string(), "SD(12)");
        assert_eq!(SdIndex::NULL.to_string(), "SD(null)");
        assert_eq!(SdIndex::new(12).as_usize(), 12);
    }
}
