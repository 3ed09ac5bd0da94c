//! Error types for sub-domain grid construction.

/// Errors that can occur while building a [`SubdomainGrid`](crate::SubdomainGrid).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SpatialError {
    /// Every axis needs at least one sub-domain.
    #[error("invalid sub-domain counts: {x}x{y}x{z}")]
    InvalidDimensions {
        /// Sub-domains along x.
        x: u32,
        /// Sub-domains along y.
        y: u32,
        /// Sub-domains along z.
        z: u32,
    },

    /// Sub-domain edge lengths must be positive.
    #[error("sub-domain edge along axis {axis} must be positive, got {size}")]
    InvalidSubdomainSize {
        /// Axis index (0 = x, 1 = y, 2 = z).
        axis: usize,
        /// The offending edge length in SU.
        size: i64,
    },

    /// The flattened index space does not fit below the sentinel.
    #[error("{count} sub-domains exceed the addressable index range")]
    TooManySubdomains {
        /// Requested number of sub-domains.
        count: u64,
    },

    /// The total grid extent overflowed the integer coordinate range.
    #[error("grid extent overflows the SU coordinate range")]
    ExtentOverflow,
}
