//! Error types for granular simulation.

use gran_spatial::SpatialError;
use thiserror::Error;

/// Errors that can occur while configuring or stepping a granular system.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid timestep.
    #[error("invalid timestep: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Physical inputs that cannot produce a usable unit system.
    #[error("degenerate unit scaling: {reason}")]
    DegenerateScaling {
        /// Which input was degenerate.
        reason: String,
    },

    /// Parallel input arrays disagree in length.
    #[error("mismatched lengths for {what}: expected {expected}, got {actual}")]
    MismatchedLengths {
        /// Name of the offending input.
        what: String,
        /// Length implied by the other inputs.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A sub-domain received more members than its fixed capacity.
    #[error("sub-domain {subdomain} overflow: {count} members exceed capacity {capacity}")]
    SubdomainOverflow {
        /// Flattened sub-domain index.
        subdomain: u32,
        /// Number of members that tried to register.
        count: u32,
        /// Fixed per-SD capacity.
        capacity: u32,
    },

    /// A sphere has more simultaneous contacts than its slot table holds.
    #[error("contact table full for sphere {sphere} (capacity {capacity})")]
    ContactTableFull {
        /// The sphere whose slots are exhausted.
        sphere: u32,
        /// Slots per sphere.
        capacity: usize,
    },

    /// A mesh file could not be read or parsed.
    #[error("mesh file {path}: {reason}")]
    MeshFile {
        /// Path as given by the caller.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// Stepping or querying before `initialize`.
    #[error("system has not been initialized")]
    NotInitialized,

    /// `initialize` called twice, or setup changed after it.
    #[error("system is already initialized")]
    AlreadyInitialized,

    /// Boundary handle that was never issued.
    #[error("unknown boundary condition: {0}")]
    UnknownBoundary(u32),

    /// Reaction force requested from a boundary created without tracking.
    #[error("boundary condition {0} does not track reaction forces")]
    UntrackedBoundary(u32),

    /// The system hit a fatal condition earlier and refuses to continue.
    #[error("system halted after fatal error: {cause}")]
    Poisoned {
        /// Display form of the original fatal error.
        cause: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a degenerate scaling error.
    #[must_use]
    pub fn degenerate_scaling(reason: impl Into<String>) -> Self {
        Self::DegenerateScaling {
            reason: reason.into(),
        }
    }

    /// Create a mismatched lengths error.
    #[must_use]
    pub fn mismatched_lengths(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::MismatchedLengths {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create a mesh file error.
    #[must_use]
    pub fn mesh_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MeshFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error reported before any stepping.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::InvalidTimestep(_)
                | Self::DegenerateScaling { .. }
                | Self::MismatchedLengths { .. }
                | Self::MeshFile { .. }
        )
    }

    /// Check if this error halts the simulation for good.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SubdomainOverflow { .. } | Self::ContactTableFull { .. } | Self::Poisoned { .. }
        )
    }
}

impl From<SpatialError> for SimError {
    fn from(err: SpatialError) -> Self {
        Self::invalid_config(err.to_string())
    }
}
