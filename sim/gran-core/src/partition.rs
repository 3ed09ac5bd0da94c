//! Domain partitioner: sizes the sub-domain grid from the configuration.
//!
//! Per axis, with `d = 2 r * spheres_per_sd`:
//!
//! ```text
//! n    = ceil(box / d), bumped to the next even number
//! edge = ceil((box / n) / L)          (whole SU)
//! ```
//!
//! An even count keeps the frame origin on an SD boundary, so the grid
//! spans `[-n * edge / 2, n * edge / 2)` on every axis.

use gran_spatial::SubdomainGrid;
use gran_types::{GranularConfig, SimError, UnitSystem};
use tracing::debug;

/// Sub-domain grid plus the sphere radius it was sized for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPartition {
    grid: SubdomainGrid,
    radius: i64,
}

impl DomainPartition {
    /// Sizes the grid for `config` under `units`.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] if an SD would be narrower than one
    /// sphere diameter or the grid is too large to index.
    pub fn compute(config: &GranularConfig, units: &UnitSystem) -> gran_types::Result<Self> {
        let radius = units.length_to_su_int(config.sphere_radius);
        let mut dims = [0_u32; 3];
        let mut sd_size = [0_i64; 3];

        for axis in 0..3 {
            let extent = config.box_dims[axis];
            let target = 2.0 * config.sphere_radius * config.spheres_per_sd[axis];
            let count = (extent / target).ceil().max(1.0);
            if count > f64::from(u32::MAX / 2) {
                return Err(SimError::invalid_config(format!(
                    "box axis {axis} needs {count} sub-domains"
                )));
            }
            let mut count = count as u32;
            if count % 2 == 1 {
                count += 1;
            }
            let edge = (units.length_to_su(extent / f64::from(count))).ceil() as i64;
            if edge < 2 * radius {
                return Err(SimError::invalid_config(format!(
                    "sub-domain edge on axis {axis} is {edge} SU, below one sphere diameter ({} SU)",
                    2 * radius
                )));
            }
            dims[axis] = count;
            sd_size[axis] = edge;
        }

        let grid = SubdomainGrid::new(dims, sd_size)?;
        debug!(
            dims = ?dims,
            sd_size = ?sd_size,
            radius_su = radius,
            "partitioned big domain"
        );
        Ok(Self { grid, radius })
    }

    /// The sub-domain grid.
    #[must_use]
    pub const fn grid(&self) -> &SubdomainGrid {
        &self.grid
    }

    /// Sphere radius in whole SU.
    #[must_use]
    pub const fn radius(&self) -> i64 {
        self.radius
    }

    /// Total number of sub-domains.
    #[must_use]
    pub fn subdomain_count(&self) -> u32 {
        self.grid.count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn layout(config: &GranularConfig) -> DomainPartition {
        let units = UnitSystem::derive(&config.scaling_inputs()).unwrap();
        DomainPartition::compute(config, &units).unwrap()
    }

    #[test]
    fn test_counts_are_even() {
        // d = 4 on every axis: 20 / 4 = 5 -> 6, 40 / 4 = 10
        let config = GranularConfig::new(0.5, 2.5, Vector3::new(20.0, 20.0, 40.0));
        let partition = layout(&config);
        assert_eq!(partition.grid().dims(), [6, 6, 10]);
    }

    #[test]
    fn test_grid_covers_box() {
        let config = GranularConfig::new(0.5, 2.5, Vector3::new(20.0, 12.0, 30.0));
        let units = UnitSystem::derive(&config.scaling_inputs()).unwrap();
        let partition = DomainPartition::compute(&config, &units).unwrap();
        let grid = partition.grid();
        let max = grid.max_corner();
        let min = grid.min_corner();
        for axis in 0..3 {
            let covered = (max[axis] - min[axis]) as f64;
            let wanted = units.length_to_su(config.box_dims[axis]);
            assert!(covered >= wanted);
            // Rounding adds less than one SU per sub-domain
            assert!(covered - wanted <= f64::from(grid.dims()[axis]));
            // Centered on the frame origin
            assert_eq!(min[axis], -max[axis]);
        }
        for size in grid.sd_size() {
            assert!(size >= 2 * partition.radius());
        }
    }

    #[test]
    fn test_rejects_subdomains_thinner_than_a_sphere() {
        // One sphere across: n = 1 -> 2, each SD half a diameter
        let config = GranularConfig::new(0.5, 2.5, Vector3::new(1.0, 20.0, 20.0))
            .spheres_per_sd([1.0, 4.0, 4.0]);
        let units = UnitSystem::derive(&config.scaling_inputs()).unwrap();
        let err = DomainPartition::compute(&config, &units).unwrap_err();
        assert!(err.is_config_error());
    }
}
