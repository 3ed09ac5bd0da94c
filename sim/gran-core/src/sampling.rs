//! Hexagonal-close-packed sampling of initial sphere positions.

use nalgebra::{Point3, Vector3};

/// Samples points on an HCP lattice.
///
/// Neighboring lattice points are `spacing` apart. A spacing slightly
/// above the sphere diameter (e.g. `2.4 r`) leaves a settling gap.
///
/// # Example
///
/// ```
/// use gran_core::sampling::HcpSampler;
/// use nalgebra::{Point3, Vector3};
///
/// let sampler = HcpSampler::new(1.0);
/// let points = sampler.sample_box(Point3::origin(), Vector3::new(2.0, 2.0, 2.0));
/// assert!(!points.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HcpSampler {
    spacing: f64,
}

impl HcpSampler {
    /// Sampler with the given nearest-neighbor distance.
    #[must_use]
    pub fn new(spacing: f64) -> Self {
        Self { spacing }
    }

    /// Nearest-neighbor distance.
    #[must_use]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Lattice points inside the closed box `center ± half_dims`.
    ///
    /// Points come out layer by layer (z), then row by row (y), then along
    /// x, so the order is reproducible. A non-positive spacing or negative
    /// extent yields no points.
    #[must_use]
    pub fn sample_box(&self, center: Point3<f64>, half_dims: Vector3<f64>) -> Vec<Point3<f64>> {
        let d = self.spacing;
        if !(d > 0.0) || half_dims.iter().any(|h| !(*h >= 0.0)) {
            return Vec::new();
        }
        let min = center - half_dims;
        let max = center + half_dims;
        let row_step = d * 3.0_f64.sqrt() / 2.0;
        let layer_step = d * (2.0_f64 / 3.0).sqrt();
        // Tolerance so faces that land exactly on the box are kept
        let eps = d * 1e-9;

        let mut points = Vec::new();
        let mut z = min.z;
        let mut layer = 0_usize;
        while z <= max.z + eps {
            let (layer_dx, layer_dy) = if layer % 2 == 1 {
                (d / 2.0, row_step / 3.0)
            } else {
                (0.0, 0.0)
            };
            let mut y = min.y + layer_dy;
            let mut row = 0_usize;
            while y <= max.y + eps {
                let row_dx = if row % 2 == 1 { d / 2.0 } else { 0.0 };
                let mut x = min.x + (layer_dx + row_dx) % d;
                while x <= max.x + eps {
                    points.push(Point3::new(x, y, z));
                    x += d;
                }
                y += row_step;
                row += 1;
            }
            z += layer_step;
            layer += 1;
        }
        points
    }
}
