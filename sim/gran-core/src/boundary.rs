//! Analytic boundary conditions: planes, spheres, cylinders, cones and boxes.
//!
//! Each shape reports, for a sphere center, the push-out normal and the
//! penetration depth. Shapes are given in world user units and scaled into
//! SU once a unit system exists. Reaction forces of tracked boundaries are
//! accumulated in fixed point during a step and read back in user units.

use std::sync::atomic::{AtomicI64, Ordering};

use gran_types::fixed::{self, LINEAR_FRACTION_BITS};
use gran_types::{BoundaryId, SimError, UnitSystem};
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Partner ids reserved for boundary conditions.
pub const MAX_BOUNDARY_CONDITIONS: usize = 64;

/// Implicit boundary geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoundaryShape {
    /// Half-space; spheres stay on the side `normal` points to.
    Plane {
        /// A point on the plane.
        point: Point3<f64>,
        /// Outward normal (normalized on creation).
        normal: Vector3<f64>,
    },
    /// Solid sphere; spheres stay outside.
    Sphere {
        /// Center.
        center: Point3<f64>,
        /// Radius.
        radius: f64,
    },
    /// Infinite cylinder along z; spheres stay inside.
    ZCylinder {
        /// Any point on the axis.
        center: Point3<f64>,
        /// Radius.
        radius: f64,
    },
    /// Cone along z opening upward from `tip`; spheres stay inside.
    ///
    /// The wall radius at height `z` is `slope * (z - tip.z)`. Only the band
    /// `z_min..=z_max` is solid.
    ZCone {
        /// Cone apex.
        tip: Point3<f64>,
        /// Radius gained per unit height.
        slope: f64,
        /// Lower end of the solid band.
        z_min: f64,
        /// Upper end of the solid band.
        z_max: f64,
    },
    /// Axis-aligned solid box; spheres stay outside.
    AaBox {
        /// Lower corner.
        min: Point3<f64>,
        /// Upper corner.
        max: Point3<f64>,
    },
}

/// A boundary contact: push-out normal, depth and contact point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryContact {
    /// Unit normal pointing from the boundary toward the sphere center.
    pub normal: Vector3<f64>,
    /// Penetration depth.
    pub penetration: f64,
}

impl BoundaryShape {
    /// Checks parameters and normalizes the plane normal.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] for non-finite values, non-positive
    /// radii, a zero normal, or an empty band or box.
    pub fn validated(self) -> gran_types::Result<Self> {
        let finite_point = |p: &Point3<f64>| p.coords.iter().all(|x| x.is_finite());
        let positive = |x: f64| x.is_finite() && x > 0.0;
        let bad = |what: &str| Err(SimError::invalid_config(format!("boundary {what}")));

        match self {
            Self::Plane { point, normal } => {
                let length = normal.norm();
                if !finite_point(&point) || !positive(length) {
                    return bad("plane needs a finite point and a non-zero normal");
                }
                Ok(Self::Plane {
                    point,
                    normal: normal / length,
                })
            }
            Self::Sphere { center, radius } | Self::ZCylinder { center, radius } => {
                if finite_point(&center) && positive(radius) {
                    Ok(self)
                } else {
                    bad("needs a finite center and a positive radius")
                }
            }
            Self::ZCone {
                tip,
                slope,
                z_min,
                z_max,
            } => {
                if finite_point(&tip) && positive(slope) && z_min.is_finite() && z_max > z_min {
                    Ok(self)
                } else {
                    bad("cone needs a positive slope and z_min < z_max")
                }
            }
            Self::AaBox { min, max } => {
                if finite_point(&min) && finite_point(&max) && (0..3).all(|k| max[k] > min[k]) {
                    Ok(self)
                } else {
                    bad("box needs min < max on every axis")
                }
            }
        }
    }

    /// The same shape with lengths divided by `length`.
    #[must_use]
    pub fn scaled(&self, length: f64) -> Self {
        let p = |p: &Point3<f64>| Point3::from(p.coords / length);
        match *self {
            Self::Plane { point, normal } => Self::Plane {
                point: p(&point),
                normal,
            },
            Self::Sphere { center, radius } => Self::Sphere {
                center: p(&center),
                radius: radius / length,
            },
            Self::ZCylinder { center, radius } => Self::ZCylinder {
                center: p(&center),
                radius: radius / length,
            },
            Self::ZCone {
                tip,
                slope,
                z_min,
                z_max,
            } => Self::ZCone {
                tip: p(&tip),
                slope,
                z_min: z_min / length,
                z_max: z_max / length,
            },
            Self::AaBox { min, max } => Self::AaBox {
                min: p(&min),
                max: p(&max),
            },
        }
    }

    /// Contact with a sphere of `radius` centered at `center`, if any.
    ///
    /// Works in any consistent length unit.
    #[must_use]
    pub fn contact(&self, center: &Point3<f64>, radius: f64) -> Option<BoundaryContact> {
        let hit = |normal: Vector3<f64>, penetration: f64| {
            (penetration > 0.0).then_some(BoundaryContact {
                normal,
                penetration,
            })
        };

        match *self {
            Self::Plane { point, normal } => {
                let height = (center - point).dot(&normal);
                hit(normal, radius - height)
            }
            Self::Sphere {
                center: c,
                radius: r,
            } => {
                let delta = center - c;
                let dist = delta.norm();
                if dist == 0.0 {
                    return None;
                }
                hit(delta / dist, r + radius - dist)
            }
            Self::ZCylinder {
                center: c,
                radius: r,
            } => {
                let radial = Vector3::new(center.x - c.x, center.y - c.y, 0.0);
                let rho = radial.norm();
                if rho == 0.0 {
                    return None;
                }
                hit(-radial / rho, rho + radius - r)
            }
            Self::ZCone {
                tip,
                slope,
                z_min,
                z_max,
            } => {
                if center.z < z_min || center.z > z_max {
                    return None;
                }
                let radial = Vector3::new(center.x - tip.x, center.y - tip.y, 0.0);
                let rho = radial.norm();
                let height = center.z - tip.z;
                let slant = (1.0 + slope * slope).sqrt();
                // Signed distance to the wall, positive outside the cone
                let outside = (rho - slope * height) / slant;
                // On the axis the wall surrounds the sphere and the radial parts cancel
                let normal = if rho > 0.0 {
                    (-radial / rho + Vector3::z() * slope) / slant
                } else {
                    Vector3::z()
                };
                hit(normal, radius + outside)
            }
            Self::AaBox { min, max } => {
                let clamped = Point3::new(
                    center.x.clamp(min.x, max.x),
                    center.y.clamp(min.y, max.y),
                    center.z.clamp(min.z, max.z),
                );
                let delta = center - clamped;
                let dist = delta.norm();
                if dist > 0.0 {
                    return hit(delta / dist, radius - dist);
                }
                // Center inside: leave through the nearest face
                let mut best = (f64::INFINITY, Vector3::zeros());
                for axis in 0..3 {
                    let to_min = center[axis] - min[axis];
                    let to_max = max[axis] - center[axis];
                    if to_min < best.0 {
                        best = (to_min, -Vector3::ith(axis, 1.0));
                    }
                    if to_max < best.0 {
                        best = (to_max, Vector3::ith(axis, 1.0));
                    }
                }
                hit(best.1, radius + best.0)
            }
        }
    }
}

/// One registered boundary condition.
#[derive(Debug)]
pub struct Boundary {
    shape: BoundaryShape,
    scaled: Option<BoundaryShape>,
    active: bool,
    track_forces: bool,
    reaction: [AtomicI64; 3],
}

impl Boundary {
    /// World shape in user units.
    #[must_use]
    pub const fn shape(&self) -> &BoundaryShape {
        &self.shape
    }

    /// Shape in SU, once a unit system exists.
    #[must_use]
    pub const fn scaled_shape(&self) -> Option<&BoundaryShape> {
        self.scaled.as_ref()
    }

    /// Whether the boundary currently takes part in contact.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Whether reaction forces are accumulated.
    #[must_use]
    pub const fn tracks_forces(&self) -> bool {
        self.track_forces
    }

    /// Adds a quantized force exerted *on* the boundary.
    pub fn add_reaction(&self, q: [i64; 3]) {
        if self.track_forces {
            for (slot, value) in self.reaction.iter().zip(q) {
                slot.fetch_add(value, Ordering::Relaxed);
            }
        }
    }

    fn reaction_su(&self) -> Vector3<f64> {
        fixed::vector_from_fixed(
            std::array::from_fn(|k| self.reaction[k].load(Ordering::Relaxed)),
            LINEAR_FRACTION_BITS,
        )
    }
}

/// All boundary conditions of a system, indexed by [`BoundaryId`].
#[derive(Debug, Default)]
pub struct BoundarySet {
    boundaries: Vec<Boundary>,
}

impl BoundarySet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an active boundary. `units` scales it immediately when known.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidConfig`] for a malformed shape or when
    /// [`MAX_BOUNDARY_CONDITIONS`] are already registered.
    pub fn add(
        &mut self,
        shape: BoundaryShape,
        track_forces: bool,
        units: Option<&UnitSystem>,
    ) -> gran_types::Result<BoundaryId> {
        if self.boundaries.len() >= MAX_BOUNDARY_CONDITIONS {
            return Err(SimError::invalid_config(format!(
                "at most {MAX_BOUNDARY_CONDITIONS} boundary conditions are supported"
            )));
        }
        let shape = shape.validated()?;
        let id = BoundaryId::new(self.boundaries.len() as u32);
        self.boundaries.push(Boundary {
            shape,
            scaled: units.map(|u| shape.scaled(u.length())),
            active: true,
            track_forces,
            reaction: std::array::from_fn(|_| AtomicI64::new(0)),
        });
        Ok(id)
    }

    /// Scales every boundary into SU.
    pub fn scale_all(&mut self, units: &UnitSystem) {
        for boundary in &mut self.boundaries {
            boundary.scaled = Some(boundary.shape.scaled(units.length()));
        }
    }

    /// Looks up a boundary.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownBoundary`] for an id never returned by [`add`](Self::add).
    pub fn get(&self, id: BoundaryId) -> gran_types::Result<&Boundary> {
        self.boundaries
            .get(id.index())
            .ok_or(SimError::UnknownBoundary(id.raw()))
    }

    /// Turns a boundary on or off.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownBoundary`] for an unknown id.
    pub fn set_active(&mut self, id: BoundaryId, active: bool) -> gran_types::Result<()> {
        let boundary = self
            .boundaries
            .get_mut(id.index())
            .ok_or(SimError::UnknownBoundary(id.raw()))?;
        boundary.active = active;
        Ok(())
    }

    /// Force the spheres exerted on boundary `id` during the last step, in user units.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownBoundary`] or [`SimError::UntrackedBoundary`].
    pub fn reaction_force(
        &self,
        id: BoundaryId,
        units: &UnitSystem,
    ) -> gran_types::Result<Vector3<f64>> {
        let boundary = self.get(id)?;
        if !boundary.track_forces {
            return Err(SimError::UntrackedBoundary(id.raw()));
        }
        Ok(units.force_to_uu(&boundary.reaction_su()))
    }

    /// Zeroes every reaction accumulator.
    pub fn clear_reactions(&self) {
        for boundary in &self.boundaries {
            for slot in &boundary.reaction {
                slot.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Iterates `(index, boundary)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Boundary)> {
        self.boundaries
            .iter()
            .enumerate()
            .map(|(i, b)| (i as u32, b))
    }

    /// Number of registered boundaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// True if none are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}
