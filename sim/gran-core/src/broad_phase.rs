//! Sub-domain membership: which spheres and triangles each SD must consider.
//!
//! Rebuilt from scratch after every integration step. Spheres are processed
//! in batches of [`BATCH_SIZE`]; each batch sorts its `(sd, sphere)` pairs
//! by SD and performs one atomic reservation per run of equal SDs:
//!
//! ```text
//! batch pairs   (5,a) (2,a) (5,b) (2,c) (7,c)
//! sorted        (2,a) (2,c) (5,a) (5,b) (7,c)
//! runs          [2 x2]      [5 x2]      [7 x1]
//! reservations  counts[2] += 2, counts[5] += 2, counts[7] += 1
//! ```
//!
//! A sub-domain holds at most [`MAX_SPHERES_PER_SD`] spheres; exceeding it
//! is reported as [`SimError::SubdomainOverflow`] instead of dropping
//! members.
//!
//! Triangles are binned by their inflated bounding boxes with a
//! count / exclusive-prefix-sum / fill pass.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use gran_spatial::{SdIndex, SubdomainGrid};
use gran_types::{MAX_SPHERES_PER_SD, SimError};
use rayon::prelude::*;

/// Spheres per broadphase batch.
pub const BATCH_SIZE: usize = 128;

const NO_OVERFLOW: u64 = u64::MAX;

/// Per-SD sphere lists with fixed capacity.
#[derive(Debug)]
pub struct SdMembership {
    counts: Vec<AtomicU32>,
    members: Vec<AtomicU32>,
    touched: Vec<u8>,
    overflow: AtomicU64,
    key_passes: u32,
}

impl SdMembership {
    /// Empty membership for a grid of `subdomains` SDs and `spheres` spheres.
    #[must_use]
    pub fn new(subdomains: u32, spheres: usize) -> Self {
        let capacity = subdomains as usize * MAX_SPHERES_PER_SD as usize;
        Self {
            counts: (0..subdomains).map(|_| AtomicU32::new(0)).collect(),
            members: (0..capacity).map(|_| AtomicU32::new(u32::MAX)).collect(),
            touched: vec![0; spheres],
            overflow: AtomicU64::new(NO_OVERFLOW),
            key_passes: radix_passes(subdomains),
        }
    }

    /// Recomputes membership for world positions seen from a frame at `offset`.
    ///
    /// # Errors
    ///
    /// [`SimError::SubdomainOverflow`] for the first SD found over capacity.
    pub fn rebuild(
        &mut self,
        grid: &SubdomainGrid,
        positions: &[[i64; 3]],
        offset: [i64; 3],
        radius: i64,
    ) -> gran_types::Result<()> {
        self.counts
            .par_iter()
            .for_each(|count| count.store(0, Ordering::Relaxed));
        self.overflow.store(NO_OVERFLOW, Ordering::Relaxed);
        self.touched.resize(positions.len(), 0);

        let counts = &self.counts;
        let members = &self.members;
        let overflow = &self.overflow;
        let passes = self.key_passes;

        self.touched
            .par_chunks_mut(BATCH_SIZE)
            .zip(positions.par_chunks(BATCH_SIZE))
            .enumerate()
            .for_each(|(batch, (touched, positions))| {
                let first = batch * BATCH_SIZE;
                let mut pairs = Vec::with_capacity(positions.len() * 8);
                for (i, (n_touched, pos)) in touched.iter_mut().zip(positions).enumerate() {
                    let local = to_local(*pos, offset);
                    let sds = grid.touched_by_sphere(local, radius);
                    *n_touched = sds.len() as u8;
                    let sphere = (first + i) as u32;
                    pairs.extend(sds.iter().map(|sd| (sd.raw(), sphere)));
                }
                radix_sort_by_subdomain(&mut pairs, passes);

                for run in pairs.chunk_by(|a, b| a.0 == b.0) {
                    let sd = run[0].0;
                    let len = run.len() as u32;
                    let base = counts[sd as usize].fetch_add(len, Ordering::Relaxed);
                    if base + len > MAX_SPHERES_PER_SD {
                        let record = (u64::from(sd) << 32) | u64::from(base + len);
                        let _ = overflow.compare_exchange(
                            NO_OVERFLOW,
                            record,
                            Ordering::Relaxed,
                            Ordering::Relaxed,
                        );
                    }
                    let start = sd as usize * MAX_SPHERES_PER_SD as usize;
                    for (k, &(_, sphere)) in run.iter().enumerate() {
                        let slot = base + k as u32;
                        if slot < MAX_SPHERES_PER_SD {
                            members[start + slot as usize].store(sphere, Ordering::Relaxed);
                        }
                    }
                }
            });

        let record = self.overflow.load(Ordering::Relaxed);
        if record == NO_OVERFLOW {
            Ok(())
        } else {
            Err(SimError::SubdomainOverflow {
                subdomain: (record >> 32) as u32,
                count: record as u32,
                capacity: MAX_SPHERES_PER_SD,
            })
        }
    }

    /// Number of sub-domains.
    #[must_use]
    pub fn subdomain_count(&self) -> usize {
        self.counts.len()
    }

    /// Member count of `sd`, capped at capacity.
    #[must_use]
    pub fn count(&self, sd: u32) -> u32 {
        self.counts[sd as usize]
            .load(Ordering::Relaxed)
            .min(MAX_SPHERES_PER_SD)
    }

    /// Members of `sd`, in ascending sphere order.
    #[must_use]
    pub fn members(&self, sd: u32) -> Vec<u32> {
        let start = sd as usize * MAX_SPHERES_PER_SD as usize;
        let n = self.count(sd) as usize;
        let mut list: Vec<u32> = self.members[start..start + n]
            .iter()
            .map(|m| m.load(Ordering::Relaxed))
            .collect();
        list.sort_unstable();
        list
    }

    /// Number of SDs sphere `i` touched in the last rebuild.
    #[must_use]
    pub fn touched(&self, i: usize) -> u8 {
        self.touched[i]
    }

    /// Touch counts for every sphere.
    #[must_use]
    pub fn touched_counts(&self) -> &[u8] {
        &self.touched
    }

    /// Sum of member counts over all SDs.
    #[must_use]
    pub fn total_entries(&self) -> u64 {
        self.counts
            .par_iter()
            .map(|c| u64::from(c.load(Ordering::Relaxed).min(MAX_SPHERES_PER_SD)))
            .sum()
    }

    /// Largest member count over all SDs.
    #[must_use]
    pub fn max_occupancy(&self) -> u32 {
        self.counts
            .par_iter()
            .map(|c| c.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }
}

/// Position relative to the big-domain frame.
#[must_use]
pub fn to_local(pos: [i64; 3], offset: [i64; 3]) -> [i64; 3] {
    [pos[0] - offset[0], pos[1] - offset[1], pos[2] - offset[2]]
}

/// Number of 8-bit digits needed to sort SD keys below `subdomains`.
fn radix_passes(subdomains: u32) -> u32 {
    let bits = u32::BITS - subdomains.saturating_sub(1).leading_zeros();
    bits.div_ceil(8).max(1)
}

/// Stable LSD radix sort of `(sd, sphere)` pairs on the SD key.
fn radix_sort_by_subdomain(pairs: &mut Vec<(u32, u32)>, passes: u32) {
    let mut scratch = vec![(0_u32, 0_u32); pairs.len()];
    for pass in 0..passes {
        let shift = pass * 8;
        let mut offsets = [0_usize; 257];
        for &(key, _) in pairs.iter() {
            offsets[((key >> shift) & 0xff) as usize + 1] += 1;
        }
        for digit in 0..256 {
            offsets[digit + 1] += offsets[digit];
        }
        for &pair in pairs.iter() {
            let digit = ((pair.0 >> shift) & 0xff) as usize;
            scratch[offsets[digit]] = pair;
            offsets[digit] += 1;
        }
        std::mem::swap(pairs, &mut scratch);
    }
}

/// Triangles binned per SD in compressed rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriangleMembership {
    offsets: Vec<u32>,
    triangles: Vec<u32>,
}

impl TriangleMembership {
    /// Bins triangles by the SD range of their local-frame bounding boxes.
    ///
    /// `bounds[t]` is `(min, max)` of triangle `t`, already inflated.
    #[must_use]
    pub fn build(grid: &SubdomainGrid, bounds: &[([i64; 3], [i64; 3])]) -> Self {
        let n_sd = grid.count() as usize;
        let counts: Vec<AtomicU32> = (0..n_sd).map(|_| AtomicU32::new(0)).collect();

        bounds.par_iter().for_each(|&(min, max)| {
            for coord in grid.bounds_for_box(min, max).iter() {
                let sd = grid.encode(coord);
                counts[sd.as_usize()].fetch_add(1, Ordering::Relaxed);
            }
        });

        let mut offsets = Vec::with_capacity(n_sd + 1);
        let mut total = 0_u32;
        offsets.push(0);
        for count in &counts {
            total += count.load(Ordering::Relaxed);
            offsets.push(total);
        }

        let cursors: Vec<AtomicU32> = offsets[..n_sd]
            .iter()
            .map(|&start| AtomicU32::new(start))
            .collect();
        let slots: Vec<AtomicU32> = (0..total).map(|_| AtomicU32::new(0)).collect();
        bounds
            .par_iter()
            .enumerate()
            .for_each(|(triangle, &(min, max))| {
                for coord in grid.bounds_for_box(min, max).iter() {
                    let sd = grid.encode(coord);
                    let slot = cursors[sd.as_usize()].fetch_add(1, Ordering::Relaxed);
                    slots[slot as usize].store(triangle as u32, Ordering::Relaxed);
                }
            });

        let mut triangles: Vec<u32> = slots.into_iter().map(AtomicU32::into_inner).collect();
        for sd in 0..n_sd {
            triangles[offsets[sd] as usize..offsets[sd + 1] as usize].sort_unstable();
        }
        Self { offsets, triangles }
    }

    /// Triangles overlapping `sd`.
    #[must_use]
    pub fn triangles(&self, sd: SdIndex) -> &[u32] {
        let i = sd.as_usize();
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&start), Some(&end)) => &self.triangles[start as usize..end as usize],
            _ => &[],
        }
    }

    /// Total `(sd, triangle)` entries.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.triangles.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn grid() -> SubdomainGrid {
        // 4 x 4 x 4 SDs of 100 SU, spanning [-200, 200)
        SubdomainGrid::new([4, 4, 4], [100, 100, 100]).unwrap()
    }

    #[test]
    fn test_radix_sort_is_stable() {
        let mut pairs = vec![(300, 0), (2, 1), (300, 2), (1, 3), (2, 4), (70_000, 5)];
        radix_sort_by_subdomain(&mut pairs, radix_passes(70_001));
        assert_eq!(
            pairs,
            vec![(1, 3), (2, 1), (2, 4), (300, 0), (300, 2), (70_000, 5)]
        );
    }

    #[test]
    fn test_radix_passes() {
        assert_eq!(radix_passes(1), 1);
        assert_eq!(radix_passes(256), 1);
        assert_eq!(radix_passes(257), 2);
        assert_eq!(radix_passes(1 << 16), 2);
        assert_eq!(radix_passes((1 << 16) + 1), 3);
    }

    #[test]
    fn test_every_sphere_lands_somewhere() {
        let grid = grid();
        let positions: Vec<[i64; 3]> = (0..500)
            .map(|i: i64| [(i * 37) % 380 - 190, (i * 53) % 380 - 190, (i * 71) % 380 - 190])
            .collect();
        let mut membership = SdMembership::new(grid.count(), positions.len());
        membership.rebuild(&grid, &positions, [0; 3], 10).unwrap();

        let mut seen = vec![0_u32; positions.len()];
        for sd in 0..grid.count() {
            for sphere in membership.members(sd) {
                seen[sphere as usize] += 1;
            }
        }
        for (i, &count) in seen.iter().enumerate() {
            assert!(count >= 1, "sphere {i} is in no SD");
            assert_eq!(count, u32::from(membership.touched(i)));
        }
        let total: u64 = seen.iter().map(|&c| u64::from(c)).sum();
        assert_eq!(membership.total_entries(), total);
    }

    #[test]
    fn test_frame_offset_shifts_membership() {
        let grid = grid();
        let positions = vec![[1050, 50, 50]];
        let mut membership = SdMembership::new(grid.count(), 1);
        membership
            .rebuild(&grid, &positions, [1000, 0, 0], 10)
            .unwrap();
        let owner = grid.owner([50, 50, 50]);
        assert_eq!(membership.members(owner.raw()), vec![0]);
        assert_eq!(membership.touched(0), 1);
    }

    #[test]
    fn test_overflow_is_reported() {
        let grid = grid();
        let positions = vec![[50, 50, 50]; MAX_SPHERES_PER_SD as usize + 1];
        let mut membership = SdMembership::new(grid.count(), positions.len());
        let err = membership
            .rebuild(&grid, &positions, [0; 3], 10)
            .unwrap_err();
        assert!(err.is_fatal());
        let owner = grid.owner([50, 50, 50]);
        assert_eq!(
            err,
            SimError::SubdomainOverflow {
                subdomain: owner.raw(),
                count: MAX_SPHERES_PER_SD + 1,
                capacity: MAX_SPHERES_PER_SD,
            }
        );
    }

    #[test]
    fn test_triangle_binning() {
        let grid = grid();
        let bounds = vec![
            // Inside one SD
            ([10, 10, 10], [20, 20, 20]),
            // Straddles x = 0: two SDs
            ([-10, 10, 10], [10, 20, 20]),
        ];
        let bins = TriangleMembership::build(&grid, &bounds);
        assert_eq!(bins.total_entries(), 3);
        let home = grid.owner([15, 15, 15]);
        assert_eq!(bins.triangles(home), &[0, 1]);
        let left = grid.owner([-5, 15, 15]);
        assert_eq!(bins.triangles(left), &[1]);
        assert!(bins.triangles(SdIndex::NULL).is_empty());
    }
}
