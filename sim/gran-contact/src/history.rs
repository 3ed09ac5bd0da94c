//! Persistent per-sphere contact slot table.
//!
//! Each sphere owns a fixed stride of [`MAX_CONTACTS_PER_SPHERE`] slots.
//! A slot holds the partner id (or a free marker), an "active this step"
//! flag and, for multi-step friction, the tangential displacement history:
//!
//! ```text
//! sphere 0: [ p=7 active | p=FREE | p=12 | ... ]   (stride slots)
//! sphere 1: [ p=FREE     | ...                 ]
//! ```
//!
//! Lifecycle of a slot:
//!
//! 1. claimed by compare-and-swap on the free marker at first contact,
//! 2. re-marked active every step the contact persists,
//! 3. released by [`ContactTable::end_step`] the first step nobody marked it.
//!
//! Claims race only between *different* partners of the same sphere: the
//! contact kernel resolves each pair in exactly one sub-domain, so no two
//! workers ever look up the same `(sphere, partner)` in one step.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use gran_types::SimError;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Slots per sphere.
///
/// Equal spheres have at most 12 sphere neighbors; the rest covers walls,
/// boundary conditions and mesh triangles.
pub const MAX_CONTACTS_PER_SPHERE: usize = 24;

const FREE: u32 = u32::MAX;

/// Handle of one claimed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContactSlot(usize);

impl ContactSlot {
    /// Global slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Fixed-capacity open-addressed contact map with atomic claim.
#[derive(Debug)]
pub struct ContactTable {
    spheres: usize,
    partners: Vec<AtomicU32>,
    active: Vec<AtomicBool>,
    history: Vec<[AtomicU64; 3]>,
}

impl ContactTable {
    /// Allocates an empty table for `spheres` spheres.
    #[must_use]
    pub fn new(spheres: usize) -> Self {
        let slots = spheres * MAX_CONTACTS_PER_SPHERE;
        Self {
            spheres,
            partners: (0..slots).map(|_| AtomicU32::new(FREE)).collect(),
            active: (0..slots).map(|_| AtomicBool::new(false)).collect(),
            history: (0..slots)
                .map(|_| std::array::from_fn(|_| AtomicU64::new(0)))
                .collect(),
        }
    }

    /// Number of spheres covered.
    #[must_use]
    pub const fn sphere_count(&self) -> usize {
        self.spheres
    }

    fn range(sphere: u32) -> std::ops::Range<usize> {
        let base = sphere as usize * MAX_CONTACTS_PER_SPHERE;
        base..base + MAX_CONTACTS_PER_SPHERE
    }

    /// Existing slot for `(sphere, partner)`, if any.
    #[must_use]
    pub fn find(&self, sphere: u32, partner: u32) -> Option<ContactSlot> {
        Self::range(sphere)
            .find(|&slot| self.partners[slot].load(Ordering::Relaxed) == partner)
            .map(ContactSlot)
    }

    /// Finds or claims the slot for `(sphere, partner)` and marks it active.
    ///
    /// A freshly claimed slot starts with zero history.
    ///
    /// # Errors
    ///
    /// [`SimError::ContactTableFull`] when every slot of `sphere` holds
    /// another partner.
    pub fn claim(&self, sphere: u32, partner: u32) -> gran_types::Result<ContactSlot> {
        if let Some(slot) = self.find(sphere, partner) {
            self.active[slot.0].store(true, Ordering::Relaxed);
            return Ok(slot);
        }

        for slot in Self::range(sphere) {
            if self.partners[slot]
                .compare_exchange(FREE, partner, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                for word in &self.history[slot] {
                    word.store(0, Ordering::Relaxed);
                }
                self.active[slot].store(true, Ordering::Relaxed);
                return Ok(ContactSlot(slot));
            }
        }

        Err(SimError::ContactTableFull {
            sphere,
            capacity: MAX_CONTACTS_PER_SPHERE,
        })
    }

    /// Tangential displacement history of a slot.
    #[must_use]
    pub fn history(&self, slot: ContactSlot) -> Vector3<f64> {
        let [x, y, z] = &self.history[slot.0];
        Vector3::new(
            f64::from_bits(x.load(Ordering::Relaxed)),
            f64::from_bits(y.load(Ordering::Relaxed)),
            f64::from_bits(z.load(Ordering::Relaxed)),
        )
    }

    /// Stores the tangential displacement history of a slot.
    pub fn set_history(&self, slot: ContactSlot, value: &Vector3<f64>) {
        for (word, component) in self.history[slot.0].iter().zip(value.iter()) {
            word.store(component.to_bits(), Ordering::Relaxed);
        }
    }

    /// Partner ids currently holding a slot of `sphere`, in slot order.
    #[must_use]
    pub fn partners_of(&self, sphere: u32) -> Vec<u32> {
        Self::range(sphere)
            .map(|slot| self.partners[slot].load(Ordering::Relaxed))
            .filter(|&p| p != FREE)
            .collect()
    }

    /// Total claimed slots.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.partners
            .par_iter()
            .filter(|p| p.load(Ordering::Relaxed) != FREE)
            .count()
    }

    /// Releases every slot not marked this step and clears the marks.
    ///
    /// Returns the number of released slots.
    pub fn end_step(&self) -> usize {
        self.partners
            .par_chunks(MAX_CONTACTS_PER_SPHERE)
            .zip(self.active.par_chunks(MAX_CONTACTS_PER_SPHERE))
            .zip(self.history.par_chunks(MAX_CONTACTS_PER_SPHERE))
            .map(|((partners, active), history)| {
                let mut released = 0;
                for ((partner, flag), words) in partners.iter().zip(active).zip(history) {
                    if partner.load(Ordering::Relaxed) == FREE {
                        continue;
                    }
                    if !flag.swap(false, Ordering::Relaxed) {
                        partner.store(FREE, Ordering::Relaxed);
                        for word in words {
                            word.store(0, Ordering::Relaxed);
                        }
                        released += 1;
                    }
                }
                released
            })
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_then_find() {
        let table = ContactTable::new(4);
        let slot = table.claim(1, 3).unwrap();
        assert_eq!(table.find(1, 3), Some(slot));
        assert_eq!(table.find(1, 2), None);
        assert_eq!(table.find(0, 3), None);
        // Re-claiming returns the same slot
        assert_eq!(table.claim(1, 3).unwrap(), slot);
        assert_eq!(table.claimed(), 1);
        assert_eq!(table.partners_of(1), vec![3]);
    }

    #[test]
    fn test_slot_lifecycle() {
        let table = ContactTable::new(2);
        let slot = table.claim(0, 1).unwrap();
        table.set_history(slot, &Vector3::new(1.0, -2.0, 0.5));

        // Marked this step: survives, history intact
        assert_eq!(table.end_step(), 0);
        assert_eq!(table.history(slot), Vector3::new(1.0, -2.0, 0.5));

        // Marked again next step
        let again = table.claim(0, 1).unwrap();
        assert_eq!(again, slot);
        assert_eq!(table.end_step(), 0);

        // Not marked: released exactly now
        assert_eq!(table.end_step(), 1);
        assert_eq!(table.find(0, 1), None);
        assert_eq!(table.history(slot), Vector3::zeros());
        assert_eq!(table.claimed(), 0);
    }

    #[test]
    fn test_fresh_claim_has_zero_history() {
        let table = ContactTable::new(1);
        let slot = table.claim(0, 9).unwrap();
        table.set_history(slot, &Vector3::new(3.0, 3.0, 3.0));
        let _ = table.end_step();
        let _ = table.end_step();
        let reused = table.claim(0, 5).unwrap();
        assert_eq!(table.history(reused), Vector3::zeros());
    }

    #[test]
    fn test_table_full_is_fatal() {
        let table = ContactTable::new(1);
        for partner in 0..MAX_CONTACTS_PER_SPHERE as u32 {
            table.claim(0, partner + 100).unwrap();
        }
        let err = table.claim(0, 7).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err,
            SimError::ContactTableFull {
                sphere: 0,
                capacity: MAX_CONTACTS_PER_SPHERE,
            }
        );
    }

    #[test]
    fn test_concurrent_claims_get_distinct_slots() {
        let table = ContactTable::new(1);
        let slots: Vec<_> = (0..MAX_CONTACTS_PER_SPHERE as u32)
            .into_par_iter()
            .map(|partner| table.claim(0, partner).unwrap())
            .collect();
        let mut indices: Vec<_> = slots.iter().map(|s| s.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        assert_eq!(indices.len(), MAX_CONTACTS_PER_SPHERE);
        for partner in 0..MAX_CONTACTS_PER_SPHERE as u32 {
            assert!(table.find(0, partner).is_some());
        }
    }
}
