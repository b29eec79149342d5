//! The open-addressed core: a dense entry vector indexed by a
//! power-of-two offset table.
//!
//! Probing walks `offsets`; `entries` holds the records in insertion
//! order. A removed record leaves its slot present-but-empty so probe
//! chains running through it stay intact; empty slots are purged when
//! the offset table is rebuilt. All lookups hand back indices, never
//! entry pointers, so callers cannot hold a dangling position across a
//! rebuild.

use std::rc::Rc;

use crate::entry::Entry;
use crate::error::Error;
use crate::key::{Key, KeyView};

pub(crate) const MIN_BUCKETS: usize = 8;
const PERTURB_SHIFT: u32 = 5;

/// One position in the dense entry vector. `entry` is `None` for a
/// slot whose record was removed; `hash` is meaningful only while the
/// slot is occupied.
pub(crate) struct Slot<V> {
    pub(crate) hash: u64,
    pub(crate) entry: Option<Entry<V>>,
}

/// Where `find_insertion` says the key should go.
pub(crate) enum Insertion {
    /// Key present at this slot.
    Match { slot: usize },
    /// Key absent; reuse this empty slot, which the offset table
    /// already references.
    Tombstone { slot: usize },
    /// Key absent; append a new slot and publish it at `probe`.
    Fresh { probe: usize },
}

pub(crate) struct Core<V> {
    entries: Vec<Slot<V>>,
    offsets: Vec<isize>,
    mask: usize,
    occupied: usize,
}

impl<V> Core<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            offsets: vec![-1; MIN_BUCKETS],
            mask: MIN_BUCKETS - 1,
            occupied: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.occupied
    }

    /// Physical slots, occupied and empty.
    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    fn first_probe(&self, hash: u64) -> (usize, u64) {
        ((hash as usize) & self.mask, hash)
    }

    #[inline]
    fn next_probe(&self, idx: usize, perturb: &mut u64) -> usize {
        *perturb >>= PERTURB_SHIFT;
        idx.wrapping_mul(5)
            .wrapping_add(5)
            .wrapping_add(*perturb as usize)
            & self.mask
    }

    /// Probe for `view`'s key. Returns the slot index when present.
    pub(crate) fn find_existing(&self, view: &KeyView<'_>) -> Option<usize> {
        let (mut i, mut perturb) = self.first_probe(view.hash);
        loop {
            let ofs = self.offsets[i];
            if ofs < 0 {
                return None;
            }
            let slot = ofs as usize;
            if let Some(entry) = &self.entries[slot].entry {
                if self.entries[slot].hash == view.hash && entry.matches(view) {
                    return Some(slot);
                }
            }
            i = self.next_probe(i, &mut perturb);
        }
    }

    /// Probe for `view`'s key, remembering the first empty slot passed
    /// so a removal's slot is reused before the entry vector grows.
    pub(crate) fn find_insertion(&self, view: &KeyView<'_>) -> Insertion {
        let mut first_empty: Option<usize> = None;
        let (mut i, mut perturb) = self.first_probe(view.hash);
        loop {
            let ofs = self.offsets[i];
            if ofs < 0 {
                return match first_empty {
                    Some(slot) => Insertion::Tombstone { slot },
                    None => Insertion::Fresh { probe: i },
                };
            }
            let slot = ofs as usize;
            match &self.entries[slot].entry {
                None => {
                    if first_empty.is_none() {
                        first_empty = Some(slot);
                    }
                }
                Some(entry) => {
                    if self.entries[slot].hash == view.hash && entry.matches(view) {
                        return Insertion::Match { slot };
                    }
                }
            }
            i = self.next_probe(i, &mut perturb);
        }
    }

    #[inline]
    fn over_load(&self, occupied: usize) -> bool {
        occupied * 3 >= self.offsets.len() * 2
    }

    /// Reserve everything one more occupied entry could need, so the
    /// mutation and any rebuild that follows cannot fail. Returns
    /// whether the caller must rebuild after publishing.
    fn ensure_room(&mut self, appending: bool) -> Result<bool, Error> {
        let will_grow = self.over_load(self.occupied + 1);
        if will_grow {
            let doubled = self
                .offsets
                .len()
                .checked_mul(2)
                .ok_or(Error::CapacityOverflow)?;
            self.offsets
                .try_reserve(doubled - self.offsets.len())
                .map_err(|_| Error::AllocationFailed)?;
        }
        if appending {
            self.entries
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailed)?;
        }
        Ok(will_grow)
    }

    /// Append a new entry and publish its index at `probe` (which
    /// `find_insertion` reported as free). On error nothing changed.
    pub(crate) fn insert_fresh(
        &mut self,
        probe: usize,
        view: &KeyView<'_>,
        origin: Option<Rc<Key>>,
        value: Rc<V>,
    ) -> Result<(), Error> {
        let rebuild = self.ensure_room(true)?;
        let entry = Entry::new(view, origin, value)?;
        debug_assert_eq!(self.offsets[probe], -1);
        self.entries.push(Slot {
            hash: view.hash,
            entry: Some(entry),
        });
        self.offsets[probe] = (self.entries.len() - 1) as isize;
        self.occupied += 1;
        if rebuild {
            self.rebuild(self.offsets.len() * 2);
        }
        Ok(())
    }

    /// Fill the empty slot `find_insertion` reported. The slot is
    /// already reachable through the offset table. On error nothing
    /// changed.
    pub(crate) fn insert_tombstone(
        &mut self,
        slot: usize,
        view: &KeyView<'_>,
        origin: Option<Rc<Key>>,
        value: Rc<V>,
    ) -> Result<(), Error> {
        let rebuild = self.ensure_room(false)?;
        let entry = Entry::new(view, origin, value)?;
        let s = &mut self.entries[slot];
        debug_assert!(s.entry.is_none());
        s.hash = view.hash;
        s.entry = Some(entry);
        self.occupied += 1;
        if rebuild {
            self.rebuild(self.offsets.len() * 2);
        }
        Ok(())
    }

    /// Take the record out of an occupied slot, leaving the empty slot
    /// in place so probe chains keep flowing through it.
    pub(crate) fn take_entry(&mut self, slot: usize) -> Entry<V> {
        self.occupied -= 1;
        self.entries[slot]
            .entry
            .take()
            .expect("slot must be occupied")
    }

    pub(crate) fn entry_at(&self, slot: usize) -> &Entry<V> {
        self.entries[slot]
            .entry
            .as_ref()
            .expect("slot must be occupied")
    }

    pub(crate) fn entry_mut(&mut self, slot: usize) -> &mut Entry<V> {
        self.entries[slot]
            .entry
            .as_mut()
            .expect("slot must be occupied")
    }

    /// Reset the offset table to `buckets` entries, purge empty slots
    /// (stable, order-preserving), and re-probe every survivor.
    /// Capacity for `buckets` must already be reserved.
    fn rebuild(&mut self, buckets: usize) {
        debug_assert!(buckets.is_power_of_two() && buckets >= MIN_BUCKETS);
        debug_assert!(self.offsets.capacity() >= buckets);
        self.offsets.clear();
        self.offsets.resize(buckets, -1);
        self.mask = buckets - 1;
        if self.occupied != self.entries.len() {
            self.entries.retain(|slot| slot.entry.is_some());
        }
        debug_assert_eq!(self.entries.len(), self.occupied);
        for idx in 0..self.entries.len() {
            let (mut i, mut perturb) = self.first_probe(self.entries[idx].hash);
            while self.offsets[i] >= 0 {
                i = self.next_probe(i, &mut perturb);
            }
            self.offsets[i] = idx as isize;
        }
    }

    /// Grow for `total` occupied entries up front: the smallest
    /// power-of-two bucket count keeping the load factor under two
    /// thirds, with the entry vector reserved to match.
    pub(crate) fn reserve_total(&mut self, total: usize) -> Result<(), Error> {
        if total == 0 {
            return Ok(());
        }
        let needed = total
            .checked_mul(3)
            .map(|x| x / 2 + 1)
            .and_then(usize::checked_next_power_of_two)
            .ok_or(Error::CapacityOverflow)?
            .max(MIN_BUCKETS);
        self.entries
            .try_reserve(total.saturating_sub(self.entries.len()))
            .map_err(|_| Error::AllocationFailed)?;
        if needed > self.offsets.len() {
            self.offsets
                .try_reserve(needed - self.offsets.len())
                .map_err(|_| Error::AllocationFailed)?;
            self.rebuild(needed);
        }
        Ok(())
    }

    /// Reset to the minimum shape and hand the drained slots back; the
    /// caller drops them once the table is consistent, so value
    /// destructors can never observe a half-cleared table.
    pub(crate) fn clear(&mut self) -> Vec<Slot<V>> {
        if self.occupied == 0 && self.entries.is_empty() {
            return Vec::new();
        }
        let drained = std::mem::take(&mut self.entries);
        self.occupied = 0;
        self.offsets.truncate(MIN_BUCKETS);
        self.offsets.shrink_to_fit();
        self.offsets.fill(-1);
        self.mask = MIN_BUCKETS - 1;
        drained
    }

    /// First occupied slot in insertion order, i.e. the oldest
    /// surviving record.
    pub(crate) fn first_occupied(&self) -> Option<usize> {
        self.entries.iter().position(|slot| slot.entry.is_some())
    }

    pub(crate) fn occupied_entries(&self) -> impl Iterator<Item = &Entry<V>> {
        self.entries.iter().filter_map(|slot| slot.entry.as_ref())
    }

    /// Deep copy: duplicated blocks, identical layout. The copy probes
    /// exactly like the original because stored hashes and offsets are
    /// carried over verbatim.
    pub(crate) fn try_duplicate(&self) -> Result<Self, Error> {
        let mut entries = Vec::new();
        entries
            .try_reserve(self.entries.len())
            .map_err(|_| Error::AllocationFailed)?;
        for slot in &self.entries {
            let entry = match &slot.entry {
                Some(e) => Some(e.duplicate()?),
                None => None,
            };
            entries.push(Slot {
                hash: slot.hash,
                entry,
            });
        }
        let mut offsets = Vec::new();
        offsets
            .try_reserve(self.offsets.len())
            .map_err(|_| Error::AllocationFailed)?;
        offsets.extend_from_slice(&self.offsets);
        Ok(Core {
            entries,
            offsets,
            mask: self.mask,
            occupied: self.occupied,
        })
    }

    /// Heap bytes held by the table: both vectors plus every entry
    /// block.
    pub(crate) fn allocated_bytes(&self) -> usize {
        self.entries.capacity() * std::mem::size_of::<Slot<V>>()
            + self.offsets.capacity() * std::mem::size_of::<isize>()
            + self.occupied_entries().map(Entry::block_size).sum::<usize>()
    }

    /// Structural integrity check used by the property tests.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        use std::collections::HashSet;

        assert!(self.offsets.len().is_power_of_two());
        assert!(self.offsets.len() >= MIN_BUCKETS);
        assert_eq!(self.mask + 1, self.offsets.len());

        let live = self
            .entries
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count();
        assert_eq!(live, self.occupied, "occupied count drifted");
        assert!(
            self.occupied * 3 < self.offsets.len() * 2,
            "load factor at or above two thirds"
        );

        let mut indexed = HashSet::new();
        for (i, &ofs) in self.offsets.iter().enumerate() {
            if ofs < 0 {
                continue;
            }
            let slot = ofs as usize;
            assert!(slot < self.entries.len(), "offset out of range");
            assert!(indexed.insert(slot), "slot indexed twice");
            if self.entries[slot].entry.is_some() {
                // must be reachable by probing the stored hash
                let (mut j, mut perturb) = self.first_probe(self.entries[slot].hash);
                let mut steps = 0;
                while j != i {
                    assert!(self.offsets[j] >= 0, "probe chain broken");
                    j = self.next_probe(j, &mut perturb);
                    steps += 1;
                    assert!(steps <= self.offsets.len() * 4, "unreachable slot");
                }
            }
        }
        for (slot, s) in self.entries.iter().enumerate() {
            if s.entry.is_some() {
                assert!(indexed.contains(&slot), "occupied slot not indexed");
            }
        }
    }
}
