//! Arena storage for runtime records.
//!
//! Tasks and scopes live in arenas for the lifetime of the runtime. Slots
//! carry generation counters so a stale identifier can never alias a record
//! that later reused its slot.
//!
//! # Design
//!
//! - Slots are stored in a `Vec`; vacated slots form an intrusive free list
//! - Each slot's generation bumps on removal, invalidating old indices
//! - No unsafe code; bounds checks and generation validation do the work

use core::fmt;
use core::hash::{Hash, Hasher};
use serde::Serialize;

/// An index into an arena, paired with the slot generation it was issued for.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ArenaIndex {
    slot: u32,
    generation: u32,
}

impl ArenaIndex {
    /// Creates an index directly (primarily for tests).
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the raw slot number.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Returns the generation this index was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.slot, self.generation)
    }
}

impl Hash for ArenaIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64((u64::from(self.slot) << 32) | u64::from(self.generation));
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

#[derive(Debug)]
enum Entry<T> {
    Full(T),
    Free { next: Option<u32> },
}

/// Generation-checked arena.
///
/// Indices returned by `insert`/`insert_with` stay valid until the value is
/// removed; afterwards they dereference to `None` forever.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    /// Returns the number of live values.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no value is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a value and returns its index.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Inserts the value produced by `f`, which receives the index being
    /// assigned so records can embed their own identifier.
    pub fn insert_with<F>(&mut self, f: F) -> ArenaIndex
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        self.len += 1;
        match self.free_head {
            Some(slot_no) => {
                let slot = &mut self.slots[slot_no as usize];
                let Entry::Free { next } = slot.entry else {
                    unreachable!("free list pointed at a full slot");
                };
                self.free_head = next;
                let index = ArenaIndex {
                    slot: slot_no,
                    generation: slot.generation,
                };
                slot.entry = Entry::Full(f(index));
                index
            }
            None => {
                let slot_no = u32::try_from(self.slots.len()).expect("arena overflow");
                let index = ArenaIndex {
                    slot: slot_no,
                    generation: 0,
                };
                self.slots.push(Slot {
                    generation: 0,
                    entry: Entry::Full(f(index)),
                });
                index
            }
        }
    }

    /// Removes and returns the value at `index`, or `None` when the index is
    /// stale or vacant.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let slot = self.slots.get_mut(index.slot as usize)?;
        if slot.generation != index.generation || matches!(slot.entry, Entry::Free { .. }) {
            return None;
        }
        slot.generation = slot.generation.wrapping_add(1);
        let old = core::mem::replace(
            &mut slot.entry,
            Entry::Free {
                next: self.free_head,
            },
        );
        self.free_head = Some(index.slot);
        self.len -= 1;
        match old {
            Entry::Full(value) => Some(value),
            Entry::Free { .. } => unreachable!(),
        }
    }

    /// Returns a reference to the value at `index`.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        let slot = self.slots.get(index.slot as usize)?;
        match &slot.entry {
            Entry::Full(value) if slot.generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns a mutable reference to the value at `index`.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        let slot = self.slots.get_mut(index.slot as usize)?;
        match &mut slot.entry {
            Entry::Full(value) if slot.generation == index.generation => Some(value),
            _ => None,
        }
    }

    /// Returns true when `index` points at a live value.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    /// Iterates over all live values with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let Entry::Full(value) = &slot.entry else {
                return None;
            };
            Some((
                ArenaIndex {
                    slot: i as u32,
                    generation: slot.generation,
                },
                value,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let mut arena = Arena::new();
        let idx = arena.insert("alpha");
        assert_eq!(arena.get(idx), Some(&"alpha"));
        assert_eq!(arena.len(), 1);
        assert!(arena.contains(idx));
    }

    #[test]
    fn removal_invalidates_and_slot_is_reused() {
        let mut arena = Arena::new();
        let first = arena.insert(1);
        let second = arena.insert(2);

        assert_eq!(arena.remove(first), Some(1));
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.remove(first), None);

        let third = arena.insert(3);
        assert_eq!(third.slot(), first.slot());
        assert_ne!(third.generation(), first.generation());
        assert_eq!(arena.get(second), Some(&2));
        assert_eq!(arena.get(third), Some(&3));
    }

    #[test]
    fn stale_index_never_aliases() {
        let mut arena = Arena::new();
        let old = arena.insert(10);
        arena.remove(old);
        let fresh = arena.insert(20);

        assert_eq!(old.slot(), fresh.slot());
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.get(fresh), Some(&20));
    }

    #[test]
    fn insert_with_sees_final_index() {
        let mut arena = Arena::new();
        let idx = arena.insert_with(|ix| ix.slot());
        assert_eq!(arena.get(idx), Some(&idx.slot()));
    }

    #[test]
    fn iter_skips_vacated_slots() {
        let mut arena = Arena::new();
        let a = arena.insert('a');
        let b = arena.insert('b');
        let c = arena.insert('c');
        arena.remove(b);

        let collected: Vec<_> = arena.iter().map(|(ix, v)| (ix, *v)).collect();
        assert_eq!(collected, vec![(a, 'a'), (c, 'c')]);
    }
}
