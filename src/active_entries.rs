//! ActiveEntries: hash-keyed table of live entries with generational slot ids.
//!
//! Each slot stores the entry hash alongside the value and the index is a
//! `HashTable` of slot keys probed by that hash. Entry hashes are already
//! uniformly distributed, so the table uses them directly instead of
//! rehashing. Slot ids are generational: an id taken for one entry never
//! resolves to a later entry that happens to reuse the slot, which is what
//! lets an entry's proxy erase "its" slot and nothing else.

use crate::entry_hash::EntryHash;
use hashbrown::HashTable;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generational id of one ActiveEntries slot.
    pub struct EntryId;
}

#[derive(Debug)]
struct Slot<V> {
    hash: EntryHash,
    value: V,
}

#[derive(Debug)]
pub enum InsertError {
    DuplicateHash,
}

pub struct ActiveEntries<V> {
    index: HashTable<EntryId>,
    slots: SlotMap<EntryId, Slot<V>>,
}

impl<V> Default for ActiveEntries<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ActiveEntries<V> {
    pub fn new() -> Self {
        Self {
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn find(&self, hash: EntryHash) -> Option<EntryId> {
        self.index
            .find(hash.0, |&id| {
                self.slots.get(id).map(|s| s.hash == hash).unwrap_or(false)
            })
            .copied()
    }

    pub fn contains(&self, hash: EntryHash) -> bool {
        self.find(hash).is_some()
    }

    pub fn insert(&mut self, hash: EntryHash, value: V) -> Result<EntryId, InsertError> {
        self.insert_with(hash, || value)
    }

    /// Insert using a lazy value constructor; only calls `make` when the
    /// hash is vacant.
    pub fn insert_with<F>(&mut self, hash: EntryHash, make: F) -> Result<EntryId, InsertError>
    where
        F: FnOnce() -> V,
    {
        match self.index.entry(
            hash.0,
            |&id| self.slots.get(id).map(|s| s.hash == hash).unwrap_or(false),
            |&id| self.slots.get(id).map(|s| s.hash.0).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateHash),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let id = self.slots.insert(Slot {
                    hash,
                    value: make(),
                });
                let _ = v.insert(id);
                Ok(id)
            }
        }
    }

    /// Remove the slot named by `id`. A stale id (slot already removed,
    /// possibly reused) returns `None` and leaves the table untouched.
    pub fn remove(&mut self, id: EntryId) -> Option<(EntryHash, V)> {
        let slot = self.slots.remove(id)?;
        if let Ok(occupied) = self.index.find_entry(slot.hash.0, |&other| other == id) {
            let _ = occupied.remove();
        }
        Some((slot.hash, slot.value))
    }

    pub fn get(&self, id: EntryId) -> Option<&V> {
        self.slots.get(id).map(|s| &s.value)
    }

    pub fn get_by_hash(&self, hash: EntryHash) -> Option<&V> {
        self.find(hash).and_then(|id| self.get(id))
    }
}
