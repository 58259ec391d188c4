use std::collections::BTreeMap;

use brains_core::types::Address;
use serde::{Deserialize, Serialize};

/// Enumerable set of addresses with O(log n) insert and remove.
///
/// Removal swaps the last entry into the freed slot, so indices are only
/// meaningful within a single snapshot of the set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderIndex {
    order: Vec<Address>,
    slots: BTreeMap<Address, usize>,
}

impl HolderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `who` was already present.
    pub fn insert(&mut self, who: Address) -> bool {
        if self.slots.contains_key(&who) {
            return false;
        }
        self.slots.insert(who, self.order.len());
        self.order.push(who);
        true
    }

    /// Returns false if `who` was not present.
    pub fn remove(&mut self, who: &Address) -> bool {
        let Some(slot) = self.slots.remove(who) else {
            return false;
        };
        self.order.swap_remove(slot);
        if let Some(moved) = self.order.get(slot) {
            self.slots.insert(*moved, slot);
        }
        true
    }

    pub fn contains(&self, who: &Address) -> bool {
        self.slots.contains_key(who)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Address> {
        self.order.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.order.iter()
    }
}
