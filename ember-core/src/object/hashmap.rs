//! Property hashmap accelerator.
//!
//! Attached to the head of a property list once the named-property count
//! crosses the minimum, the hashmap is itself a chain node: its type byte
//! marks it and its link continues to the real pairs, so every traversal
//! can step over it uniformly. After the header come a power-of-two array
//! of pair pointers and one bit per entry naming which slot of the pair
//! the entry refers to.
//!
//! Open addressing uses prime steps drawn from a fixed table, selected by
//! the low hash bits. A capacity (power of two) and any prime step are
//! relatively prime, so a probe sequence visits every entry once; at
//! least a third of the entries are NULL after a build, which bounds the
//! probe length. The per-entry bit does double duty on NULL entries: set
//! means a deleted entry (probes continue past it), clear means truly
//! empty (probes stop).

use ember_types::Cp;

use crate::consts::{HASHMAP_MINIMUM_CAPACITY, STRING_HASH_LIMIT};
use crate::context::Engine;
use crate::heap::CP_FIELD_SIZE;
use crate::value::Value;

use super::property::{prop_is_named, PropertyRef, PAIR_NEXT_OFFSET, TYPE_HASHMAP};

/// Stepping primes; the low bits of the hash pick one.
const STEPS: [u32; 8] = [3, 5, 7, 11, 13, 17, 19, 23];

const MAX_COUNT_OFFSET: usize = PAIR_NEXT_OFFSET + CP_FIELD_SIZE;
const NULL_COUNT_OFFSET: usize = MAX_COUNT_OFFSET + 4;
const ENTRIES_OFFSET: usize = NULL_COUNT_OFFSET + 4;

const fn total_size(max_count: u32) -> usize {
    ENTRIES_OFFSET + max_count as usize * CP_FIELD_SIZE + (max_count >> 3) as usize
}

impl Engine {
    fn hashmap_max_count(&self, map: Cp) -> u32 {
        self.heap.read_u32(map.offset() + MAX_COUNT_OFFSET)
    }

    fn hashmap_null_count(&self, map: Cp) -> u32 {
        self.heap.read_u32(map.offset() + NULL_COUNT_OFFSET)
    }

    fn hashmap_shift(&self, map: Cp) -> u32 {
        u32::from(self.heap.read_u8(map.offset() + 1))
    }

    fn hashmap_entry(&self, map: Cp, index: u32) -> Cp {
        self.heap
            .read_cp(map.offset() + ENTRIES_OFFSET + index as usize * CP_FIELD_SIZE)
    }

    fn set_hashmap_entry(&mut self, map: Cp, index: u32, pair: Cp) {
        self.heap
            .write_cp(map.offset() + ENTRIES_OFFSET + index as usize * CP_FIELD_SIZE, pair);
    }

    fn hashmap_bit(&self, map: Cp, index: u32) -> bool {
        let max = self.hashmap_max_count(map);
        let byte_off =
            map.offset() + ENTRIES_OFFSET + max as usize * CP_FIELD_SIZE + (index >> 3) as usize;
        self.heap.read_u8(byte_off) & (1 << (index & 7)) != 0
    }

    fn write_hashmap_bit(&mut self, map: Cp, index: u32, set: bool) {
        let max = self.hashmap_max_count(map);
        let byte_off =
            map.offset() + ENTRIES_OFFSET + max as usize * CP_FIELD_SIZE + (index >> 3) as usize;
        let byte = self.heap.read_u8(byte_off);
        let mask = 1u8 << (index & 7);
        self.heap
            .write_u8(byte_off, if set { byte | mask } else { byte & !mask });
    }

    /// Starting entry and probe step for a hash in a map of `max_count`
    /// entries. Above the hash limit the hash is spread left so small
    /// hashes do not cluster at the low entries.
    fn hashmap_start(&self, map: Cp, hash: u16) -> (u32, u32) {
        let hash = u32::from(hash);
        let step = STEPS[(hash & (STEPS.len() as u32 - 1)) as usize];
        let mask = self.hashmap_max_count(map) - 1;
        let index = if mask < STRING_HASH_LIMIT {
            hash & mask
        } else {
            let spread = hash << self.hashmap_shift(map);
            debug_assert!(spread <= mask);
            spread
        };
        (index, step)
    }

    /// Build a hashmap over the current property list. Uses the
    /// null-on-error allocation path: on a full heap the object simply
    /// keeps its plain chain.
    pub(crate) fn hashmap_create(&mut self, obj: Cp) {
        let head = self.object_property_list(obj);
        debug_assert!(!head.is_null() && self.pair_type(head, 0) != TYPE_HASHMAP);

        let named_count = self.named_property_count(obj);

        // Power-of-two capacity with at least a third of the entries NULL.
        let mut max_count = HASHMAP_MINIMUM_CAPACITY;
        while max_count < named_count + (named_count >> 1) {
            max_count <<= 1;
        }

        let Some(map) = self.heap.alloc(total_size(max_count)) else {
            return;
        };
        tracing::debug!(object = ?obj, capacity = max_count, "property hashmap created");

        let mut shift_counter = 0u8;
        let mut spread_capacity = max_count;
        while spread_capacity > STRING_HASH_LIMIT {
            shift_counter += 1;
            spread_capacity >>= 1;
        }

        self.heap.write_u8(map.offset(), TYPE_HASHMAP);
        self.heap.write_u8(map.offset() + 1, shift_counter);
        self.set_pair_next(map, head);
        self.heap
            .write_u32(map.offset() + MAX_COUNT_OFFSET, max_count);
        self.heap
            .write_u32(map.offset() + NULL_COUNT_OFFSET, max_count - named_count);
        self.set_object_property_list(obj, map);

        let mask = max_count - 1;
        let mut pair = head;
        while !pair.is_null() {
            for index in 0..2usize {
                let type_byte = self.pair_type(pair, index);
                if !prop_is_named(type_byte) {
                    continue;
                }
                let hash = self.property_name_hash(type_byte, self.pair_name(pair, index));
                let (mut entry_index, step) = self.hashmap_start(map, hash);

                // Only fresh entries exist during a build; the first NULL
                // terminates the probe.
                while !self.hashmap_entry(map, entry_index).is_null() {
                    entry_index = (entry_index + step) & mask;
                }

                self.set_hashmap_entry(map, entry_index, pair);
                self.write_hashmap_bit(map, entry_index, index != 0);
            }
            pair = self.pair_next(pair);
        }
    }

    /// Detach and free the hashmap header.
    pub(crate) fn hashmap_free(&mut self, obj: Cp) {
        let map = self.object_property_list(obj);
        debug_assert!(!map.is_null() && self.pair_type(map, 0) == TYPE_HASHMAP);

        let next = self.pair_next(map);
        self.set_object_property_list(obj, next);
        self.heap.free(map, total_size(self.hashmap_max_count(map)));
    }

    /// Hook called after a property was linked into the chain.
    pub(crate) fn hashmap_notify_insert(&mut self, obj: Cp, prop: PropertyRef) {
        let head = self.object_property_list(obj);
        if head.is_null() || self.pair_type(head, 0) != TYPE_HASHMAP {
            return;
        }
        if !prop_is_named(self.pair_type(prop.pair, prop.index)) {
            return;
        }
        self.hashmap_insert(obj, head, prop);
    }

    fn hashmap_insert(&mut self, obj: Cp, map: Cp, prop: PropertyRef) {
        // Rebuild once NULLs drop to an eighth of the capacity; probes
        // terminate on empty entries, so at least one must survive every
        // insert. The rebuild indexes the already-linked property too.
        if self.hashmap_null_count(map) * 8 <= self.hashmap_max_count(map) {
            self.hashmap_free(obj);
            self.hashmap_create(obj);
            return;
        }

        let type_byte = self.pair_type(prop.pair, prop.index);
        let hash = self.property_name_hash(type_byte, self.pair_name(prop.pair, prop.index));
        let mask = self.hashmap_max_count(map) - 1;
        let (mut entry_index, step) = self.hashmap_start(map, hash);

        while !self.hashmap_entry(map, entry_index).is_null() {
            entry_index = (entry_index + step) & mask;
        }

        self.set_hashmap_entry(map, entry_index, prop.pair);

        // A clear bit on a NULL entry meant truly empty; taking it costs
        // a NULL. A set bit was a deleted entry being reused.
        if !self.hashmap_bit(map, entry_index) {
            let nulls = self.hashmap_null_count(map);
            debug_assert!(nulls > 1);
            self.heap
                .write_u32(map.offset() + NULL_COUNT_OFFSET, nulls - 1);
        }

        self.write_hashmap_bit(map, entry_index, prop.index != 0);
    }

    /// Replace the entry of a property about to be deleted with a
    /// tombstone.
    pub(crate) fn hashmap_delete(&mut self, map: Cp, prop: PropertyRef) {
        let type_byte = self.pair_type(prop.pair, prop.index);
        let hash = self.property_name_hash(type_byte, self.pair_name(prop.pair, prop.index));
        let mask = self.hashmap_max_count(map) - 1;
        let (mut entry_index, step) = self.hashmap_start(map, hash);

        loop {
            let entry = self.hashmap_entry(map, entry_index);
            if !entry.is_null() {
                let slot = usize::from(self.hashmap_bit(map, entry_index));
                if entry == prop.pair && slot == prop.index {
                    self.set_hashmap_entry(map, entry_index, Cp::NULL);
                    self.write_hashmap_bit(map, entry_index, true);
                    return;
                }
            } else {
                // A NULL on the probe path of a present property must be
                // a deleted entry.
                debug_assert!(self.hashmap_bit(map, entry_index));
            }
            entry_index = (entry_index + step) & mask;
        }
    }

    /// Find a named property through the hashmap.
    pub(crate) fn hashmap_find(&self, map: Cp, name: Value) -> Option<PropertyRef> {
        // The chain and the map must agree on membership; verify the
        // chain's answer in debug builds and compare at every exit.
        #[cfg(debug_assertions)]
        let in_chain = self.scan_property_chain(self.pair_next(map), name).is_some();

        let hash = self.str_hash(name);
        let mask = self.hashmap_max_count(map) - 1;
        let (mut entry_index, step) = self.hashmap_start(map, hash);

        loop {
            let entry = self.hashmap_entry(map, entry_index);
            if !entry.is_null() {
                let slot = usize::from(self.hashmap_bit(map, entry_index));
                let type_byte = self.pair_type(entry, slot);
                debug_assert!(prop_is_named(type_byte));
                if self.property_name_matches(type_byte, self.pair_name(entry, slot), name) {
                    #[cfg(debug_assertions)]
                    debug_assert!(in_chain);
                    return Some(PropertyRef { pair: entry, index: slot });
                }
            } else if !self.hashmap_bit(map, entry_index) {
                #[cfg(debug_assertions)]
                debug_assert!(!in_chain);
                return None;
            }
            // Deleted entry: the probe continues.
            entry_index = (entry_index + step) & mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_primes_and_power_of_two_table() {
        assert_eq!(STEPS.len(), 8);
        for &s in &STEPS {
            assert!((2..s).all(|d| s % d != 0));
        }
    }

    #[test]
    fn layout_keeps_entries_aligned() {
        assert_eq!(ENTRIES_OFFSET % CP_FIELD_SIZE, 0);
        assert_eq!(total_size(8), ENTRIES_OFFSET + 8 * CP_FIELD_SIZE + 1);
    }
}
