//! Mark-and-sweep garbage collector.
//!
//! Objects live on a singly linked chain threaded through their
//! descriptors. A collection runs in three passes over that chain:
//!
//! 1. every object with a zero reference count has its refcount field
//!    overwritten with the reserved non-visited pattern (white); objects
//!    with live root references keep their count and seed the worklist,
//! 2. the worklist is drained, clearing the non-visited pattern on every
//!    reachable object (an explicit stack, the target environments are
//!    too small for recursive marking),
//! 3. the chain is walked once more; still-white objects are torn down
//!    and unlinked.
//!
//! String and float values inside properties are reference-counted, not
//! traced; the collector only follows object references.

use tracing::debug;

use ember_types::{Cp, CpRepr, LexicalEnvKind, ObjectKind, ValueTag};

use crate::consts::{CONTEXT_DATA_SLOTS, OBJECT_NON_VISITED, OBJECT_REF_MASK};
use crate::context::Engine;
use crate::object::property::{
    prop_is_raw, prop_is_raw_data, InternalId, PAIR_SIZE, TYPE_HASHMAP, TYPE_INTERNAL,
};
use crate::value::Value;

/// How much memory a collection should claw back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPressure {
    /// Reclaim garbage but keep performance caches (property hashmaps).
    Low,
    /// Additionally drop the caches; used on the allocation-retry path.
    High,
}

impl Engine {
    /// Run a full collection.
    pub fn gc(&mut self, pressure: GcPressure) {
        let mut worklist: Vec<Cp> = Vec::new();

        // Pass 1: whitewash everything without a root reference.
        let mut obj = self.gc_objects;
        let mut total = 0u32;
        while !obj.is_null() {
            let word = self.object_word(obj);
            if word & OBJECT_REF_MASK == 0 {
                self.set_object_word(obj, word | OBJECT_NON_VISITED);
            } else {
                worklist.push(obj);
            }
            total += 1;
            obj = self.object_gc_next(obj);
        }
        let roots = worklist.len();

        // Context-data slots are roots regardless of reference counts.
        for slot in 0..CONTEXT_DATA_SLOTS {
            let v = self.context_data[slot];
            if v.is_object() {
                self.gc_mark(v.cp(), &mut worklist);
            }
        }

        // Pass 2: drain the worklist.
        while let Some(cp) = worklist.pop() {
            self.gc_traverse(cp, &mut worklist);
        }

        // Pass 3: sweep the white objects, unlinking as we go.
        let mut swept = 0u32;
        let mut prev = Cp::NULL;
        let mut obj = self.gc_objects;
        while !obj.is_null() {
            let next = self.object_gc_next(obj);
            if self.object_word(obj) & OBJECT_REF_MASK == OBJECT_NON_VISITED {
                self.sweep_object(obj);
                if prev.is_null() {
                    self.gc_objects = next;
                } else {
                    self.set_object_gc_next(prev, next);
                }
                swept += 1;
            } else {
                if pressure == GcPressure::High && self.object_has_property_list(obj) {
                    let head = self.object_property_list(obj);
                    if !head.is_null() && self.pair_type(head, 0) == TYPE_HASHMAP {
                        self.hashmap_free(obj);
                    }
                }
                prev = obj;
            }
            obj = next;
        }

        // Give parked pool chunks back so the free list can coalesce
        // across what the sweep released.
        self.heap.collect_pools();

        debug!(
            ?pressure,
            total,
            roots,
            swept,
            allocated = self.heap.allocated_bytes(),
            "gc cycle"
        );
    }

    /// Clear the white pattern on a referenced object and queue it.
    fn gc_mark(&mut self, cp: Cp, worklist: &mut Vec<Cp>) {
        let word = self.object_word(cp);
        if word & OBJECT_REF_MASK == OBJECT_NON_VISITED {
            self.set_object_word(cp, word & !OBJECT_REF_MASK);
            worklist.push(cp);
        }
    }

    fn gc_mark_value(&mut self, v: Value, worklist: &mut Vec<Cp>) {
        if v.is_object() {
            self.gc_mark(v.cp(), worklist);
        }
    }

    /// Visit every object reference held by `cp`.
    fn gc_traverse(&mut self, cp: Cp, worklist: &mut Vec<Cp>) {
        // Prototype, or outer lexical environment.
        let u2 = self.object_u2(cp);
        if !u2.is_null() {
            self.gc_mark(u2, worklist);
        }

        let obj = Value::pointer(ValueTag::Object, cp);
        if self.is_lexical_env(obj)
            && self.lexical_env_kind(obj) == LexicalEnvKind::ObjectBound
        {
            self.gc_mark(self.object_u1(cp), worklist);
            return;
        }

        self.gc_traverse_properties(cp, worklist);

        if self.is_lexical_env(obj) {
            return;
        }
        match self.object_kind(obj) {
            ObjectKind::Function => {
                self.gc_mark(self.function_scope(obj).cp(), worklist);
            }
            ObjectKind::BoundFunction => {
                self.gc_mark(self.bound_target(obj).cp(), worklist);
            }
            ObjectKind::Class => {
                let payload = self.class_payload(obj);
                self.gc_mark_value(payload, worklist);
            }
            _ => {}
        }
    }

    fn gc_traverse_properties(&mut self, cp: Cp, worklist: &mut Vec<Cp>) {
        let mut pair = self.first_property_pair(cp);
        while !pair.is_null() {
            for index in 0..2 {
                let type_byte = self.pair_type(pair, index);
                if prop_is_raw_data(type_byte) {
                    let value = Value::from_raw(self.pair_value(pair, index));
                    self.gc_mark_value(value, worklist);
                } else if prop_is_raw(type_byte) {
                    let block = Cp::new(self.pair_value(pair, index) as CpRepr);
                    let getter = self.heap.read_cp(block.offset());
                    let setter = self.heap.read_cp(block.offset() + crate::heap::CP_FIELD_SIZE);
                    if !getter.is_null() {
                        self.gc_mark(getter, worklist);
                    }
                    if !setter.is_null() {
                        self.gc_mark(setter, worklist);
                    }
                } else if type_byte >= TYPE_INTERNAL
                    && self.pair_name(pair, index) == InternalId::NativePointer as u16 as CpRepr
                {
                    self.gc_mark_native_chain(self.pair_value(pair, index), worklist);
                }
            }
            pair = self.pair_next(pair);
        }
    }

    fn gc_mark_native_chain(&mut self, head_plus_one: u32, worklist: &mut Vec<Cp>) {
        let mut slot_plus_one = head_plus_one;
        while slot_plus_one != 0 {
            let index = (slot_plus_one - 1) as usize;
            let (tracked, next) = {
                let slot = self.natives[index].as_ref().expect("native slot missing");
                (slot.tracked.clone(), slot.next)
            };
            for value in tracked {
                self.gc_mark_value(value, worklist);
            }
            slot_plus_one = next;
        }
    }

    /// Tear down a dead object: native callbacks fire, property values
    /// release their string references, then every heap block of the
    /// object is returned to the allocator. The value releases happen
    /// strictly before the blocks are freed, so a string held only by
    /// this object is freed exactly once, here.
    fn sweep_object(&mut self, cp: Cp) {
        if self.object_has_property_list(cp) {
            let mut pair = self.object_property_list(cp);

            if !pair.is_null() && self.pair_type(pair, 0) == TYPE_HASHMAP {
                self.hashmap_free(cp);
                pair = self.object_property_list(cp);
            }

            while !pair.is_null() {
                let next = self.pair_next(pair);
                for index in 0..2 {
                    self.free_property_slot(pair, index);
                }
                self.heap.free(pair, PAIR_SIZE);
                pair = next;
            }
        }

        let obj = Value::pointer(ValueTag::Object, cp);
        if !self.is_lexical_env(obj) && self.object_kind(obj) == ObjectKind::Class {
            let payload = self.class_payload(obj);
            self.free_value_if_not_object(payload);
        }

        let size = if self.object_is_extended(cp) {
            crate::object::EXTENDED_OBJECT_SIZE
        } else {
            crate::object::OBJECT_SIZE
        };
        self.heap.free(cp, size);
    }
}
