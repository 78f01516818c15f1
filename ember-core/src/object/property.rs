//! Property store.
//!
//! Properties live in 16-byte pairs: two one-byte type-and-flags fields
//! and the chain link up front, then two name slots and two value slots,
//! so the value words stay naturally aligned. Pairs form a singly linked
//! list off the object descriptor; a hashmap accelerator node may sit at
//! the head of the list.
//!
//! The type byte carries the attribute flags in its low six bits and the
//! name kind in the top two, mirroring the direct-string subtag. The
//! reserved `Special` kind marks the hashmap header, deleted slots and
//! internal properties, so ordinary name lookup can never alias them.

use ember_types::{Cp, CpRepr, DirectStringKind, PropertyFlags, ValueTag};

use crate::consts::HASHMAP_MINIMUM_PROPERTY_COUNT;
use crate::context::Engine;
use crate::heap::CP_FIELD_SIZE;
use crate::value::Value;

/// Offset of the chain link; the two type bytes sit in front, padded to
/// pointer alignment in wide-pointer builds.
pub(crate) const PAIR_NEXT_OFFSET: usize = if CP_FIELD_SIZE == 2 { 2 } else { 4 };

/// Offset of the value words; names come between the link and these.
pub(crate) const PAIR_VALUE_BASE: usize = PAIR_NEXT_OFFSET + 3 * CP_FIELD_SIZE;

/// Allocation size of a property pair.
pub(crate) const PAIR_SIZE: usize = PAIR_VALUE_BASE + 8;

/// Allocation size of a getter/setter block.
pub(crate) const ACCESSOR_SIZE: usize = 8;

pub(crate) const fn pair_name_offset(index: usize) -> usize {
    PAIR_NEXT_OFFSET + CP_FIELD_SIZE * (1 + index)
}

pub(crate) const fn pair_value_offset(index: usize) -> usize {
    PAIR_VALUE_BASE + 4 * index
}

/// Type byte of the hashmap header node.
pub(crate) const TYPE_HASHMAP: u8 = (DirectStringKind::Special as u8) << 6;

/// Type byte of a deleted (reusable) slot.
pub(crate) const TYPE_DELETED: u8 = TYPE_HASHMAP | PropertyFlags::DELETED.bits();

/// Lower bound of the internal-property type bytes.
pub(crate) const TYPE_INTERNAL: u8 = TYPE_HASHMAP | PropertyFlags::DATA.bits();

/// Whether the byte describes a named (lookup-relevant) property:
/// ordinary named properties below the special range, internal ones
/// above it.
pub(crate) const fn prop_is_named(type_byte: u8) -> bool {
    type_byte < TYPE_HASHMAP || type_byte >= TYPE_INTERNAL
}

/// Whether the byte describes an ECMA-visible named property.
pub(crate) const fn prop_is_raw(type_byte: u8) -> bool {
    type_byte < TYPE_HASHMAP
}

/// Whether the byte describes a named data property.
pub(crate) const fn prop_is_raw_data(type_byte: u8) -> bool {
    type_byte & PropertyFlags::DATA.bits() != 0 && type_byte < TYPE_INTERNAL
}

pub(crate) const fn prop_name_kind(type_byte: u8) -> DirectStringKind {
    match type_byte >> 6 {
        0 => DirectStringKind::Ptr,
        1 => DirectStringKind::Magic,
        2 => DirectStringKind::Uint,
        _ => DirectStringKind::Special,
    }
}

/// Identifiers of internal properties, stored in the name slot of a
/// `Special`-kind property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum InternalId {
    /// Head of the native data chain (see native info on the object
    /// layer).
    NativePointer = 0,
}

/// Location of a property: its pair and the slot index within the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyRef {
    pub(crate) pair: Cp,
    pub(crate) index: usize,
}

impl Engine {
    pub(crate) fn pair_type(&self, pair: Cp, index: usize) -> u8 {
        self.heap.read_u8(pair.offset() + index)
    }

    pub(crate) fn set_pair_type(&mut self, pair: Cp, index: usize, type_byte: u8) {
        self.heap.write_u8(pair.offset() + index, type_byte);
    }

    pub(crate) fn pair_next(&self, pair: Cp) -> Cp {
        self.heap.read_cp(pair.offset() + PAIR_NEXT_OFFSET)
    }

    pub(crate) fn set_pair_next(&mut self, pair: Cp, next: Cp) {
        self.heap.write_cp(pair.offset() + PAIR_NEXT_OFFSET, next);
    }

    pub(crate) fn pair_name(&self, pair: Cp, index: usize) -> CpRepr {
        self.heap.read_cp(pair.offset() + pair_name_offset(index)).raw()
    }

    pub(crate) fn set_pair_name(&mut self, pair: Cp, index: usize, name: CpRepr) {
        self.heap
            .write_cp(pair.offset() + pair_name_offset(index), Cp::new(name));
    }

    pub(crate) fn pair_value(&self, pair: Cp, index: usize) -> u32 {
        self.heap.read_u32(pair.offset() + pair_value_offset(index))
    }

    pub(crate) fn set_pair_value(&mut self, pair: Cp, index: usize, word: u32) {
        self.heap
            .write_u32(pair.offset() + pair_value_offset(index), word);
    }

    /// First chain node after any hashmap header, or null.
    pub(crate) fn first_property_pair(&self, obj: Cp) -> Cp {
        let head = self.object_property_list(obj);
        if head.is_null() {
            return head;
        }
        if self.pair_type(head, 0) == TYPE_HASHMAP {
            self.pair_next(head)
        } else {
            head
        }
    }

    /// Find a named property by string or symbol name.
    pub fn find_own_property(&self, obj: Value, name: Value) -> Option<PropertyRef> {
        debug_assert!(obj.is_object());
        debug_assert!(name.is_string() || name.is_symbol());

        let head = self.object_property_list(obj.cp());
        if head.is_null() {
            return None;
        }
        if self.pair_type(head, 0) == TYPE_HASHMAP {
            return self.hashmap_find(head, name);
        }
        self.scan_property_chain(head, name)
    }

    pub(crate) fn scan_property_chain(&self, start: Cp, name: Value) -> Option<PropertyRef> {
        let mut pair = start;
        while !pair.is_null() {
            for index in 0..2 {
                let type_byte = self.pair_type(pair, index);
                if prop_is_named(type_byte)
                    && self.property_name_matches(type_byte, self.pair_name(pair, index), name)
                {
                    return Some(PropertyRef { pair, index });
                }
            }
            pair = self.pair_next(pair);
        }
        None
    }

    /// Whether a stored `(type, name)` cell names the same string as the
    /// query value. Direct names compare by payload; heap names by
    /// pointer identity first, content second.
    pub(crate) fn property_name_matches(
        &self,
        type_byte: u8,
        name_raw: CpRepr,
        query: Value,
    ) -> bool {
        let kind = prop_name_kind(type_byte);
        match query.tag() {
            ValueTag::DirectString => {
                kind == query.direct_string_kind()
                    && u32::from(name_raw) == query.direct_string_imm()
            }
            ValueTag::String | ValueTag::Symbol => {
                if kind != DirectStringKind::Ptr {
                    return false;
                }
                let stored = Cp::new(name_raw);
                if stored == query.cp() {
                    return true;
                }
                self.string_eq(
                    Value::pointer(ValueTag::String, stored),
                    Value::pointer(ValueTag::String, query.cp()),
                )
            }
            _ => false,
        }
    }

    /// Hash of a stored property name; must agree with `str_hash` of any
    /// equal query string.
    pub(crate) fn property_name_hash(&self, type_byte: u8, name_raw: CpRepr) -> u16 {
        match prop_name_kind(type_byte) {
            DirectStringKind::Magic => self.str_hash(Value::direct_string(
                DirectStringKind::Magic,
                u32::from(name_raw),
            )),
            DirectStringKind::Uint => name_raw as u16,
            DirectStringKind::Ptr => self
                .str_hash(Value::pointer(ValueTag::String, Cp::new(name_raw))),
            DirectStringKind::Special => name_raw as u16,
        }
    }

    /// Reconstruct the stored name as a value. The result is unowned;
    /// callers wanting to keep it must `copy_value` it.
    pub(crate) fn property_name_value(&self, type_byte: u8, name_raw: CpRepr) -> Value {
        match prop_name_kind(type_byte) {
            DirectStringKind::Magic => {
                Value::direct_string(DirectStringKind::Magic, u32::from(name_raw))
            }
            DirectStringKind::Uint => {
                Value::direct_string(DirectStringKind::Uint, u32::from(name_raw))
            }
            DirectStringKind::Ptr => {
                let cp = Cp::new(name_raw);
                if self.string_container(cp) == ember_types::StringContainer::Symbol {
                    Value::pointer(ValueTag::Symbol, cp)
                } else {
                    Value::pointer(ValueTag::String, cp)
                }
            }
            DirectStringKind::Special => Value::UNDEFINED,
        }
    }

    fn encode_property_name(&mut self, name: Value) -> (DirectStringKind, CpRepr) {
        match name.tag() {
            ValueTag::DirectString => {
                (name.direct_string_kind(), name.direct_string_imm() as CpRepr)
            }
            ValueTag::String | ValueTag::Symbol => {
                self.ref_string_descriptor(name.cp());
                (DirectStringKind::Ptr, name.cp().raw())
            }
            _ => unreachable!("property names are strings or symbols"),
        }
    }

    /// Create a named data property initialized to `undefined`.
    pub fn create_named_data_property(
        &mut self,
        obj: Value,
        name: Value,
        flags: PropertyFlags,
    ) -> PropertyRef {
        debug_assert!(self.find_own_property(obj, name).is_none());
        let (kind, name_raw) = self.encode_property_name(name);
        let type_byte =
            ((kind as u8) << 6) | (flags | PropertyFlags::DATA).bits();
        self.append_property(obj.cp(), type_byte, name_raw, Value::UNDEFINED.raw())
    }

    /// Create a named accessor property. `getter`/`setter` are object
    /// values or `undefined`.
    pub fn create_named_accessor_property(
        &mut self,
        obj: Value,
        name: Value,
        getter: Value,
        setter: Value,
        flags: PropertyFlags,
    ) -> PropertyRef {
        debug_assert!(self.find_own_property(obj, name).is_none());

        let block = self.alloc_with_retry(ACCESSOR_SIZE);
        let getter_cp = if getter.is_object() { getter.cp() } else { Cp::NULL };
        let setter_cp = if setter.is_object() { setter.cp() } else { Cp::NULL };
        self.heap.write_cp(block.offset(), getter_cp);
        self.heap.write_cp(block.offset() + CP_FIELD_SIZE, setter_cp);

        let (kind, name_raw) = self.encode_property_name(name);
        let type_byte = ((kind as u8) << 6) | (flags & !PropertyFlags::DATA).bits();
        self.append_property(obj.cp(), type_byte, name_raw, block.raw() as u32)
    }

    /// Create an internal property carrying a raw word.
    pub(crate) fn create_internal_property(
        &mut self,
        obj: Cp,
        id: InternalId,
        word: u32,
    ) -> PropertyRef {
        debug_assert!(self.find_internal_property(obj, id).is_none());
        self.append_property(obj, TYPE_INTERNAL, id as u16 as CpRepr, word)
    }

    /// Find an internal property by id. Internal names never collide
    /// with string lookup; they are reached only through this entry.
    pub(crate) fn find_internal_property(&self, obj: Cp, id: InternalId) -> Option<PropertyRef> {
        let mut pair = self.first_property_pair(obj);
        while !pair.is_null() {
            for index in 0..2 {
                if self.pair_type(pair, index) >= TYPE_INTERNAL
                    && self.pair_name(pair, index) == id as u16 as CpRepr
                {
                    return Some(PropertyRef { pair, index });
                }
            }
            pair = self.pair_next(pair);
        }
        None
    }

    fn append_property(
        &mut self,
        obj: Cp,
        type_byte: u8,
        name_raw: CpRepr,
        value_word: u32,
    ) -> PropertyRef {
        // Reuse a deleted slot of the head pair when one is free.
        let first = self.first_property_pair(obj);
        if !first.is_null() {
            for index in 0..2 {
                if self.pair_type(first, index) == TYPE_DELETED {
                    self.set_pair_type(first, index, type_byte);
                    self.set_pair_name(first, index, name_raw);
                    self.set_pair_value(first, index, value_word);
                    let prop = PropertyRef { pair: first, index };
                    self.hashmap_notify_insert(obj, prop);
                    return prop;
                }
            }
        }

        let pair = self.alloc_with_retry(PAIR_SIZE);
        self.set_pair_type(pair, 0, type_byte);
        self.set_pair_type(pair, 1, TYPE_DELETED);
        self.set_pair_name(pair, 0, name_raw);
        self.set_pair_value(pair, 0, value_word);

        // Link after the hashmap header when one is attached, else at
        // the list head.
        let head = self.object_property_list(obj);
        if !head.is_null() && self.pair_type(head, 0) == TYPE_HASHMAP {
            self.set_pair_next(pair, self.pair_next(head));
            self.set_pair_next(head, pair);
            let prop = PropertyRef { pair, index: 0 };
            self.hashmap_notify_insert(obj, prop);
            prop
        } else {
            self.set_pair_next(pair, head);
            self.set_object_property_list(obj, pair);
            let prop = PropertyRef { pair, index: 0 };
            // A growing chain without an accelerator: check whether it
            // crossed the attach threshold.
            if self.named_property_count(obj) >= HASHMAP_MINIMUM_PROPERTY_COUNT {
                self.hashmap_create(obj);
            }
            prop
        }
    }

    /// Number of named properties (including internal ones).
    pub(crate) fn named_property_count(&self, obj: Cp) -> u32 {
        let mut count = 0;
        let mut pair = self.first_property_pair(obj);
        while !pair.is_null() {
            for index in 0..2 {
                if prop_is_named(self.pair_type(pair, index)) {
                    count += 1;
                }
            }
            pair = self.pair_next(pair);
        }
        count
    }

    /// Raw value word of a data property.
    pub fn property_value(&self, prop: PropertyRef) -> Value {
        debug_assert!(prop_is_raw_data(self.pair_type(prop.pair, prop.index)));
        Value::from_raw(self.pair_value(prop.pair, prop.index))
    }

    /// Overwrite the value of a data property, reusing a float box where
    /// possible. Object references stored in properties stay uncounted;
    /// the collector traces them instead.
    pub fn set_property_value(&mut self, prop: PropertyRef, value: Value) {
        debug_assert!(prop_is_raw_data(self.pair_type(prop.pair, prop.index)));
        let old = Value::from_raw(self.pair_value(prop.pair, prop.index));
        let new = self.assign_value_if_not_object(old, value);
        self.set_pair_value(prop.pair, prop.index, new.raw());
    }

    /// Getter and setter of an accessor property, as object values or
    /// `undefined`.
    pub fn property_accessors(&self, prop: PropertyRef) -> (Value, Value) {
        let type_byte = self.pair_type(prop.pair, prop.index);
        debug_assert!(prop_is_raw(type_byte) && !prop_is_raw_data(type_byte));

        let block = Cp::new(self.pair_value(prop.pair, prop.index) as CpRepr);
        let getter = self.heap.read_cp(block.offset());
        let setter = self.heap.read_cp(block.offset() + CP_FIELD_SIZE);
        let to_value = |cp: Cp| {
            if cp.is_null() {
                Value::UNDEFINED
            } else {
                Value::pointer(ValueTag::Object, cp)
            }
        };
        (to_value(getter), to_value(setter))
    }

    /// Attribute flags of a property.
    pub fn property_flags(&self, prop: PropertyRef) -> PropertyFlags {
        PropertyFlags::from_bits_truncate(self.pair_type(prop.pair, prop.index) & 0x3f)
    }

    /// Delete a named property: the slot becomes a reusable tombstone and
    /// the hashmap entry (if any) a deleted marker.
    pub fn delete_property(&mut self, obj: Value, prop: PropertyRef) {
        debug_assert!(obj.is_object());
        debug_assert!(prop_is_raw(self.pair_type(prop.pair, prop.index)));

        let head = self.object_property_list(obj.cp());
        if !head.is_null() && self.pair_type(head, 0) == TYPE_HASHMAP {
            self.hashmap_delete(head, prop);
        }

        self.free_property_slot(prop.pair, prop.index);
        self.set_pair_type(prop.pair, prop.index, TYPE_DELETED);
        self.set_pair_name(prop.pair, prop.index, 0);
        self.set_pair_value(prop.pair, prop.index, 0);
    }

    /// Release everything a property slot owns: the heap name reference
    /// and the value (or accessor block, or native chain). Object
    /// references are left to the collector.
    pub(crate) fn free_property_slot(&mut self, pair: Cp, index: usize) {
        let type_byte = self.pair_type(pair, index);

        if prop_name_kind(type_byte) == DirectStringKind::Ptr {
            let name_cp = Cp::new(self.pair_name(pair, index));
            self.deref_string_descriptor(name_cp);
        }

        if prop_is_raw_data(type_byte) {
            let value = Value::from_raw(self.pair_value(pair, index));
            self.free_value_if_not_object(value);
        } else if prop_is_raw(type_byte) {
            let block = Cp::new(self.pair_value(pair, index) as CpRepr);
            self.heap.free(block, ACCESSOR_SIZE);
        } else if type_byte >= TYPE_INTERNAL {
            match self.pair_name(pair, index) as u16 {
                id if id == InternalId::NativePointer as u16 => {
                    let head = self.pair_value(pair, index);
                    self.free_native_chain(head);
                }
                _ => {}
            }
        }
    }

    /// Names of all ECMA-visible own properties, in chain order. Each
    /// returned name carries a fresh reference.
    pub fn own_property_names(&mut self, obj: Value) -> Vec<Value> {
        debug_assert!(obj.is_object());
        let mut names = Vec::new();
        let mut pair = self.first_property_pair(obj.cp());
        while !pair.is_null() {
            for index in 0..2 {
                let type_byte = self.pair_type(pair, index);
                if prop_is_raw(type_byte) {
                    let name =
                        self.property_name_value(type_byte, self.pair_name(pair, index));
                    names.push(name);
                }
            }
            pair = self.pair_next(pair);
        }
        for name in &mut names {
            *name = self.copy_value(*name);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineConfig;
    use crate::string::magic_string_value;
    use crate::string::MagicString;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            heap_size: 64 * 1024,
        })
        .unwrap()
    }

    #[test]
    fn data_property_round_trip() {
        let mut e = engine();
        let obj = e.new_object(Value::NULL);
        let name = magic_string_value(MagicString::Length);

        let prop = e.create_named_data_property(obj, name, ember_types::PropertyFlags::DEFAULT_DATA);
        assert_eq!(e.property_value(prop), Value::UNDEFINED);

        e.set_property_value(prop, Value::integer(7));
        let found = e.find_own_property(obj, name).unwrap();
        assert_eq!(found, prop);
        assert_eq!(e.property_value(found), Value::integer(7));

        e.release(obj);
    }

    #[test]
    fn second_property_reuses_the_pair() {
        let mut e = engine();
        let obj = e.new_object(Value::NULL);
        let a = e.create_named_data_property(
            obj,
            magic_string_value(MagicString::Name),
            ember_types::PropertyFlags::DEFAULT_DATA,
        );
        let b = e.create_named_data_property(
            obj,
            magic_string_value(MagicString::Length),
            ember_types::PropertyFlags::DEFAULT_DATA,
        );
        assert_eq!(a.pair, b.pair);
        assert_ne!(a.index, b.index);
        e.release(obj);
    }

    #[test]
    fn hashmap_attaches_past_the_threshold() {
        let mut e = engine();
        let obj = e.new_object(Value::NULL);

        let mut names = Vec::new();
        for i in 0..12u32 {
            let name = e.new_string(&format!("prop_{i}"));
            e.set_property(obj, name, Value::integer(i as i32));
            names.push(name);
        }

        let head = e.object_property_list(obj.cp());
        assert_eq!(e.pair_type(head, 0), TYPE_HASHMAP);

        for (i, &name) in names.iter().enumerate() {
            let prop = e.find_own_property(obj, name).unwrap();
            assert_eq!(e.property_value(prop), Value::integer(i as i32));
        }

        for name in names {
            e.release(name);
        }
        e.release(obj);
    }

    #[test]
    fn deleted_slot_is_reused() {
        let mut e = engine();
        let obj = e.new_object(Value::NULL);
        let name_a = magic_string_value(MagicString::Name);
        let name_b = magic_string_value(MagicString::Length);

        e.set_property(obj, name_a, Value::integer(1));
        let a = e.find_own_property(obj, name_a).unwrap();
        e.delete_property(obj, a);
        assert!(e.find_own_property(obj, name_a).is_none());

        let b = e.create_named_data_property(obj, name_b, ember_types::PropertyFlags::DEFAULT_DATA);
        assert_eq!((a.pair, a.index), (b.pair, b.index));
        e.release(obj);
    }

    #[test]
    fn internal_properties_never_alias_names() {
        let mut e = engine();
        let obj = e.new_object(Value::NULL);
        e.create_internal_property(obj.cp(), InternalId::NativePointer, 0);

        // A name whose hash could match the internal id must not find it.
        let zero = e.new_string_from_uint32(0);
        assert!(e.find_own_property(obj, zero).is_none());
        assert!(e.find_internal_property(obj.cp(), InternalId::NativePointer).is_some());
        e.release(obj);
    }
}
