//! Object layer.
//!
//! An object descriptor is a single heap cell: a packed
//! type-flags-refcount word, the GC chain link, a slot for the property
//! list (or the bound object of an object-bound lexical environment) and
//! a slot for the prototype (or the outer lexical environment). Extended
//! objects carry one more cell of kind-specific payload: array length,
//! function scope and bytecode, class tag, bound target, native callback.
//!
//! Lexical environments reuse the descriptor with a type value from the
//! reserved upper range; their "prototype" slot is the outer environment.

pub mod hashmap;
pub mod property;

use ember_types::{Cp, CpRepr, LexicalEnvKind, ObjectFlags, ObjectKind, ValueTag};

use crate::consts::{OBJECT_MAX_REF, OBJECT_REF_MASK, OBJECT_REF_ONE};
use crate::context::Engine;
use crate::error::FatalReason;
use crate::heap::CP_FIELD_SIZE;
use crate::value::Value;

pub use property::{InternalId, PropertyRef};

const OFF_GC_NEXT: usize = CP_FIELD_SIZE;
const OFF_U1: usize = 2 * CP_FIELD_SIZE;
const OFF_U2: usize = 3 * CP_FIELD_SIZE;

/// Size of a plain object descriptor.
pub(crate) const OBJECT_SIZE: usize = 4 * CP_FIELD_SIZE;

/// Offset of the extended payload.
const EXT_OFFSET: usize = OBJECT_SIZE;

/// Size of an extended object descriptor.
pub(crate) const EXTENDED_OBJECT_SIZE: usize = OBJECT_SIZE + 8;

const TYPE_MASK: u32 = 0x0f;
const FLAG_BUILT_IN_OR_LEXICAL_ENV: u32 = ObjectFlags::BUILT_IN_OR_LEXICAL_ENV.bits() as u32;
const FLAG_EXTENSIBLE: u32 = ObjectFlags::EXTENSIBLE.bits() as u32;

/// Object type values 13 and above mark lexical environments.
const LEXICAL_ENV_TYPE_START: u32 = 13;

/// Subtype discriminator of class objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClassId {
    /// Plain boxed object.
    Object = 0,
    /// Boolean wrapper.
    Boolean = 1,
    /// Number wrapper.
    Number = 2,
    /// String wrapper.
    String = 3,
    /// Date instance.
    Date = 4,
    /// RegExp instance.
    RegExp = 5,
    /// Error instance; the extra byte holds the error kind.
    Error = 6,
    /// Arguments exotic object.
    Arguments = 7,
}

impl From<u8> for ClassId {
    fn from(bits: u8) -> Self {
        match bits {
            1 => ClassId::Boolean,
            2 => ClassId::Number,
            3 => ClassId::String,
            4 => ClassId::Date,
            5 => ClassId::RegExp,
            6 => ClassId::Error,
            7 => ClassId::Arguments,
            _ => ClassId::Object,
        }
    }
}

/// Host callback backing a native function object.
pub type NativeFunction = fn(&mut Engine, this: Value, args: &[Value]) -> Value;

/// Static descriptor of host data attached to an object. Lookup is by
/// descriptor identity, never by content, so two infos with identical
/// fields still name distinct attachments.
pub struct NativeInfo {
    /// Runs exactly once, during the sweep that frees the owning object
    /// (or at engine teardown for attachments that outlive collection).
    /// Must not touch the engine heap.
    pub free_cb: Option<fn(usize)>,
}

/// One native attachment: the info it was registered under, the host
/// word, and engine values the collector should keep alive.
pub(crate) struct NativeSlot {
    pub(crate) info: &'static NativeInfo,
    pub(crate) data: usize,
    pub(crate) tracked: Vec<Value>,
    /// Next slot index + 1 in the per-object chain; 0 terminates.
    pub(crate) next: u32,
}

impl Engine {
    // Descriptor word: type nibble, two flag bits, refcount above.

    #[cfg(not(feature = "cp32"))]
    pub(crate) fn object_word(&self, cp: Cp) -> u32 {
        u32::from(self.heap.read_u16(cp.offset()))
    }

    #[cfg(feature = "cp32")]
    pub(crate) fn object_word(&self, cp: Cp) -> u32 {
        self.heap.read_u32(cp.offset())
    }

    #[cfg(not(feature = "cp32"))]
    pub(crate) fn set_object_word(&mut self, cp: Cp, word: u32) {
        debug_assert!(word <= u32::from(u16::MAX));
        self.heap.write_u16(cp.offset(), word as u16);
    }

    #[cfg(feature = "cp32")]
    pub(crate) fn set_object_word(&mut self, cp: Cp, word: u32) {
        self.heap.write_u32(cp.offset(), word);
    }

    pub(crate) fn object_gc_next(&self, cp: Cp) -> Cp {
        self.heap.read_cp(cp.offset() + OFF_GC_NEXT)
    }

    pub(crate) fn set_object_gc_next(&mut self, cp: Cp, next: Cp) {
        self.heap.write_cp(cp.offset() + OFF_GC_NEXT, next);
    }

    pub(crate) fn object_u1(&self, cp: Cp) -> Cp {
        self.heap.read_cp(cp.offset() + OFF_U1)
    }

    pub(crate) fn object_u2(&self, cp: Cp) -> Cp {
        self.heap.read_cp(cp.offset() + OFF_U2)
    }

    /// Property list head. Not meaningful for object-bound lexical
    /// environments, whose u1 slot holds the bound object instead.
    pub(crate) fn object_property_list(&self, cp: Cp) -> Cp {
        debug_assert!(self.object_has_property_list(cp));
        self.object_u1(cp)
    }

    pub(crate) fn set_object_property_list(&mut self, cp: Cp, head: Cp) {
        debug_assert!(self.object_has_property_list(cp));
        self.heap.write_cp(cp.offset() + OFF_U1, head);
    }

    pub(crate) fn object_has_property_list(&self, cp: Cp) -> bool {
        // Only object-bound environments repurpose the u1 slot.
        self.object_word(cp) & TYPE_MASK != LexicalEnvKind::ObjectBound as u32
    }

    fn create_object_raw(&mut self, type_bits: u32, flags: u32, u2: Cp, extended: bool) -> Cp {
        let size = if extended {
            EXTENDED_OBJECT_SIZE
        } else {
            OBJECT_SIZE
        };
        let cp = self.alloc_with_retry(size);
        self.set_object_word(cp, type_bits | flags | OBJECT_REF_ONE);
        self.set_object_gc_next(cp, self.gc_objects);
        self.gc_objects = cp;
        self.heap.write_cp(cp.offset() + OFF_U2, u2);
        cp
    }

    fn prototype_cp(prototype: Value) -> Cp {
        debug_assert!(prototype.is_object() || prototype.is_null());
        if prototype.is_object() {
            prototype.cp()
        } else {
            Cp::NULL
        }
    }

    /// Create a plain extensible object. The returned value holds the
    /// only reference; the object dies at the next collection after it
    /// is released.
    pub fn new_object(&mut self, prototype: Value) -> Value {
        let cp = self.create_object_raw(
            ObjectKind::General as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            false,
        );
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create an array exotic object with length zero.
    pub fn new_array(&mut self, prototype: Value) -> Value {
        let cp = self.create_object_raw(
            ObjectKind::Array as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            true,
        );
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create a class object (boxed primitive, date, error, …).
    pub fn new_class_object(&mut self, class: ClassId, prototype: Value) -> Value {
        let cp = self.create_object_raw(
            ObjectKind::Class as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            true,
        );
        self.heap.write_u8(cp.offset() + EXT_OFFSET, class as u8);
        self.set_class_payload_raw(cp, Value::EMPTY);
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create a script function object closing over `scope`. The
    /// bytecode slot is an opaque compressed pointer owned by the
    /// (external) compiler.
    pub fn new_function_object(&mut self, prototype: Value, scope: Value, bytecode: Cp) -> Value {
        debug_assert!(scope.is_object() && self.is_lexical_env(scope));
        let cp = self.create_object_raw(
            ObjectKind::Function as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            true,
        );
        self.heap.write_cp(cp.offset() + EXT_OFFSET, scope.cp());
        self.heap
            .write_cp(cp.offset() + EXT_OFFSET + CP_FIELD_SIZE, bytecode);
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create a bound function wrapping `target`.
    pub fn new_bound_function(&mut self, prototype: Value, target: Value) -> Value {
        debug_assert!(target.is_object());
        let cp = self.create_object_raw(
            ObjectKind::BoundFunction as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            true,
        );
        self.heap.write_cp(cp.offset() + EXT_OFFSET, target.cp());
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create a function object backed by a host callback.
    pub fn new_native_function(&mut self, callback: NativeFunction, prototype: Value) -> Value {
        let index = self.native_fns.len() as u32;
        self.native_fns.push(callback);
        let cp = self.create_object_raw(
            ObjectKind::NativeFunction as u32,
            FLAG_EXTENSIBLE,
            Self::prototype_cp(prototype),
            true,
        );
        self.heap.write_u32(cp.offset() + EXT_OFFSET, index);
        Value::pointer(ValueTag::Object, cp)
    }

    /// Invoke a native function object.
    pub fn call_native_function(&mut self, func: Value, this: Value, args: &[Value]) -> Value {
        debug_assert!(self.object_kind(func) == ObjectKind::NativeFunction);
        let index = self.heap.read_u32(func.cp().offset() + EXT_OFFSET);
        let callback = self.native_fns[index as usize];
        callback(self, this, args)
    }

    /// Create a declarative lexical environment.
    pub fn new_declarative_env(&mut self, outer: Value) -> Value {
        let outer_cp = if outer.is_object() { outer.cp() } else { Cp::NULL };
        let cp = self.create_object_raw(
            LexicalEnvKind::Declarative as u32,
            FLAG_BUILT_IN_OR_LEXICAL_ENV,
            outer_cp,
            false,
        );
        Value::pointer(ValueTag::Object, cp)
    }

    /// Create an object-bound lexical environment (`with`, global).
    pub fn new_object_bound_env(&mut self, outer: Value, binding_object: Value) -> Value {
        debug_assert!(binding_object.is_object());
        let outer_cp = if outer.is_object() { outer.cp() } else { Cp::NULL };
        let cp = self.create_object_raw(
            LexicalEnvKind::ObjectBound as u32,
            FLAG_BUILT_IN_OR_LEXICAL_ENV,
            outer_cp,
            false,
        );
        self.heap.write_cp(cp.offset() + OFF_U1, binding_object.cp());
        Value::pointer(ValueTag::Object, cp)
    }

    /// Internal type of an object.
    pub fn object_kind(&self, obj: Value) -> ObjectKind {
        debug_assert!(obj.is_object() && !self.is_lexical_env(obj));
        ObjectKind::from((self.object_word(obj.cp()) & TYPE_MASK) as u8)
    }

    /// Whether the descriptor is a lexical environment.
    pub fn is_lexical_env(&self, obj: Value) -> bool {
        debug_assert!(obj.is_object());
        self.object_word(obj.cp()) & TYPE_MASK >= LEXICAL_ENV_TYPE_START
    }

    /// Kind of a lexical environment.
    pub fn lexical_env_kind(&self, env: Value) -> LexicalEnvKind {
        debug_assert!(self.is_lexical_env(env));
        if self.object_word(env.cp()) & TYPE_MASK == LexicalEnvKind::ObjectBound as u32 {
            LexicalEnvKind::ObjectBound
        } else {
            LexicalEnvKind::Declarative
        }
    }

    /// `[[Extensible]]`.
    pub fn is_extensible(&self, obj: Value) -> bool {
        debug_assert!(obj.is_object());
        self.object_word(obj.cp()) & FLAG_EXTENSIBLE != 0
    }

    /// Clear or set `[[Extensible]]`.
    pub fn set_extensible(&mut self, obj: Value, extensible: bool) {
        debug_assert!(obj.is_object() && !self.is_lexical_env(obj));
        let word = self.object_word(obj.cp());
        let word = if extensible {
            word | FLAG_EXTENSIBLE
        } else {
            word & !FLAG_EXTENSIBLE
        };
        self.set_object_word(obj.cp(), word);
    }

    /// Prototype of an object, as an object value or `null`.
    pub fn object_prototype(&self, obj: Value) -> Value {
        debug_assert!(obj.is_object() && !self.is_lexical_env(obj));
        let proto = self.object_u2(obj.cp());
        if proto.is_null() {
            Value::NULL
        } else {
            Value::pointer(ValueTag::Object, proto)
        }
    }

    /// Outer environment of a lexical environment, or `null` at the
    /// chain end.
    pub fn outer_lexical_env(&self, env: Value) -> Value {
        debug_assert!(self.is_lexical_env(env));
        let outer = self.object_u2(env.cp());
        if outer.is_null() {
            Value::NULL
        } else {
            Value::pointer(ValueTag::Object, outer)
        }
    }

    /// Binding object of an object-bound environment.
    pub fn env_binding_object(&self, env: Value) -> Value {
        debug_assert!(self.lexical_env_kind(env) == LexicalEnvKind::ObjectBound);
        Value::pointer(ValueTag::Object, self.object_u1(env.cp()))
    }

    /// Whether the built-in flag is set (objects only; the same bit
    /// marks lexical environments).
    pub fn is_builtin(&self, obj: Value) -> bool {
        debug_assert!(obj.is_object());
        !self.is_lexical_env(obj)
            && self.object_word(obj.cp()) & FLAG_BUILT_IN_OR_LEXICAL_ENV != 0
    }

    /// Mark an extended object as a built-in with the given id.
    pub fn set_builtin_id(&mut self, obj: Value, id: u8) {
        debug_assert!(obj.is_object() && !self.is_lexical_env(obj));
        let word = self.object_word(obj.cp());
        self.set_object_word(obj.cp(), word | FLAG_BUILT_IN_OR_LEXICAL_ENV);
        self.heap.write_u8(obj.cp().offset() + EXT_OFFSET + 6, id);
    }

    /// Built-in id of a flagged object.
    pub fn builtin_id(&self, obj: Value) -> Option<u8> {
        if !self.is_builtin(obj) {
            return None;
        }
        Some(self.heap.read_u8(obj.cp().offset() + EXT_OFFSET + 6))
    }

    /// Class discriminator of a class object.
    pub fn class_id(&self, obj: Value) -> ClassId {
        debug_assert!(self.object_kind(obj) == ObjectKind::Class);
        ClassId::from(self.heap.read_u8(obj.cp().offset() + EXT_OFFSET))
    }

    pub(crate) fn class_extra_byte(&self, cp: Cp) -> u8 {
        self.heap.read_u8(cp.offset() + EXT_OFFSET + 1)
    }

    pub(crate) fn set_class_extra_byte(&mut self, cp: Cp, extra: u8) {
        self.heap.write_u8(cp.offset() + EXT_OFFSET + 1, extra);
    }

    /// Payload value of a class object (the boxed primitive, usually).
    pub fn class_payload(&self, obj: Value) -> Value {
        debug_assert!(self.object_kind(obj) == ObjectKind::Class);
        Value::from_raw(self.heap.read_u32(obj.cp().offset() + EXT_OFFSET + 2))
    }

    /// Store the class payload with property-slot ownership rules.
    pub fn set_class_payload(&mut self, obj: Value, value: Value) {
        debug_assert!(self.object_kind(obj) == ObjectKind::Class);
        let old = self.class_payload(obj);
        let stored = self.assign_value_if_not_object(old, value);
        self.set_class_payload_raw(obj.cp(), stored);
    }

    fn set_class_payload_raw(&mut self, cp: Cp, value: Value) {
        self.heap.write_u32(cp.offset() + EXT_OFFSET + 2, value.raw());
    }

    /// Array length.
    pub fn array_length(&self, obj: Value) -> u32 {
        debug_assert!(self.object_kind(obj) == ObjectKind::Array);
        self.heap.read_u32(obj.cp().offset() + EXT_OFFSET)
    }

    /// Set the array length field.
    pub fn set_array_length(&mut self, obj: Value, length: u32) {
        debug_assert!(self.object_kind(obj) == ObjectKind::Array);
        self.heap.write_u32(obj.cp().offset() + EXT_OFFSET, length);
    }

    /// Scope of a function object.
    pub fn function_scope(&self, obj: Value) -> Value {
        debug_assert!(self.object_kind(obj) == ObjectKind::Function);
        Value::pointer(ValueTag::Object, self.heap.read_cp(obj.cp().offset() + EXT_OFFSET))
    }

    /// Bytecode slot of a function object.
    pub fn function_bytecode(&self, obj: Value) -> Cp {
        debug_assert!(self.object_kind(obj) == ObjectKind::Function);
        self.heap
            .read_cp(obj.cp().offset() + EXT_OFFSET + CP_FIELD_SIZE)
    }

    /// Target of a bound function.
    pub fn bound_target(&self, obj: Value) -> Value {
        debug_assert!(self.object_kind(obj) == ObjectKind::BoundFunction);
        Value::pointer(ValueTag::Object, self.heap.read_cp(obj.cp().offset() + EXT_OFFSET))
    }

    // Reference counting. The counter tracks root references (API
    // handles, stack slots, context data); references between heap
    // objects are traced by the collector instead.

    pub(crate) fn ref_object(&mut self, cp: Cp) {
        let word = self.object_word(cp);
        debug_assert!(word & OBJECT_REF_MASK != crate::consts::OBJECT_NON_VISITED);
        if word & OBJECT_REF_MASK >= OBJECT_MAX_REF {
            self.fatal(FatalReason::RefCountOverflow);
        }
        self.set_object_word(cp, word + OBJECT_REF_ONE);
    }

    pub(crate) fn deref_object(&mut self, cp: Cp) {
        let word = self.object_word(cp);
        debug_assert!(word & OBJECT_REF_MASK >= OBJECT_REF_ONE);
        self.set_object_word(cp, word - OBJECT_REF_ONE);
    }

    pub(crate) fn object_is_extended(&self, cp: Cp) -> bool {
        if self.object_word(cp) & TYPE_MASK >= LEXICAL_ENV_TYPE_START {
            return false;
        }
        !matches!(
            ObjectKind::from((self.object_word(cp) & TYPE_MASK) as u8),
            ObjectKind::General | ObjectKind::Proxy
        )
    }

    // Native data attachments.

    /// Attach (or overwrite) host data under `info`. The info's address
    /// is the key; its `free_cb` fires when the object is swept.
    pub fn set_native_data(&mut self, obj: Value, info: &'static NativeInfo, data: usize) {
        debug_assert!(obj.is_object());

        if let Some(prop) = self.find_internal_property(obj.cp(), InternalId::NativePointer) {
            let mut slot_plus_one = self.pair_value(prop.pair, prop.index);
            while slot_plus_one != 0 {
                let index = (slot_plus_one - 1) as usize;
                let slot = self.natives[index].as_mut().expect("native slot missing");
                if core::ptr::eq(slot.info, info) {
                    slot.data = data;
                    return;
                }
                slot_plus_one = slot.next;
            }
            // Not found under this info: push a new chain head.
            let head = self.pair_value(prop.pair, prop.index);
            let index = self.alloc_native_slot(info, data, head);
            self.set_pair_value(prop.pair, prop.index, index + 1);
            return;
        }

        let index = self.alloc_native_slot(info, data, 0);
        self.create_internal_property(obj.cp(), InternalId::NativePointer, index + 1);
    }

    /// Host data registered under `info`, if any.
    pub fn native_data(&self, obj: Value, info: &'static NativeInfo) -> Option<usize> {
        let prop = self.find_internal_property(obj.cp(), InternalId::NativePointer)?;
        let mut slot_plus_one = self.pair_value(prop.pair, prop.index);
        while slot_plus_one != 0 {
            let slot = self.natives[(slot_plus_one - 1) as usize]
                .as_ref()
                .expect("native slot missing");
            if core::ptr::eq(slot.info, info) {
                return Some(slot.data);
            }
            slot_plus_one = slot.next;
        }
        None
    }

    /// Values the collector must keep alive on behalf of the attachment
    /// registered under `info`.
    pub fn native_tracked_values_mut(
        &mut self,
        obj: Value,
        info: &'static NativeInfo,
    ) -> Option<&mut Vec<Value>> {
        let prop = self.find_internal_property(obj.cp(), InternalId::NativePointer)?;
        let mut slot_plus_one = self.pair_value(prop.pair, prop.index);
        while slot_plus_one != 0 {
            let index = (slot_plus_one - 1) as usize;
            let found = {
                let slot = self.natives[index].as_ref().expect("native slot missing");
                if core::ptr::eq(slot.info, info) {
                    true
                } else {
                    slot_plus_one = slot.next;
                    false
                }
            };
            if found {
                let slot = self.natives[index].as_mut().expect("native slot missing");
                return Some(&mut slot.tracked);
            }
        }
        None
    }

    fn alloc_native_slot(&mut self, info: &'static NativeInfo, data: usize, next: u32) -> u32 {
        let slot = NativeSlot {
            info,
            data,
            tracked: Vec::new(),
            next,
        };
        match self.natives_free.pop() {
            Some(index) => {
                self.natives[index as usize] = Some(slot);
                index
            }
            None => {
                self.natives.push(Some(slot));
                (self.natives.len() - 1) as u32
            }
        }
    }

    /// Run the free callbacks of a native chain and return the registry
    /// slots. Called from property teardown during sweep.
    pub(crate) fn free_native_chain(&mut self, head_plus_one: u32) {
        let mut slot_plus_one = head_plus_one;
        while slot_plus_one != 0 {
            let index = (slot_plus_one - 1) as usize;
            let slot = self.natives[index].take().expect("native slot missing");
            self.natives_free.push(index as u32);
            if let Some(free_cb) = slot.info.free_cb {
                free_cb(slot.data);
            }
            slot_plus_one = slot.next;
        }
    }
}

// Descriptors are whole heap cells, and the descriptor word shares the
// compressed-pointer width by construction.
static_assertions::const_assert!(OBJECT_SIZE % Cp::ALIGN == 0);
static_assertions::const_assert!(EXTENDED_OBJECT_SIZE % Cp::ALIGN == 0);
static_assertions::const_assert!(property::PAIR_SIZE % Cp::ALIGN == 0);
static_assertions::const_assert!(core::mem::size_of::<CpRepr>() == CP_FIELD_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_id_round_trips() {
        for bits in 0..8u8 {
            assert_eq!(ClassId::from(bits) as u8, bits);
        }
    }
}
