//! Tagged value layer.
//!
//! A [`Value`] is one 32-bit word: three tag bits and a 29-bit payload.
//! Direct values carry their payload inline (a 28-bit signed integer or a
//! simple constant); every other tag holds a compressed pointer into the
//! heap. The layout follows `tag:3 | payload:29` with direct integers
//! shifted four bits and direct strings five.

use core::fmt;

use static_assertions::const_assert;

use ember_types::{
    Cp, CpRepr, DirectStringKind, SimpleValue, ValueTag, DIRECT_INTEGER_MAX, DIRECT_INTEGER_MIN,
    DIRECT_SHIFT, DIRECT_STRING_SHIFT, VALUE_TAG_BITS,
};

use crate::consts::{PRIMITIVE_MAX_REF, PRIMITIVE_REF_ONE};
use crate::context::Engine;
use crate::error::FatalReason;

// A value must be able to hold any compressed pointer in its payload.
const_assert!((Cp::MAX_HEAP_SIZE >> Cp::ALIGN_LOG2) <= (1usize << (32 - VALUE_TAG_BITS)));

/// Marks a direct value as a simple constant rather than an integer.
const SIMPLE_MARKER: u32 = 1 << VALUE_TAG_BITS;

/// Bit distinguishing `true` from `false`.
const BOOLEAN_BIT: u32 = 1 << DIRECT_SHIFT;

/// A 32-bit tagged engine value.
///
/// Copying the bits does not transfer ownership: use the engine's
/// `copy_value`/`free_value` pair (or `acquire`/`release` on the API
/// surface) to manage references behind pointer-tagged values.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u32);

impl Value {
    /// Uninitialized slot.
    pub const EMPTY: Value = Value::simple(SimpleValue::Empty);
    /// Marker telling the caller an exception is in flight.
    pub const ERROR_MARKER: Value = Value::simple(SimpleValue::ErrorMarker);
    /// `false`.
    pub const FALSE: Value = Value::simple(SimpleValue::False);
    /// `true`.
    pub const TRUE: Value = Value::simple(SimpleValue::True);
    /// `undefined`.
    pub const UNDEFINED: Value = Value::simple(SimpleValue::Undefined);
    /// `null`.
    pub const NULL: Value = Value::simple(SimpleValue::Null);
    /// Binding created but not yet initialized.
    pub const UNINITIALIZED: Value = Value::simple(SimpleValue::Uninitialized);
    /// Property lookup miss.
    pub const NOT_FOUND: Value = Value::simple(SimpleValue::NotFound);
    /// Array hole.
    pub const ARRAY_HOLE: Value = Value::simple(SimpleValue::ArrayHole);
    /// Interpreter register reference.
    pub const REGISTER_REF: Value = Value::simple(SimpleValue::RegisterRef);

    /// Direct integer zero.
    pub const ZERO: Value = Value::integer(0);

    /// The zero bigint: tag bits with a null pointer, no carrier block.
    pub const BIGINT_ZERO: Value = Value(ValueTag::BigInt as u32);

    pub(crate) const fn from_raw(raw: u32) -> Value {
        Value(raw)
    }

    pub(crate) const fn raw(self) -> u32 {
        self.0
    }

    /// Tag of this value.
    pub fn tag(self) -> ValueTag {
        ValueTag::from((self.0 & 0x7) as u8)
    }

    const fn simple(s: SimpleValue) -> Value {
        Value(((s as u32) << DIRECT_SHIFT) | SIMPLE_MARKER)
    }

    /// Build a direct integer value. `i` must be inside the direct range.
    pub const fn integer(i: i32) -> Value {
        debug_assert!(i >= DIRECT_INTEGER_MIN && i <= DIRECT_INTEGER_MAX);
        Value((i as u32) << DIRECT_SHIFT)
    }

    /// Payload of a direct integer value.
    pub const fn as_integer(self) -> i32 {
        (self.0 as i32) >> DIRECT_SHIFT
    }

    /// Build a boolean value.
    pub const fn boolean(b: bool) -> Value {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    pub(crate) fn pointer(tag: ValueTag, cp: Cp) -> Value {
        debug_assert!(!cp.is_null());
        Value(((cp.raw() as u32) << VALUE_TAG_BITS) | tag as u32)
    }

    pub(crate) fn cp(self) -> Cp {
        Cp::new((self.0 >> VALUE_TAG_BITS) as CpRepr)
    }

    pub(crate) const fn direct_string(kind: DirectStringKind, imm: u32) -> Value {
        Value(
            (imm << DIRECT_STRING_SHIFT)
                | ((kind as u32) << VALUE_TAG_BITS)
                | ValueTag::DirectString as u32,
        )
    }

    pub(crate) fn direct_string_kind(self) -> DirectStringKind {
        DirectStringKind::from(((self.0 >> VALUE_TAG_BITS) & 0x3) as u8)
    }

    pub(crate) const fn direct_string_imm(self) -> u32 {
        self.0 >> DIRECT_STRING_SHIFT
    }

    /// Whether the payload is inline (direct value or direct string).
    pub fn is_direct(self) -> bool {
        matches!(self.tag(), ValueTag::Direct | ValueTag::DirectString)
    }

    /// Whether this is a direct integer.
    pub const fn is_integer(self) -> bool {
        self.0 & (SIMPLE_MARKER | 0x7) == ValueTag::Direct as u32
    }

    /// Whether this is a simple constant.
    pub const fn is_simple(self) -> bool {
        self.0 & (SIMPLE_MARKER | 0x7) == SIMPLE_MARKER
    }

    /// Whether this is `true` or `false`. Booleans differ in one payload
    /// bit, so a single masked compare covers both.
    pub const fn is_boolean(self) -> bool {
        self.0 | BOOLEAN_BIT == Value::TRUE.0
    }

    /// Whether this is `true`.
    pub const fn is_true(self) -> bool {
        self.0 == Value::TRUE.0
    }

    /// Whether this is `false`.
    pub const fn is_false(self) -> bool {
        self.0 == Value::FALSE.0
    }

    /// Whether this is `undefined`.
    pub const fn is_undefined(self) -> bool {
        self.0 == Value::UNDEFINED.0
    }

    /// Whether this is `null`.
    pub const fn is_null(self) -> bool {
        self.0 == Value::NULL.0
    }

    /// Whether this is the in-flight exception marker.
    pub const fn is_error_marker(self) -> bool {
        self.0 == Value::ERROR_MARKER.0
    }

    /// Whether this is a boxed float.
    pub fn is_float(self) -> bool {
        self.tag() == ValueTag::Float
    }

    /// Whether this is a direct integer or a boxed float.
    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Whether this is a string (heap descriptor or direct encoding).
    pub fn is_string(self) -> bool {
        matches!(self.tag(), ValueTag::String | ValueTag::DirectString)
    }

    /// Whether this is an object reference.
    pub fn is_object(self) -> bool {
        self.tag() == ValueTag::Object
    }

    /// Whether this is a symbol.
    pub fn is_symbol(self) -> bool {
        self.tag() == ValueTag::Symbol
    }

    /// Whether this is an exception carrier reference.
    pub fn is_error_reference(self) -> bool {
        self.tag() == ValueTag::Error
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::boolean(b)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integer() {
            write!(f, "Value::integer({})", self.as_integer())
        } else if self.is_simple() {
            write!(
                f,
                "Value::{:?}",
                SimpleValue::from((self.0 >> DIRECT_SHIFT) as u8)
            )
        } else {
            write!(f, "Value({:?}, {:?})", self.tag(), self.cp())
        }
    }
}

/// Extended-primitive types stored in a carrier block behind the
/// `Error` and `BigInt` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PrimitiveKind {
    /// Thrown-value carrier.
    Error = 0,
    /// Thrown-value carrier that unwinds through every handler.
    Abort = 1,
    /// BigInt payload.
    BigInt = 2,
}

/// Byte size of an extended-primitive carrier: refs-and-type word plus
/// one value word.
pub(crate) const PRIMITIVE_SIZE: usize = 8;

impl Engine {
    /// Box `x` unless it round-trips through a direct integer. Negative
    /// zero must stay a float so its sign survives.
    pub fn make_number(&mut self, x: f64) -> Value {
        let i = x as i32;
        if f64::from(i) == x
            && (DIRECT_INTEGER_MIN..=DIRECT_INTEGER_MAX).contains(&i)
            && !(i == 0 && x.is_sign_negative())
        {
            return Value::integer(i);
        }
        self.make_float(x)
    }

    /// Box `x` unconditionally.
    pub fn make_float(&mut self, x: f64) -> Value {
        let cp = self.alloc_with_retry(8);
        self.heap.write_f64(cp.offset(), x);
        Value::pointer(ValueTag::Float, cp)
    }

    /// Payload of a boxed float.
    pub fn float_value(&self, v: Value) -> f64 {
        debug_assert!(v.is_float());
        self.heap.read_f64(v.cp().offset())
    }

    /// Numeric payload of a direct integer or boxed float.
    pub fn number_value(&self, v: Value) -> f64 {
        if v.is_integer() {
            f64::from(v.as_integer())
        } else {
            self.float_value(v)
        }
    }

    /// Replace the payload of a float value the caller owns. Returns a
    /// direct integer (and frees the box) when `x` permits, the same
    /// boxed value otherwise.
    pub fn update_float(&mut self, v: Value, x: f64) -> Value {
        debug_assert!(v.is_float());
        let i = x as i32;
        if f64::from(i) == x
            && (DIRECT_INTEGER_MIN..=DIRECT_INTEGER_MAX).contains(&i)
            && !(i == 0 && x.is_sign_negative())
        {
            self.heap.free(v.cp(), 8);
            return Value::integer(i);
        }
        self.heap.write_f64(v.cp().offset(), x);
        v
    }

    /// Duplicate a value, bumping reference counters behind pointer tags.
    pub fn copy_value(&mut self, v: Value) -> Value {
        match v.tag() {
            ValueTag::Direct | ValueTag::DirectString => v,
            ValueTag::Float => {
                let x = self.float_value(v);
                self.make_float(x)
            }
            ValueTag::String | ValueTag::Symbol => {
                self.ref_string_descriptor(v.cp());
                v
            }
            ValueTag::Object => {
                self.ref_object(v.cp());
                v
            }
            ValueTag::BigInt | ValueTag::Error => {
                if !v.cp().is_null() {
                    self.ref_primitive(v.cp());
                }
                v
            }
        }
    }

    /// Duplicate a value without touching object reference counters.
    /// Object references stored in properties are traced by the garbage
    /// collector instead of being counted.
    pub(crate) fn copy_value_if_not_object(&mut self, v: Value) -> Value {
        if v.is_object() {
            v
        } else {
            self.copy_value(v)
        }
    }

    /// Release a value: free a float box, drop a string or carrier
    /// reference, drop an object root reference. Direct values need no
    /// release.
    pub fn free_value(&mut self, v: Value) {
        match v.tag() {
            ValueTag::Direct | ValueTag::DirectString => {}
            ValueTag::Float => self.heap.free(v.cp(), 8),
            ValueTag::String | ValueTag::Symbol => self.deref_string_descriptor(v.cp()),
            ValueTag::Object => self.deref_object(v.cp()),
            ValueTag::BigInt | ValueTag::Error => {
                if !v.cp().is_null() {
                    self.deref_primitive(v.cp());
                }
            }
        }
    }

    /// Release a value unless it is an object reference; the property
    /// store and GC teardown paths own object lifetimes elsewhere.
    pub(crate) fn free_value_if_not_object(&mut self, v: Value) {
        if !v.is_object() {
            self.free_value(v);
        }
    }

    /// Overwrite `dst` with `src` and return the stored value, reusing a
    /// float box when both sides are floats and skipping all counter
    /// traffic when both are direct.
    pub fn assign_value(&mut self, dst: Value, src: Value) -> Value {
        if dst.is_direct() && src.is_direct() {
            return src;
        }
        if dst.is_float() && src.is_float() {
            let x = self.float_value(src);
            self.heap.write_f64(dst.cp().offset(), x);
            return dst;
        }
        if dst.raw() == src.raw() {
            return dst;
        }
        self.free_value(dst);
        self.copy_value(src)
    }

    /// Property-slot variant of [`Engine::assign_value`]: object
    /// references pass through uncounted.
    pub(crate) fn assign_value_if_not_object(&mut self, dst: Value, src: Value) -> Value {
        if dst.is_float() && src.is_float() {
            let x = self.float_value(src);
            self.heap.write_f64(dst.cp().offset(), x);
            return dst;
        }
        if dst.raw() == src.raw() && !dst.is_float() {
            return dst;
        }
        self.free_value_if_not_object(dst);
        self.copy_value_if_not_object(src)
    }

    /// Strict (`===`) equality.
    pub fn strict_equals(&self, a: Value, b: Value) -> bool {
        if a.is_number() || b.is_number() {
            if !(a.is_number() && b.is_number()) {
                return false;
            }
            return self.number_value(a) == self.number_value(b);
        }
        if a.raw() == b.raw() {
            return true;
        }
        if a.is_string() && b.is_string() {
            return self.string_eq(a, b);
        }
        false
    }

    // Extended primitives: error carriers and bigints share an 8-byte
    // block of `{refs_and_type, payload}`.

    pub(crate) fn alloc_primitive(&mut self, kind: PrimitiveKind, payload: u32) -> Cp {
        let cp = self.alloc_with_retry(PRIMITIVE_SIZE);
        self.heap
            .write_u32(cp.offset(), PRIMITIVE_REF_ONE | kind as u32);
        self.heap.write_u32(cp.offset() + 4, payload);
        cp
    }

    pub(crate) fn primitive_kind(&self, cp: Cp) -> PrimitiveKind {
        match self.heap.read_u32(cp.offset()) & 0x7 {
            0 => PrimitiveKind::Error,
            1 => PrimitiveKind::Abort,
            _ => PrimitiveKind::BigInt,
        }
    }

    pub(crate) fn primitive_payload(&self, cp: Cp) -> u32 {
        self.heap.read_u32(cp.offset() + 4)
    }

    pub(crate) fn ref_primitive(&mut self, cp: Cp) {
        let word = self.heap.read_u32(cp.offset());
        if word >= PRIMITIVE_MAX_REF {
            self.fatal(FatalReason::RefCountOverflow);
        }
        self.heap.write_u32(cp.offset(), word + PRIMITIVE_REF_ONE);
    }

    pub(crate) fn deref_primitive(&mut self, cp: Cp) {
        let word = self.heap.read_u32(cp.offset());
        debug_assert!(word >= PRIMITIVE_REF_ONE);
        let word = word - PRIMITIVE_REF_ONE;
        self.heap.write_u32(cp.offset(), word);
        if word >= PRIMITIVE_REF_ONE {
            return;
        }

        match self.primitive_kind(cp) {
            PrimitiveKind::Error | PrimitiveKind::Abort => {
                let value = Value::from_raw(self.primitive_payload(cp));
                self.free_value(value);
                self.heap.free(cp, PRIMITIVE_SIZE);
            }
            PrimitiveKind::BigInt => self.free_bigint(cp),
        }
    }

    // BigInt primitives appear here only as far as the value layer needs
    // them: construction, payload access and teardown. Arithmetic belongs
    // to the (external) built-in library.

    /// Build a single-limb bigint. Zero is the direct
    /// [`Value::BIGINT_ZERO`] encoding with no heap block.
    pub fn new_bigint_from_u64(&mut self, magnitude: u64, negative: bool) -> Value {
        if magnitude == 0 {
            return Value::BIGINT_ZERO;
        }
        let cp = self.alloc_with_retry(PRIMITIVE_SIZE + 8);
        self.heap
            .write_u32(cp.offset(), PRIMITIVE_REF_ONE | PrimitiveKind::BigInt as u32);
        self.heap.write_u32(cp.offset() + 4, (8 << 1) | negative as u32);
        self.heap.write_u64(cp.offset() + 8, magnitude);
        Value::pointer(ValueTag::BigInt, cp)
    }

    /// Magnitude and sign of a single-limb bigint.
    pub fn bigint_to_u64(&self, v: Value) -> (u64, bool) {
        debug_assert!(v.tag() == ValueTag::BigInt);
        if v.cp().is_null() {
            return (0, false);
        }
        let sign_and_size = self.primitive_payload(v.cp());
        let magnitude = self.heap.read_u64(v.cp().offset() + 8);
        (magnitude, sign_and_size & 1 != 0)
    }

    fn free_bigint(&mut self, cp: Cp) {
        let sign_and_size = self.primitive_payload(cp);
        let limb_bytes = (sign_and_size >> 1) as usize;
        self.heap.free(cp, PRIMITIVE_SIZE + limb_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_payload_round_trips() {
        for i in [0, 1, -1, 4096, DIRECT_INTEGER_MAX, DIRECT_INTEGER_MIN] {
            let v = Value::integer(i);
            assert!(v.is_integer());
            assert!(!v.is_simple());
            assert_eq!(v.as_integer(), i);
        }
    }

    #[test]
    fn simple_constants_are_distinct() {
        let all = [
            Value::EMPTY,
            Value::ERROR_MARKER,
            Value::FALSE,
            Value::TRUE,
            Value::UNDEFINED,
            Value::NULL,
            Value::UNINITIALIZED,
            Value::NOT_FOUND,
            Value::ARRAY_HOLE,
            Value::REGISTER_REF,
        ];
        for (i, a) in all.iter().enumerate() {
            assert!(a.is_simple());
            for b in &all[i + 1..] {
                assert_ne!(a.raw(), b.raw());
            }
        }
    }

    #[test]
    fn boolean_predicate_is_one_masked_compare() {
        assert!(Value::TRUE.is_boolean());
        assert!(Value::FALSE.is_boolean());
        assert!(!Value::UNDEFINED.is_boolean());
        assert!(!Value::integer(3).is_boolean());
        assert_eq!(Value::FALSE.raw() | BOOLEAN_BIT, Value::TRUE.raw());
    }

    #[test]
    fn direct_string_payload_round_trips() {
        let v = Value::direct_string(DirectStringKind::Uint, 4242);
        assert_eq!(v.tag(), ValueTag::DirectString);
        assert_eq!(v.direct_string_kind(), DirectStringKind::Uint);
        assert_eq!(v.direct_string_imm(), 4242);
        assert!(v.is_string());
        assert!(v.is_direct());
    }
}
