//! String store.
//!
//! One logical string type with several physical layouts, picked to
//! minimize bytes: direct encodings inside the value word (magic table
//! index, small unsigned integer), heap descriptors for ASCII and CESU-8
//! payloads, and descriptor-only forms whose bytes live elsewhere
//! (uint32, external magic, host-owned external buffers).
//!
//! Construction always tries the special representations first, so two
//! constructions of the same magic or canonical-numeric byte sequence
//! yield bit-identical values and equality can start with an identity
//! check.

pub(crate) mod cesu8;
pub mod magic;

mod builder;

pub use builder::StringBuilder;
pub use magic::MagicString;

use ember_types::{Cp, DirectStringKind, StringContainer, ValueTag, DIRECT_STRING_MAX_IMM};

use crate::consts::{
    MAX_CHARS_IN_STRINGIFIED_UINT32, STRING_CONTAINER_MASK, STRING_MAX_REF, STRING_REF_ONE,
    STRING_STATIC_FLAG,
};
use crate::context::Engine;
use crate::error::{EngineError, FatalReason};
use crate::number::{number_to_uint32, parse_number, print_number};
use crate::value::Value;

/// Descriptor header: `{refs_and_container: u32, hash: u16, aux: u16}`.
pub(crate) const STR_HEADER_SIZE: usize = 8;

const STR_HASH_OFFSET: usize = 4;
const STR_AUX_OFFSET: usize = 6;
/// 32-bit payload slot of the descriptor-only containers, and the size
/// field of the long container.
const STR_PAYLOAD_OFFSET: usize = 8;
const STR_LONG_LENGTH_OFFSET: usize = 12;

const ASCII_DATA_OFFSET: usize = STR_HEADER_SIZE;
const UTF8_LENGTH_OFFSET: usize = 8;
const UTF8_DATA_OFFSET: usize = 10;
const LONG_DATA_OFFSET: usize = 16;

/// Allocation size of the descriptor-only containers.
const FIXED_DESC_SIZE: usize = 16;

/// 16-bit string hash: a djb2-style fold of the bytes.
pub(crate) fn string_hash(bytes: &[u8]) -> u16 {
    hash_combine(0, bytes)
}

/// Extend a hash with more bytes. `hash_combine(string_hash(a), b)`
/// equals `string_hash(a ‖ b)`, so concatenation never rehashes its left
/// argument.
pub(crate) fn hash_combine(mut hash: u16, bytes: &[u8]) -> u16 {
    for &b in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(u16::from(b));
    }
    hash
}

/// The value encoding of a built-in magic string.
pub fn magic_string_value(id: MagicString) -> Value {
    Value::direct_string(DirectStringKind::Magic, u32::from(id as u16))
}

/// Parse a canonical array index: decimal, no leading zero (except `"0"`
/// itself), fitting `u32`.
pub(crate) fn parse_array_index(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > MAX_CHARS_IN_STRINGIFIED_UINT32 {
        return None;
    }
    if bytes[0] == b'0' && bytes.len() > 1 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_add(u32::from(b - b'0'))?;
    }
    Some(value)
}

/// Registry slot backing an external string descriptor.
pub(crate) struct ExternalStringSlot {
    pub(crate) bytes: &'static [u8],
    pub(crate) length: u32,
    pub(crate) free_cb: Option<fn(&'static [u8])>,
}

impl Engine {
    /// Intern a Rust string. Four-byte UTF-8 sequences are re-encoded as
    /// CESU-8 surrogate pairs on the way in.
    pub fn new_string(&mut self, s: &str) -> Value {
        let cesu8_size = cesu8::cesu8_size_of_utf8(s);
        if cesu8_size == s.len() {
            return self.new_string_from_cesu8(s.as_bytes());
        }
        let mut converted = vec![0u8; cesu8_size];
        let written = cesu8::utf8_to_cesu8(s, &mut converted);
        debug_assert_eq!(written, cesu8_size);
        self.new_string_from_cesu8(&converted)
    }

    /// Intern a CESU-8 byte sequence.
    pub(crate) fn new_string_from_cesu8(&mut self, bytes: &[u8]) -> Value {
        debug_assert!(cesu8::is_valid_cesu8(bytes));
        if let Some(special) = self.find_special_string(bytes) {
            return special;
        }

        let length = cesu8::code_unit_length(bytes);
        let hash = string_hash(bytes);
        let (value, data_offset) = self.alloc_string_buffer(bytes.len(), length, hash);
        self.heap
            .bytes_mut(data_offset, bytes.len())
            .copy_from_slice(bytes);
        value
    }

    /// String for a `u32`, using the direct encoding when the value fits
    /// the immediate range.
    pub fn new_string_from_uint32(&mut self, value: u32) -> Value {
        if value <= DIRECT_STRING_MAX_IMM {
            return Value::direct_string(DirectStringKind::Uint, value);
        }
        let cp = self.alloc_string_descriptor(StringContainer::Uint32InDesc, FIXED_DESC_SIZE);
        self.heap
            .write_u16(cp.offset() + STR_HASH_OFFSET, value as u16);
        self.heap.write_u32(cp.offset() + STR_PAYLOAD_OFFSET, value);
        Value::pointer(ValueTag::String, cp)
    }

    /// String for a number per §9.8.1, reusing the uint32 fast path.
    pub fn new_string_from_number(&mut self, x: f64) -> Value {
        let as_uint32 = number_to_uint32(x);
        if f64::from(as_uint32) == x && !(x == 0.0 && x.is_sign_negative()) {
            return self.new_string_from_uint32(as_uint32);
        }
        let mut buf = [0u8; crate::consts::NUMBER_MAX_PRINT_SIZE];
        let len = print_number(x, &mut buf);
        self.new_string_from_cesu8(&buf[..len])
    }

    /// Wrap a host-owned byte buffer. The bytes must be valid CESU-8 and
    /// outlive the engine; `free_cb` runs when the last reference drops.
    /// Buffers matching a special representation are interned instead and
    /// released immediately.
    pub fn new_external_string(
        &mut self,
        bytes: &'static [u8],
        free_cb: Option<fn(&'static [u8])>,
    ) -> Value {
        debug_assert!(cesu8::is_valid_cesu8(bytes));
        if let Some(special) = self.find_special_string(bytes) {
            if let Some(cb) = free_cb {
                cb(bytes);
            }
            return special;
        }

        let slot = ExternalStringSlot {
            bytes,
            length: cesu8::code_unit_length(bytes),
            free_cb,
        };
        let index = match self.external_free.pop() {
            Some(index) => {
                self.externals[index as usize] = Some(slot);
                index
            }
            None => {
                self.externals.push(Some(slot));
                (self.externals.len() - 1) as u32
            }
        };

        let cp = self.alloc_string_descriptor(StringContainer::External, FIXED_DESC_SIZE);
        self.heap
            .write_u16(cp.offset() + STR_HASH_OFFSET, string_hash(bytes));
        self.heap.write_u32(cp.offset() + STR_PAYLOAD_OFFSET, index);
        Value::pointer(ValueTag::String, cp)
    }

    /// Create a unique symbol with the given description (a string or
    /// `undefined`).
    pub fn new_symbol(&mut self, description: Value) -> Value {
        debug_assert!(description.is_string() || description.is_undefined());
        let owned = self.copy_value(description);
        let cp = self.alloc_string_descriptor(StringContainer::Symbol, FIXED_DESC_SIZE);
        // Symbols compare by identity; any deterministic per-descriptor
        // hash spreads them in property hashmaps.
        self.heap
            .write_u16(cp.offset() + STR_HASH_OFFSET, cp.raw() as u16);
        self.heap
            .write_u32(cp.offset() + STR_PAYLOAD_OFFSET, owned.raw());
        Value::pointer(ValueTag::Symbol, cp)
    }

    /// Description value of a symbol.
    pub fn symbol_description(&self, v: Value) -> Value {
        debug_assert!(v.is_symbol());
        Value::from_raw(self.heap.read_u32(v.cp().offset() + STR_PAYLOAD_OFFSET))
    }

    /// Install a secondary magic string table. Entries must be sorted by
    /// length then bytes, and registration must happen before any string
    /// that could match an entry is constructed.
    pub fn register_magic_strings(
        &mut self,
        table: &'static [&'static str],
    ) -> Result<(), EngineError> {
        let sorted = table
            .windows(2)
            .all(|w| (w[0].len(), w[0].as_bytes()) < (w[1].len(), w[1].as_bytes()));
        if !sorted {
            return Err(EngineError::UnsortedMagicTable);
        }
        self.ext_magic = table;
        Ok(())
    }

    fn find_special_string(&mut self, bytes: &[u8]) -> Option<Value> {
        if let Some(id) = magic::find(bytes) {
            return Some(magic_string_value(id));
        }

        debug_assert!(!bytes.is_empty());

        if bytes[0].is_ascii_digit() {
            if let Some(index) = parse_array_index(bytes) {
                return Some(self.new_string_from_uint32(index));
            }
        }

        if !self.ext_magic.is_empty() {
            if let Ok(pos) = self.ext_magic.binary_search_by(|entry| {
                (entry.len(), entry.as_bytes()).cmp(&(bytes.len(), bytes))
            }) {
                return Some(self.make_ext_magic_string(pos as u32));
            }
        }

        None
    }

    fn make_ext_magic_string(&mut self, ext_index: u32) -> Value {
        let id = magic::count() + ext_index;
        if id <= DIRECT_STRING_MAX_IMM {
            return Value::direct_string(DirectStringKind::Magic, id);
        }
        let bytes = self.ext_magic[ext_index as usize].as_bytes();
        let hash = string_hash(bytes);
        let cp = self.alloc_string_descriptor(StringContainer::MagicEx, FIXED_DESC_SIZE);
        self.heap.write_u16(cp.offset() + STR_HASH_OFFSET, hash);
        self.heap.write_u32(cp.offset() + STR_PAYLOAD_OFFSET, id);
        Value::pointer(ValueTag::String, cp)
    }

    fn alloc_string_descriptor(&mut self, container: StringContainer, size: usize) -> Cp {
        let cp = self.alloc_with_retry(size);
        self.heap
            .write_u32(cp.offset(), STRING_REF_ONE | container as u32);
        cp
    }

    /// Allocate the narrowest heap layout for a payload of `size` bytes
    /// and `length` code units; returns the value and the payload offset.
    fn alloc_string_buffer(&mut self, size: usize, length: u32, hash: u16) -> (Value, usize) {
        debug_assert!(size <= u32::MAX as usize);

        let (container, total, data_offset) = if size == length as usize && size <= 0xffff {
            (StringContainer::HeapAscii, ASCII_DATA_OFFSET + size, ASCII_DATA_OFFSET)
        } else if size <= 0xffff {
            (StringContainer::HeapUtf8, UTF8_DATA_OFFSET + size, UTF8_DATA_OFFSET)
        } else {
            (StringContainer::HeapLongUtf8, LONG_DATA_OFFSET + size, LONG_DATA_OFFSET)
        };

        let cp = self.alloc_string_descriptor(container, total);
        let off = cp.offset();
        self.heap.write_u16(off + STR_HASH_OFFSET, hash);
        match container {
            StringContainer::HeapAscii => {
                self.heap.write_u16(off + STR_AUX_OFFSET, size as u16);
            }
            StringContainer::HeapUtf8 => {
                self.heap.write_u16(off + STR_AUX_OFFSET, size as u16);
                self.heap.write_u16(off + UTF8_LENGTH_OFFSET, length as u16);
            }
            _ => {
                self.heap.write_u32(off + STR_PAYLOAD_OFFSET, size as u32);
                self.heap.write_u32(off + STR_LONG_LENGTH_OFFSET, length);
            }
        }

        (Value::pointer(ValueTag::String, cp), off + data_offset)
    }

    pub(crate) fn string_container(&self, cp: Cp) -> StringContainer {
        StringContainer::from((self.heap.read_u32(cp.offset()) & STRING_CONTAINER_MASK) as u8)
    }

    /// Byte size of a string.
    pub fn string_size(&self, v: Value) -> u32 {
        match self.string_repr(v) {
            StringRepr::Magic(index) => self.magic_bytes(index).len() as u32,
            StringRepr::Uint(value) => uint32_decimal_size(value),
            StringRepr::Heap(cp) => {
                let off = cp.offset();
                match self.string_container(cp) {
                    StringContainer::HeapAscii | StringContainer::HeapUtf8 => {
                        u32::from(self.heap.read_u16(off + STR_AUX_OFFSET))
                    }
                    StringContainer::HeapLongUtf8 => self.heap.read_u32(off + STR_PAYLOAD_OFFSET),
                    StringContainer::Uint32InDesc => {
                        uint32_decimal_size(self.heap.read_u32(off + STR_PAYLOAD_OFFSET))
                    }
                    StringContainer::MagicEx => {
                        let id = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.magic_bytes(id).len() as u32
                    }
                    StringContainer::External => {
                        let slot = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.external_slot(slot).bytes.len() as u32
                    }
                    StringContainer::Symbol => 0,
                }
            }
        }
    }

    /// Code-unit length of a string.
    pub fn string_length(&self, v: Value) -> u32 {
        match self.string_repr(v) {
            StringRepr::Magic(index) => self.magic_bytes(index).len() as u32,
            StringRepr::Uint(value) => uint32_decimal_size(value),
            StringRepr::Heap(cp) => {
                let off = cp.offset();
                match self.string_container(cp) {
                    StringContainer::HeapAscii => {
                        u32::from(self.heap.read_u16(off + STR_AUX_OFFSET))
                    }
                    StringContainer::HeapUtf8 => {
                        u32::from(self.heap.read_u16(off + UTF8_LENGTH_OFFSET))
                    }
                    StringContainer::HeapLongUtf8 => {
                        self.heap.read_u32(off + STR_LONG_LENGTH_OFFSET)
                    }
                    StringContainer::Uint32InDesc => {
                        uint32_decimal_size(self.heap.read_u32(off + STR_PAYLOAD_OFFSET))
                    }
                    StringContainer::MagicEx => {
                        let id = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.magic_bytes(id).len() as u32
                    }
                    StringContainer::External => {
                        let slot = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.external_slot(slot).length
                    }
                    StringContainer::Symbol => 0,
                }
            }
        }
    }

    /// Hash of a string. Direct uints derive it from the value, all other
    /// representations from the bytes.
    pub(crate) fn str_hash(&self, v: Value) -> u16 {
        match self.string_repr(v) {
            StringRepr::Magic(index) => {
                if index < magic::count() {
                    magic::hash_by_index(index)
                } else {
                    string_hash(self.magic_bytes(index))
                }
            }
            StringRepr::Uint(value) => value as u16,
            StringRepr::Heap(cp) => self.heap.read_u16(cp.offset() + STR_HASH_OFFSET),
        }
    }

    /// Bytes of a string. `scratch` backs the representations that have
    /// no stored bytes (uint forms).
    pub(crate) fn string_chars<'a>(
        &'a self,
        v: Value,
        scratch: &'a mut [u8; MAX_CHARS_IN_STRINGIFIED_UINT32],
    ) -> &'a [u8] {
        match self.string_repr(v) {
            StringRepr::Magic(index) => self.magic_bytes(index),
            StringRepr::Uint(value) => {
                let len = crate::number::uint32_to_digits(value, scratch);
                &scratch[..len]
            }
            StringRepr::Heap(cp) => {
                let off = cp.offset();
                match self.string_container(cp) {
                    StringContainer::HeapAscii => {
                        let size = usize::from(self.heap.read_u16(off + STR_AUX_OFFSET));
                        self.heap.bytes(off + ASCII_DATA_OFFSET, size)
                    }
                    StringContainer::HeapUtf8 => {
                        let size = usize::from(self.heap.read_u16(off + STR_AUX_OFFSET));
                        self.heap.bytes(off + UTF8_DATA_OFFSET, size)
                    }
                    StringContainer::HeapLongUtf8 => {
                        let size = self.heap.read_u32(off + STR_PAYLOAD_OFFSET) as usize;
                        self.heap.bytes(off + LONG_DATA_OFFSET, size)
                    }
                    StringContainer::Uint32InDesc => {
                        let value = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        let len = crate::number::uint32_to_digits(value, scratch);
                        &scratch[..len]
                    }
                    StringContainer::MagicEx => {
                        let id = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.magic_bytes(id)
                    }
                    StringContainer::External => {
                        let slot = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                        self.external_slot(slot).bytes
                    }
                    StringContainer::Symbol => &[],
                }
            }
        }
    }

    /// CESU-8 bytes of a string as an owned vector.
    pub fn string_bytes_vec(&self, v: Value) -> Vec<u8> {
        let mut scratch = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
        self.string_chars(v, &mut scratch).to_vec()
    }

    /// Convert a string back into UTF-8, re-joining surrogate pairs.
    pub fn string_to_std_string(&self, v: Value) -> String {
        let mut scratch = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
        let bytes = self.string_chars(v, &mut scratch);

        let mut out = String::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            let (unit, width) = cesu8::code_unit_at(bytes, pos);
            pos += width;
            if (0xd800..0xdc00).contains(&unit) && pos < bytes.len() {
                let (low, low_width) = cesu8::code_unit_at(bytes, pos);
                if (0xdc00..0xe000).contains(&low) {
                    pos += low_width;
                    let c = 0x10000
                        + ((u32::from(unit) - 0xd800) << 10)
                        + (u32::from(low) - 0xdc00);
                    out.push(char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER));
                    continue;
                }
            }
            out.push(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
        }
        out
    }

    /// Whether this is the empty string. Interning guarantees the empty
    /// string is always the magic id-zero encoding.
    pub fn string_is_empty(&self, v: Value) -> bool {
        v == magic_string_value(MagicString::Empty)
    }

    /// Content equality.
    pub fn string_eq(&self, a: Value, b: Value) -> bool {
        debug_assert!(a.is_string() || a.is_symbol());
        debug_assert!(b.is_string() || b.is_symbol());

        if a.raw() == b.raw() {
            return true;
        }
        if a.is_symbol() || b.is_symbol() {
            return false;
        }

        match (self.string_repr(a), self.string_repr(b)) {
            // Special representations are canonical: different encodings
            // of the same class cannot be equal.
            (StringRepr::Magic(x), StringRepr::Magic(y)) => x == y,
            (StringRepr::Uint(x), StringRepr::Uint(y)) => x == y,
            (StringRepr::Heap(x), StringRepr::Heap(y)) => self.heap_strings_eq(x, y),
            (StringRepr::Heap(cp), other) | (other, StringRepr::Heap(cp)) => {
                // A heap descriptor can only collide with a direct form
                // through the uint and magic-ex containers.
                match (self.string_container(cp), other) {
                    (StringContainer::Uint32InDesc, StringRepr::Uint(value)) => {
                        self.heap.read_u32(cp.offset() + STR_PAYLOAD_OFFSET) == value
                    }
                    (StringContainer::MagicEx, StringRepr::Magic(id)) => {
                        self.heap.read_u32(cp.offset() + STR_PAYLOAD_OFFSET) == id
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn heap_strings_eq(&self, a: Cp, b: Cp) -> bool {
        let ca = self.string_container(a);
        let cb = self.string_container(b);

        match (ca, cb) {
            (StringContainer::Uint32InDesc, StringContainer::Uint32InDesc)
            | (StringContainer::MagicEx, StringContainer::MagicEx) => {
                self.heap.read_u32(a.offset() + STR_PAYLOAD_OFFSET)
                    == self.heap.read_u32(b.offset() + STR_PAYLOAD_OFFSET)
            }
            (StringContainer::Symbol, _) | (_, StringContainer::Symbol) => false,
            _ => {
                if !is_byte_backed(ca) || !is_byte_backed(cb) {
                    return false;
                }
                if self.heap.read_u16(a.offset() + STR_HASH_OFFSET)
                    != self.heap.read_u16(b.offset() + STR_HASH_OFFSET)
                {
                    return false;
                }
                let mut scratch_a = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
                let mut scratch_b = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
                let va = Value::pointer(ValueTag::String, a);
                let vb = Value::pointer(ValueTag::String, b);
                self.string_chars(va, &mut scratch_a) == self.string_chars(vb, &mut scratch_b)
            }
        }
    }

    /// Concatenate two strings. Takes ownership of `a`'s reference and
    /// returns an owned result; `b` is only read. The combined bytes are
    /// re-interned so `"" + "length"` collapses to the magic string.
    pub fn concat_strings(&mut self, a: Value, b: Value) -> Value {
        debug_assert!(a.is_string() && b.is_string());
        if self.string_is_empty(a) {
            return self.copy_value(b);
        }
        if self.string_is_empty(b) {
            return a;
        }

        let a_bytes = self.string_bytes_vec(a);
        let b_bytes = self.string_bytes_vec(b);

        let Some(new_size) = a_bytes.len().checked_add(b_bytes.len()) else {
            self.fatal(FatalReason::OutOfMemory);
        };

        if let Some(id) = magic::find_pair(&a_bytes, &b_bytes) {
            self.free_value(a);
            return magic_string_value(id);
        }

        if self.string_is_uint_form(a) && new_size <= MAX_CHARS_IN_STRINGIFIED_UINT32 {
            let mut combined = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
            combined[..a_bytes.len()].copy_from_slice(&a_bytes);
            combined[a_bytes.len()..new_size].copy_from_slice(&b_bytes);
            if let Some(index) = parse_array_index(&combined[..new_size]) {
                self.free_value(a);
                return self.new_string_from_uint32(index);
            }
        }

        if let Some(value) = self.find_ext_magic_pair(&a_bytes, &b_bytes) {
            self.free_value(a);
            return value;
        }

        // Reuse the left hash where one is stored; uint forms have a
        // value-derived hash and need the bytes folded from scratch.
        let hash_start = if self.string_is_uint_form(a) {
            string_hash(&a_bytes)
        } else {
            self.str_hash(a)
        };
        let hash = hash_combine(hash_start, &b_bytes);

        let length = self.string_length(a) + self.string_length(b);
        let (value, data_offset) = self.alloc_string_buffer(new_size, length, hash);
        self.heap
            .bytes_mut(data_offset, a_bytes.len())
            .copy_from_slice(&a_bytes);
        self.heap
            .bytes_mut(data_offset + a_bytes.len(), b_bytes.len())
            .copy_from_slice(&b_bytes);

        self.free_value(a);
        value
    }

    /// `ToNumber` on a string value.
    pub fn string_to_number(&self, v: Value) -> f64 {
        let mut scratch = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
        parse_number(self.string_chars(v, &mut scratch))
    }

    fn string_is_uint_form(&self, v: Value) -> bool {
        match self.string_repr(v) {
            StringRepr::Uint(_) => true,
            StringRepr::Heap(cp) => self.string_container(cp) == StringContainer::Uint32InDesc,
            StringRepr::Magic(_) => false,
        }
    }

    fn find_ext_magic_pair(&mut self, left: &[u8], right: &[u8]) -> Option<Value> {
        if self.ext_magic.is_empty() {
            return None;
        }
        let total = left.len() + right.len();
        let start = self.ext_magic.partition_point(|e| e.len() < total);
        for (index, entry) in self.ext_magic.iter().enumerate().skip(start) {
            let entry = entry.as_bytes();
            if entry.len() != total {
                break;
            }
            if &entry[..left.len()] == left && &entry[left.len()..] == right {
                return Some(self.make_ext_magic_string(index as u32));
            }
        }
        None
    }

    // Reference counting. Direct strings are exempt; so are descriptors
    // carrying the static flag.

    /// Exempt a descriptor from reference counting. Used for strings
    /// whose storage outlives every reference, e.g. descriptors a
    /// snapshot loader pins for the engine lifetime.
    pub fn mark_string_static(&mut self, v: Value) {
        debug_assert!(v.is_string() && !v.is_direct());
        let off = v.cp().offset();
        let word = self.heap.read_u32(off);
        self.heap.write_u32(off, word | STRING_STATIC_FLAG);
    }

    pub(crate) fn ref_string_descriptor(&mut self, cp: Cp) {
        let word = self.heap.read_u32(cp.offset());
        if word & STRING_STATIC_FLAG != 0 {
            return;
        }
        if word >= STRING_MAX_REF {
            self.fatal(FatalReason::RefCountOverflow);
        }
        self.heap.write_u32(cp.offset(), word + STRING_REF_ONE);
    }

    pub(crate) fn deref_string_descriptor(&mut self, cp: Cp) {
        let word = self.heap.read_u32(cp.offset());
        if word & STRING_STATIC_FLAG != 0 {
            return;
        }
        debug_assert!(word >= STRING_REF_ONE);
        let word = word - STRING_REF_ONE;
        self.heap.write_u32(cp.offset(), word);
        if word < STRING_REF_ONE {
            self.destroy_string_descriptor(cp);
        }
    }

    fn destroy_string_descriptor(&mut self, cp: Cp) {
        let off = cp.offset();
        match self.string_container(cp) {
            StringContainer::HeapAscii => {
                let size = usize::from(self.heap.read_u16(off + STR_AUX_OFFSET));
                self.heap.free(cp, ASCII_DATA_OFFSET + size);
            }
            StringContainer::HeapUtf8 => {
                let size = usize::from(self.heap.read_u16(off + STR_AUX_OFFSET));
                self.heap.free(cp, UTF8_DATA_OFFSET + size);
            }
            StringContainer::HeapLongUtf8 => {
                let size = self.heap.read_u32(off + STR_PAYLOAD_OFFSET) as usize;
                self.heap.free(cp, LONG_DATA_OFFSET + size);
            }
            StringContainer::Uint32InDesc | StringContainer::MagicEx => {
                self.heap.free(cp, FIXED_DESC_SIZE);
            }
            StringContainer::Symbol => {
                let description =
                    Value::from_raw(self.heap.read_u32(off + STR_PAYLOAD_OFFSET));
                self.free_value(description);
                self.heap.free(cp, FIXED_DESC_SIZE);
            }
            StringContainer::External => {
                let index = self.heap.read_u32(off + STR_PAYLOAD_OFFSET);
                let slot = self.externals[index as usize]
                    .take()
                    .expect("external string slot already freed");
                self.external_free.push(index);
                if let Some(cb) = slot.free_cb {
                    cb(slot.bytes);
                }
                self.heap.free(cp, FIXED_DESC_SIZE);
            }
        }
    }

    fn external_slot(&self, index: u32) -> &ExternalStringSlot {
        self.externals[index as usize]
            .as_ref()
            .expect("external string slot missing")
    }

    fn magic_bytes(&self, index: u32) -> &'static [u8] {
        if index < magic::count() {
            magic::bytes_by_index(index)
        } else {
            self.ext_magic[(index - magic::count()) as usize].as_bytes()
        }
    }

    fn string_repr(&self, v: Value) -> StringRepr {
        match v.tag() {
            ValueTag::DirectString => match v.direct_string_kind() {
                DirectStringKind::Magic => StringRepr::Magic(v.direct_string_imm()),
                DirectStringKind::Uint => StringRepr::Uint(v.direct_string_imm()),
                _ => unreachable!("ptr/special kinds never appear in string values"),
            },
            ValueTag::String | ValueTag::Symbol => StringRepr::Heap(v.cp()),
            _ => unreachable!("not a string value"),
        }
    }
}

/// Physical classification used by size/length/equality dispatch.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StringRepr {
    /// Magic table index (built-in or external).
    Magic(u32),
    /// Direct unsigned integer.
    Uint(u32),
    /// Heap descriptor.
    Heap(Cp),
}

fn is_byte_backed(container: StringContainer) -> bool {
    matches!(
        container,
        StringContainer::HeapAscii
            | StringContainer::HeapUtf8
            | StringContainer::HeapLongUtf8
            | StringContainer::External
    )
}

const fn uint32_decimal_size(value: u32) -> u32 {
    let mut size = 1;
    let mut v = value;
    while v >= 10 {
        size += 1;
        v /= 10;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineConfig;

    #[test]
    fn static_strings_skip_refcounting() {
        let mut e = Engine::new(EngineConfig {
            heap_size: 16 * 1024,
        })
        .unwrap();

        let s = e.new_string("pinned by the embedder");
        e.mark_string_static(s);

        // Unbalanced releases must not destroy the descriptor.
        e.release(s);
        e.release(s);
        assert_eq!(e.string_to_std_string(s), "pinned by the embedder");
    }

    #[test]
    fn hash_combine_matches_full_hash() {
        let full = string_hash(b"lexical environment");
        let combined = hash_combine(string_hash(b"lexical "), b"environment");
        assert_eq!(full, combined);
    }

    #[test]
    fn array_index_grammar() {
        assert_eq!(parse_array_index(b"0"), Some(0));
        assert_eq!(parse_array_index(b"42"), Some(42));
        assert_eq!(parse_array_index(b"4294967295"), Some(u32::MAX));
        assert_eq!(parse_array_index(b"012"), None);
        assert_eq!(parse_array_index(b""), None);
        assert_eq!(parse_array_index(b"4294967296"), None);
        assert_eq!(parse_array_index(b"1e3"), None);
    }

    #[test]
    fn decimal_size() {
        assert_eq!(uint32_decimal_size(0), 1);
        assert_eq!(uint32_decimal_size(9), 1);
        assert_eq!(uint32_decimal_size(10), 2);
        assert_eq!(uint32_decimal_size(u32::MAX), 10);
    }
}
