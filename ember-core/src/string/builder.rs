//! Rope-style string builder.
//!
//! Accumulates CESU-8 bytes in a heap block that is grown geometrically
//! with the arena's realloc and is invisible to the collector (no
//! descriptor refers to it until `finalize`). Finalizing runs the bytes
//! through the interning pipeline, collapsing results that match a magic
//! or canonical-numeric form, and releases the scratch block.
//!
//! A builder must be consumed with [`StringBuilder::finalize`] or
//! [`StringBuilder::discard`]; dropping one on the floor leaks its block
//! until the engine goes away.

use ember_types::Cp;

use crate::consts::MAX_CHARS_IN_STRINGIFIED_UINT32;
use crate::context::Engine;
use crate::string::cesu8;
use crate::string::magic::{self, MagicString};
use crate::value::Value;

const INITIAL_CAPACITY: usize = 32;

/// Accumulates string content before committing it to a descriptor.
pub struct StringBuilder {
    block: Cp,
    size: usize,
    capacity: usize,
}

impl StringBuilder {
    /// Empty builder with a small scratch block.
    pub fn new(engine: &mut Engine) -> Self {
        Self::with_capacity(engine, INITIAL_CAPACITY)
    }

    /// Builder sized for `capacity` bytes up front; grows geometrically
    /// past it.
    pub fn with_capacity(engine: &mut Engine, capacity: usize) -> Self {
        let capacity = crate::heap::Heap::cell_size(capacity.max(Cp::ALIGN));
        StringBuilder {
            block: engine.alloc_with_retry(capacity),
            size: 0,
            capacity,
        }
    }

    /// Bytes collected so far.
    pub fn size(&self) -> usize {
        self.size
    }

    fn reserve(&mut self, engine: &mut Engine, extra: usize) {
        let needed = self.size + extra;
        if needed <= self.capacity {
            return;
        }
        let mut new_capacity = self.capacity * 2;
        while new_capacity < needed {
            new_capacity *= 2;
        }
        self.block = engine.realloc_with_retry(self.block, self.capacity, new_capacity);
        self.capacity = new_capacity;
    }

    /// Append raw CESU-8 bytes.
    pub fn append_cesu8(&mut self, engine: &mut Engine, bytes: &[u8]) {
        self.reserve(engine, bytes.len());
        engine
            .heap
            .bytes_mut(self.block.offset() + self.size, bytes.len())
            .copy_from_slice(bytes);
        self.size += bytes.len();
    }

    /// Append a Rust string, converting astral characters to surrogate
    /// pairs.
    pub fn append_str(&mut self, engine: &mut Engine, s: &str) {
        let converted_size = cesu8::cesu8_size_of_utf8(s);
        if converted_size == s.len() {
            self.append_cesu8(engine, s.as_bytes());
            return;
        }
        let mut converted = vec![0u8; converted_size];
        let written = cesu8::utf8_to_cesu8(s, &mut converted);
        debug_assert_eq!(written, converted_size);
        self.append_cesu8(engine, &converted);
    }

    /// Append one UTF-16 code unit.
    pub fn append_code_unit(&mut self, engine: &mut Engine, unit: u16) {
        let mut bytes = [0u8; cesu8::MAX_BYTES_IN_CODE_UNIT];
        let width = cesu8::encode_code_unit(unit, &mut bytes);
        self.append_cesu8(engine, &bytes[..width]);
    }

    /// Append a magic string.
    pub fn append_magic(&mut self, engine: &mut Engine, id: MagicString) {
        self.append_cesu8(engine, magic::text(id).as_bytes());
    }

    /// Append an engine string value.
    pub fn append_value(&mut self, engine: &mut Engine, v: Value) {
        let mut scratch = [0u8; MAX_CHARS_IN_STRINGIFIED_UINT32];
        let bytes = engine.string_chars(v, &mut scratch).to_vec();
        self.append_cesu8(engine, &bytes);
    }

    /// Commit the collected bytes: intern or allocate the final string,
    /// release the scratch block.
    pub fn finalize(self, engine: &mut Engine) -> Value {
        let bytes = engine.heap.bytes(self.block.offset(), self.size).to_vec();
        engine.heap.free(self.block, self.capacity);
        engine.new_string_from_cesu8(&bytes)
    }

    /// Throw the collected bytes away.
    pub fn discard(self, engine: &mut Engine) {
        engine.heap.free(self.block, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineConfig;
    use crate::string::magic_string_value;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            heap_size: 32 * 1024,
        })
        .unwrap()
    }

    #[test]
    fn builder_accumulates_pieces() {
        let mut e = engine();
        let mut b = StringBuilder::new(&mut e);
        b.append_str(&mut e, "con");
        b.append_cesu8(&mut e, b"cat");
        assert_eq!(b.size(), 6);
        let s = b.finalize(&mut e);
        assert_eq!(e.string_to_std_string(s), "concat");
        e.release(s);
    }

    #[test]
    fn growth_crosses_the_initial_capacity() {
        let mut e = engine();
        let mut b = StringBuilder::new(&mut e);
        for _ in 0..100 {
            b.append_cesu8(&mut e, b"0123456789");
        }
        assert_eq!(b.size(), 1000);
        let s = b.finalize(&mut e);
        assert_eq!(e.string_size(s), 1000);
        e.release(s);
    }

    #[test]
    fn code_units_encode_as_cesu8() {
        let mut e = engine();
        let mut b = StringBuilder::new(&mut e);
        b.append_code_unit(&mut e, 0x41);
        b.append_code_unit(&mut e, 0xd83d);
        b.append_code_unit(&mut e, 0xde00);
        assert_eq!(b.size(), 1 + 3 + 3);
        let s = b.finalize(&mut e);
        assert_eq!(e.string_length(s), 3);
        e.release(s);
    }

    #[test]
    fn finalize_interns_magic_results() {
        let mut e = engine();
        let baseline = e.allocated_bytes();
        let mut b = StringBuilder::new(&mut e);
        b.append_magic(&mut e, MagicString::Prototype);
        let s = b.finalize(&mut e);
        assert_eq!(s, magic_string_value(MagicString::Prototype));
        assert_eq!(e.allocated_bytes(), baseline);
    }

    #[test]
    fn discard_releases_the_scratch_block() {
        let mut e = engine();
        let baseline = e.allocated_bytes();
        let mut b = StringBuilder::new(&mut e);
        b.append_str(&mut e, "throwaway");
        b.discard(&mut e);
        assert_eq!(e.allocated_bytes(), baseline);
    }
}
