//! String store behavior: interning, concatenation, hashing, external
//! buffers and the builder.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::engine;
use ember_core::prelude::*;
use ember_core::string::magic;

#[test]
fn magic_bytes_intern_to_the_magic_handle() {
    // S1: constructing "length" from bytes yields the magic encoding.
    let mut e = engine();
    let constructed = e.new_string("length");
    assert_eq!(constructed, magic_string_value(MagicString::Length));

    // Two constructions are the same handle, bit for bit.
    let again = e.new_string("length");
    assert_eq!(constructed, again);
}

#[test]
fn concatenation_re_interns() {
    // S1 continued: "" + "length" collapses back to the magic string.
    let mut e = engine();
    let empty = e.new_string("");
    assert_eq!(empty, magic_string_value(MagicString::Empty));

    let length = e.new_string("length");
    let joined = e.concat_strings(empty, length);
    assert_eq!(joined, magic_string_value(MagicString::Length));
    e.release(length);

    // Also across a seam inside the word.
    let left = e.new_string("proto");
    let right = e.new_string("type");
    let joined = e.concat_strings(left, right);
    assert_eq!(joined, magic_string_value(MagicString::Prototype));
    e.release(right);
}

#[test]
fn numeric_strings_use_the_uint_encoding() {
    let mut e = engine();
    let forty_two = e.new_string("42");
    assert!(forty_two.is_direct());
    assert_eq!(e.string_to_std_string(forty_two), "42");

    // Non-canonical digit strings stay byte strings.
    let padded = e.new_string("042");
    assert!(!padded.is_direct());
    assert_eq!(e.string_to_std_string(padded), "042");
    e.release(padded);

    // Appending digits re-runs the numeric interning.
    let one = e.new_string("1");
    let two = e.new_string("2");
    let twelve = e.concat_strings(one, two);
    assert_eq!(twelve, e.new_string("12"));
    e.release(two);
}

#[test]
fn large_indexes_fall_back_to_descriptors() {
    let mut e = engine();
    // Above the direct-immediate bound but still a canonical index.
    let big = e.new_string("1000000");
    assert!(!big.is_direct());
    assert_eq!(e.string_to_std_string(big), "1000000");
    assert_eq!(e.string_size(big), 7);

    let same = e.new_string("1000000");
    assert!(e.string_eq(big, same));
    e.release(big);
    e.release(same);
}

#[test]
fn concat_hash_matches_from_scratch_hash() {
    let mut e = engine();
    let left = e.new_string("alpha-");
    let right = e.new_string("beta");
    let joined = e.concat_strings(left, right);

    let direct = e.new_string("alpha-beta");
    assert!(e.string_eq(joined, direct));
    // Equal content must observe the equal hash the hashmap relies on.
    let j = e.new_string("alpha-beta");
    assert!(e.string_eq(j, joined));
    e.release(right);
    e.release(joined);
    e.release(direct);
    e.release(j);
}

#[test]
fn cesu8_lengths_count_code_units() {
    let mut e = engine();
    let s = e.new_string("a\u{1f600}b");
    // One astral character is two UTF-16 code units, six CESU-8 bytes.
    assert_eq!(e.string_length(s), 4);
    assert_eq!(e.string_size(s), 8);
    assert_eq!(e.string_to_std_string(s), "a\u{1f600}b");
    e.release(s);
}

#[test]
fn builder_interns_its_result() {
    let mut e = engine();
    let mut b = StringBuilder::new(&mut e);
    b.append_str(&mut e, "under");
    b.append_str(&mut e, "lined");
    let s = b.finalize(&mut e);
    assert_eq!(e.string_to_std_string(s), "underlined");
    e.release(s);

    let mut b = StringBuilder::with_capacity(&mut e, 16);
    b.append_magic(&mut e, MagicString::Prototype);
    let s = b.finalize(&mut e);
    assert_eq!(s, magic_string_value(MagicString::Prototype));
}

#[test]
fn external_strings_report_and_release() {
    static RELEASED: AtomicUsize = AtomicUsize::new(0);
    fn on_free(_bytes: &'static [u8]) {
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    let mut e = engine();
    let s = e.new_external_string(b"outside the arena", Some(on_free));
    assert_eq!(e.string_size(s), 17);
    assert_eq!(e.string_to_std_string(s), "outside the arena");

    let copied = e.new_string("outside the arena");
    assert!(e.string_eq(s, copied));
    e.release(copied);

    assert_eq!(RELEASED.load(Ordering::SeqCst), 0);
    e.release(s);
    assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
}

#[test]
fn external_bytes_matching_a_special_form_are_interned() {
    static RELEASED: AtomicUsize = AtomicUsize::new(0);
    fn on_free(_bytes: &'static [u8]) {
        RELEASED.fetch_add(1, Ordering::SeqCst);
    }

    let mut e = engine();
    let s = e.new_external_string(b"length", Some(on_free));
    assert_eq!(s, magic_string_value(MagicString::Length));
    // The buffer was never adopted, so it is released immediately.
    assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
}

#[test]
fn registered_magic_tables_extend_interning() {
    let mut e = engine();
    e.register_magic_strings(&["gpio", "uart0"]).unwrap();

    let a = e.new_string("uart0");
    let b = e.new_string("uart0");
    assert_eq!(a, b);
    assert!(a.is_direct());
    assert_eq!(e.string_to_std_string(a), "uart0");

    // Unsorted tables are rejected.
    let mut e2 = engine();
    assert_eq!(
        e2.register_magic_strings(&["uart0", "gpio"]),
        Err(EngineError::UnsortedMagicTable)
    );
}

#[test]
fn symbols_compare_by_identity() {
    let mut e = engine();
    let desc = e.new_string("token");
    let s1 = e.new_symbol(desc);
    let s2 = e.new_symbol(desc);
    assert!(!e.string_eq(s1, s2));
    assert!(e.string_eq(s1, s1));

    let d = e.symbol_description(s1);
    assert!(e.string_eq(d, desc));

    e.release(desc);
    e.release(s1);
    e.release(s2);
}

#[test]
fn refcount_balance_returns_all_bytes() {
    // Law 7: balanced acquire/release nets a zero allocator delta.
    let mut e = engine();
    let baseline = e.allocated_bytes();

    let s = e.new_string("neither magic nor numeric");
    let extra = e.acquire(s);
    assert_eq!(extra, s);
    e.release(extra);
    e.release(s);

    assert_eq!(e.allocated_bytes(), baseline);
}

#[test]
fn every_magic_entry_interns_to_itself() {
    use strum::IntoEnumIterator;

    let mut e = engine();
    for id in MagicString::iter() {
        let constructed = e.new_string(magic::text(id));
        assert_eq!(constructed, magic_string_value(id), "{:?}", id);
    }
}
