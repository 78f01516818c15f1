//! Number codec laws: round-trip exactness, integer tagging, the
//! negative-zero rule, and the §9.3/§9.8 scenario conversions.

mod common;

use common::engine;
use ember_core::prelude::*;
use quickcheck_macros::quickcheck;

fn printed(x: f64) -> String {
    let mut buf = [0u8; 32];
    let len = print_number(x, &mut buf);
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[quickcheck]
fn parse_print_round_trips_every_double(bits: u64) -> bool {
    let x = f64::from_bits(bits);
    let back = parse_number(printed(x).as_bytes());
    if x.is_nan() {
        // NaN round-trips to some NaN.
        return back.is_nan();
    }
    if x == 0.0 {
        // Both zeros print as "0"; the sign of negative zero is the one
        // piece of information §9.8.1 deliberately drops.
        return back == 0.0 && back.is_sign_positive();
    }
    back.to_bits() == x.to_bits()
}

#[quickcheck]
fn integer_tagging_in_range(i: i32) -> bool {
    let mut e = engine();
    let i = i.clamp(-0x800_0000, 0x7ff_ffff);
    let v = e.make_number(f64::from(i));
    v.is_integer() && v.as_integer() == i
}

#[test]
fn integers_just_outside_the_range_box_as_floats() {
    let mut e = engine();
    for x in [f64::from(0x7ff_ffff) + 1.0, f64::from(-0x800_0000) - 1.0] {
        let v = e.make_number(x);
        assert!(v.is_float());
        assert_eq!(e.number_value(v), x);
        e.release(v);
    }
    for x in [f64::from(0x7ff_ffff), f64::from(-0x800_0000)] {
        assert!(e.make_number(x).is_integer());
    }
}

#[test]
fn negative_zero_never_tags_direct() {
    let mut e = engine();
    let v = e.make_number(-0.0);
    assert!(v.is_float());
    assert!(e.number_value(v).is_sign_negative());
    e.release(v);

    let zero = e.make_number(0.0);
    assert!(zero.is_integer());
    assert_eq!(zero, Value::ZERO);
}

#[test]
fn update_float_collapses_to_direct_when_possible() {
    let mut e = engine();
    let baseline = e.allocated_bytes();

    let v = e.make_number(2.5);
    assert!(v.is_float());
    let v = e.update_float(v, 3.0);
    assert!(v.is_integer());
    assert_eq!(v.as_integer(), 3);
    assert_eq!(e.allocated_bytes(), baseline);
}

#[test]
fn scientific_literal_parses_and_prints_in_integer_form() {
    // S2: "3.14e2" is numerically 314; its printed form is the plain
    // integer because 314 survives a uint32 round trip.
    let x = parse_number(b"3.14e2");
    assert_eq!(x, 314.0);
    assert_eq!(printed(x), "314");

    let mut e = engine();
    let s = e.new_string_from_number(x);
    assert_eq!(e.string_to_std_string(s), "314");
    e.release(s);
}

#[test]
fn hex_literal_parses_to_direct_integer() {
    // S3
    let mut e = engine();
    let x = parse_number(b"0x1F");
    let v = e.make_number(x);
    assert!(v.is_integer());
    assert_eq!(v.as_integer(), 31);
}

#[test]
fn string_to_number_on_engine_strings() {
    let mut e = engine();
    let s = e.new_string("  12.5e1 ");
    assert_eq!(e.string_to_number(s), 125.0);
    e.release(s);

    let inf = e.new_string("-Infinity");
    assert_eq!(e.string_to_number(inf), f64::NEG_INFINITY);
    e.release(inf);
}

#[test]
fn known_hard_round_trips() {
    for s in [
        "5e-324",
        "1.7976931348623157e+308",
        "2.2250738585072014e-308",
        "0.1",
        "2.225073858507201e-308",
        "4.35",
    ] {
        let x = parse_number(s.as_bytes());
        let back = parse_number(printed(x).as_bytes());
        assert_eq!(back.to_bits(), x.to_bits(), "{s}");
    }
}
