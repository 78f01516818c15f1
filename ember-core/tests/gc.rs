//! Collector behavior: liveness, cycle reclamation, native free
//! callbacks, and recovery of a full heap (S5/S6).

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{engine, engine_with_heap};
use ember_core::prelude::*;

#[test]
fn unreachable_objects_are_swept() {
    let mut e = engine();
    let baseline = e.allocated_bytes();

    let obj = e.new_object(Value::NULL);
    let name = e.new_string("payload");
    let value = e.new_string("string only the object keeps alive");
    e.set_property(obj, name, value);
    e.release(value);
    e.release(name);

    e.release(obj);
    assert!(e.allocated_bytes() > baseline);
    e.gc(GcPressure::High);
    assert_eq!(e.allocated_bytes(), baseline);
}

#[test]
fn reachable_objects_survive_collection() {
    let mut e = engine();
    let root = e.new_object(Value::NULL);
    let child = e.new_object(Value::NULL);
    let grandchild = e.new_object(Value::NULL);

    let name = e.new_string("edge");
    e.set_property(root, name, child);
    e.set_property(child, name, grandchild);

    // Only the root keeps its handle.
    e.release(child);
    e.release(grandchild);

    e.gc(GcPressure::High);

    let c = e.get_own_property(root, name).unwrap();
    let g = e.get_own_property(c, name).unwrap();
    assert!(g.is_object());

    e.release(g);
    e.release(c);
    e.release(name);
    e.release(root);
}

#[test]
fn reference_cycles_are_collected() {
    let mut e = engine();
    let baseline = e.allocated_bytes();

    let a = e.new_object(Value::NULL);
    let b = e.new_object(Value::NULL);
    let name = e.new_string("peer");
    e.set_property(a, name, b);
    e.set_property(b, name, a);
    e.release(name);

    e.release(a);
    e.release(b);
    e.gc(GcPressure::Low);
    assert_eq!(e.allocated_bytes(), baseline);
}

#[test]
fn prototype_chains_keep_prototypes_alive() {
    let mut e = engine();
    let proto = e.new_object(Value::NULL);
    let obj = e.new_object(proto);
    e.release(proto);

    e.gc(GcPressure::High);

    let p = e.object_prototype(obj);
    assert!(p.is_object());

    // Dropping the object makes the whole chain garbage.
    let baseline_after = {
        e.release(obj);
        e.gc(GcPressure::High);
        e.allocated_bytes()
    };
    assert_eq!(baseline_after, 0);
}

#[test]
fn lexical_environments_trace_outer_and_bindings() {
    let mut e = engine();
    let global = e.new_object(Value::NULL);
    let outer = e.new_object_bound_env(Value::NULL, global);
    let inner = e.new_declarative_env(outer);
    e.release(global);
    e.release(outer);

    let name = e.new_string("binding");
    let bound = e.new_object(Value::NULL);
    e.set_property(inner, name, bound);
    e.release(bound);

    e.gc(GcPressure::High);

    // Everything is still reachable through the inner environment.
    assert!(e.is_lexical_env(inner));
    let outer_again = e.outer_lexical_env(inner);
    assert!(outer_again.is_object());
    let binding = e.get_own_property(inner, name).unwrap();
    assert!(binding.is_object());

    e.release(binding);
    e.release(name);
    e.release(inner);
}

#[test]
fn native_free_callback_fires_exactly_once() {
    // S6
    static FREED: AtomicUsize = AtomicUsize::new(0);
    static LAST_DATA: AtomicUsize = AtomicUsize::new(0);
    static INFO: NativeInfo = NativeInfo {
        free_cb: Some(|data| {
            FREED.fetch_add(1, Ordering::SeqCst);
            LAST_DATA.store(data, Ordering::SeqCst);
        }),
    };

    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    e.set_native_data(obj, &INFO, 0x5eed);
    assert_eq!(e.native_data(obj, &INFO), Some(0x5eed));

    e.gc(GcPressure::High);
    assert_eq!(FREED.load(Ordering::SeqCst), 0, "live object must keep its data");

    e.release(obj);
    e.gc(GcPressure::High);
    assert_eq!(FREED.load(Ordering::SeqCst), 1);
    assert_eq!(LAST_DATA.load(Ordering::SeqCst), 0x5eed);

    e.gc(GcPressure::High);
    assert_eq!(FREED.load(Ordering::SeqCst), 1, "callback must not fire twice");
}

#[test]
fn native_info_identity_distinguishes_attachments() {
    static INFO_A: NativeInfo = NativeInfo { free_cb: None };
    static INFO_B: NativeInfo = NativeInfo { free_cb: None };

    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    e.set_native_data(obj, &INFO_A, 1);
    e.set_native_data(obj, &INFO_B, 2);
    e.set_native_data(obj, &INFO_A, 3);

    assert_eq!(e.native_data(obj, &INFO_A), Some(3));
    assert_eq!(e.native_data(obj, &INFO_B), Some(2));
    e.release(obj);
}

#[test]
fn tracked_native_values_are_roots_while_the_owner_lives() {
    static INFO: NativeInfo = NativeInfo { free_cb: None };

    let mut e = engine();
    let owner = e.new_object(Value::NULL);
    let kept = e.new_object(Value::NULL);

    e.set_native_data(owner, &INFO, 0);
    e.native_tracked_values_mut(owner, &INFO)
        .unwrap()
        .push(kept);
    e.release(kept);

    e.gc(GcPressure::High);

    let tracked = e.native_tracked_values_mut(owner, &INFO).unwrap()[0];
    assert!(tracked.is_object());
    // The tracked object survived: attaching a property works.
    let name = e.new_string("alive");
    e.set_property(tracked, name, Value::TRUE);
    assert_eq!(e.get_own_property(tracked, name), Some(Value::TRUE));

    e.release(name);
    e.release(owner);
}

#[test]
fn full_heap_recovers_after_releasing_garbage() {
    // S5 in API terms: fill most of a small heap, release the bulk,
    // and let the allocation-retry path collect on demand.
    let mut e = engine_with_heap(8 * 1024);

    let mut hoard = Vec::new();
    let mut i = 0;
    while e.allocated_bytes() < 6 * 1024 {
        let obj = e.new_object(Value::NULL);
        let name = e.new_string(&format!("blob{i}"));
        let data = e.new_string(&"x".repeat(100));
        e.set_property(obj, name, data);
        e.release(data);
        e.release(name);
        hoard.push(obj);
        i += 1;
    }

    // Drop every handle; the objects are garbage but not yet swept.
    for obj in hoard.drain(..) {
        e.release(obj);
    }

    // These allocations exceed what is left; the retry protocol must
    // reclaim the hoard instead of dying.
    let mut kept = Vec::new();
    for i in 0..40 {
        let s = e.new_string(&format!("{i}:{}", "y".repeat(120)));
        kept.push(s);
    }
    for s in kept.drain(..) {
        assert!(s.is_string());
        e.release(s);
    }

    e.gc(GcPressure::High);
    assert_eq!(e.allocated_bytes(), 0);
}

#[test]
fn high_pressure_drops_hashmaps_low_keeps_lookups_working() {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);

    let names: Vec<Value> = (0..32)
        .map(|i| e.new_string(&format!("slot{i}")))
        .collect();
    for (i, &name) in names.iter().enumerate() {
        e.set_property(obj, name, Value::integer(i as i32));
    }

    let with_map = e.allocated_bytes();
    e.gc(GcPressure::Low);
    assert_eq!(e.allocated_bytes(), with_map, "low pressure keeps the accelerator");

    e.gc(GcPressure::High);
    assert!(e.allocated_bytes() < with_map, "high pressure frees the accelerator");

    // Lookups still work through the plain chain.
    for (i, &name) in names.iter().enumerate() {
        assert_eq!(e.get_own_property(obj, name), Some(Value::integer(i as i32)));
    }

    for name in names {
        e.release(name);
    }
    e.release(obj);
}

#[test]
fn context_data_slots_are_roots() {
    let mut e = engine();
    let registry = e.new_object(Value::NULL);
    e.set_context_data(0, registry).unwrap();
    e.release(registry);

    e.gc(GcPressure::High);

    let stored = e.context_data(0).unwrap();
    assert!(stored.is_object());
    let name = e.new_string("module");
    e.set_property(stored, name, Value::integer(1));
    assert_eq!(e.get_own_property(stored, name), Some(Value::integer(1)));

    e.release(name);
    e.set_context_data(0, Value::UNDEFINED).unwrap();
    e.gc(GcPressure::High);
}

#[test]
fn exception_carriers_own_their_payload() {
    let mut e = engine();
    let baseline = e.allocated_bytes();

    let carrier = e.throw_error(ErrorKind::Type, "not a function");
    assert!(carrier.is_error_reference());
    assert!(!e.is_abort(carrier));

    let error = e.exception_value(carrier);
    let text = e.error_to_string(error);
    assert_eq!(e.string_to_std_string(text), "TypeError: not a function");

    e.release(text);
    e.release(error);
    e.release(carrier);
    e.gc(GcPressure::High);
    assert_eq!(e.allocated_bytes(), baseline);
}

#[test]
fn abort_carriers_flag_the_unwinder() {
    let mut e = engine();
    let payload = e.new_string("stop everything");
    let abort = e.create_abort(payload);
    assert!(e.is_abort(abort));

    let back = e.exception_value(abort);
    assert!(e.string_eq(back, payload));
    // `payload`'s original reference now belongs to the carrier.
    e.release(back);
    e.release(abort);
}
