//! Property store behavior across the chain and its hashmap
//! accelerator: the S4 churn scenario and the chain/map agreement law.

mod common;

use std::collections::HashMap;

use common::engine;
use ember_core::prelude::*;
use quickcheck_macros::quickcheck;

#[test]
fn hundred_properties_with_interleaved_deletes() {
    // S4: define 100 unique names, delete every other one; lookups hit
    // exactly the kept names.
    let mut e = engine();
    let obj = e.new_object(Value::NULL);

    let names: Vec<Value> = (0..100)
        .map(|i| e.new_string(&format!("key_{i:03}")))
        .collect();

    for (i, &name) in names.iter().enumerate() {
        e.set_property(obj, name, Value::integer(i as i32));
    }
    for (i, &name) in names.iter().enumerate() {
        if i % 2 == 1 {
            assert!(e.delete_own_property(obj, name));
        }
    }

    for (i, &name) in names.iter().enumerate() {
        let found = e.get_own_property(obj, name);
        if i % 2 == 0 {
            assert_eq!(found, Some(Value::integer(i as i32)), "key_{i:03}");
        } else {
            assert_eq!(found, None, "key_{i:03}");
        }
    }

    for name in names {
        e.release(name);
    }
    e.release(obj);
}

#[test]
fn overwrite_keeps_a_single_property() {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    let name = e.new_string("counter");

    e.set_property(obj, name, Value::integer(1));
    e.set_property(obj, name, Value::integer(2));
    assert_eq!(e.get_own_property(obj, name), Some(Value::integer(2)));
    assert_eq!(e.own_property_names(obj).len(), 1);

    e.release(name);
    e.release(obj);
}

#[test]
fn accessor_properties_store_getter_and_setter() {
    fn getter(_e: &mut Engine, _this: Value, _args: &[Value]) -> Value {
        Value::integer(7)
    }

    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    let name = e.new_string("computed");
    let get_fn = e.new_native_function(getter, Value::NULL);

    let prop = e.create_named_accessor_property(
        obj,
        name,
        get_fn,
        Value::UNDEFINED,
        PropertyFlags::CONFIGURABLE | PropertyFlags::ENUMERABLE,
    );
    let (g, s) = e.property_accessors(prop);
    assert_eq!(g, get_fn);
    assert!(s.is_undefined());

    // Data lookup skips accessors.
    assert_eq!(e.get_own_property(obj, name), None);

    let result = e.call_native_function(g, obj, &[]);
    assert_eq!(result, Value::integer(7));

    e.release(get_fn);
    e.release(name);
    e.release(obj);
}

#[test]
fn uint_and_magic_names_coexist_with_heap_names() {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);

    let index = e.new_string("3");
    let magic = magic_string_value(MagicString::Length);
    let heap = e.new_string("neither_magic_nor_index");

    e.set_property(obj, index, Value::integer(30));
    e.set_property(obj, magic, Value::integer(6));
    e.set_property(obj, heap, Value::integer(99));

    assert_eq!(e.get_own_property(obj, index), Some(Value::integer(30)));
    assert_eq!(e.get_own_property(obj, magic), Some(Value::integer(6)));
    assert_eq!(e.get_own_property(obj, heap), Some(Value::integer(99)));

    // An equal-content heap name built separately still finds the
    // property stored under another descriptor.
    let heap_again = e.new_string("neither_magic_nor_index");
    assert_eq!(e.get_own_property(obj, heap_again), Some(Value::integer(99)));

    e.release(heap_again);
    e.release(heap);
    e.release(obj);
}

#[test]
fn symbols_are_valid_property_names() {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    let desc = e.new_string("tag");
    let sym_a = e.new_symbol(desc);
    let sym_b = e.new_symbol(desc);

    e.set_property(obj, sym_a, Value::integer(1));
    assert_eq!(e.get_own_property(obj, sym_a), Some(Value::integer(1)));
    assert_eq!(e.get_own_property(obj, sym_b), None);

    e.release(desc);
    e.release(sym_a);
    e.release(sym_b);
    e.release(obj);
}

#[test]
fn string_values_survive_property_storage() {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    let name = e.new_string("greeting");
    let value = e.new_string("hello from the arena");

    e.set_property(obj, name, value);
    e.release(value);

    let read = e.get_own_property(obj, name).unwrap();
    assert_eq!(e.string_to_std_string(read), "hello from the arena");
    e.release(read);

    e.release(name);
    e.release(obj);
}

/// Chain/map agreement (law 5): after an arbitrary define/delete
/// sequence, lookups agree with a model map, both below and above the
/// hashmap threshold.
#[quickcheck]
fn define_delete_sequences_agree_with_model(ops: Vec<(u8, bool)>) -> bool {
    let mut e = engine();
    let obj = e.new_object(Value::NULL);
    let mut model: HashMap<u8, i32> = HashMap::new();

    let names: Vec<Value> = (0..=u8::MAX)
        .map(|i| e.new_string(&format!("n{i}")))
        .collect();

    for (step, &(key, insert)) in ops.iter().enumerate() {
        let name = names[key as usize];
        if insert {
            e.set_property(obj, name, Value::integer(step as i32));
            model.insert(key, step as i32);
        } else {
            let deleted = e.delete_own_property(obj, name);
            let model_deleted = model.remove(&key).is_some();
            if deleted != model_deleted {
                return false;
            }
        }
    }

    let ok = (0..=u8::MAX).all(|key| {
        let found = e.get_own_property(obj, names[key as usize]);
        found == model.get(&key).map(|&v| Value::integer(v))
    });

    // The visible name set matches as well.
    let mut visible: Vec<String> = e
        .own_property_names(obj)
        .into_iter()
        .map(|n| {
            let s = e.string_to_std_string(n);
            e.release(n);
            s
        })
        .collect();
    visible.sort();
    let mut expected: Vec<String> = model.keys().map(|k| format!("n{k}")).collect();
    expected.sort();

    for name in names {
        e.release(name);
    }
    e.release(obj);

    ok && visible == expected
}
