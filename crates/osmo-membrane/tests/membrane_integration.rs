//! End-to-end membrane behavior
//!
//! The wet/dry scenarios: identity preservation, cyclic graph
//! construction, sealing completeness, revocation, and the observer
//! broadcast, all through the public `Membrane` API.

use std::sync::Arc;

use parking_lot::Mutex;

use osmo_graph::{
    GraphError, GraphObject, PropertyDescriptor, PropertyKey, Value, ops, same_value,
};
use osmo_membrane::{Broadcast, Membrane};

fn object_with_name(name: &str) -> Value {
    let obj = GraphObject::ordinary();
    obj.define_property("name".into(), PropertyDescriptor::data(Value::str(name)));
    Value::object(obj)
}

fn link(from: &Value, key: &str, to: &Value) {
    assert!(ops::set(from, &key.into(), to.clone()).unwrap());
}

fn get(target: &Value, key: &str) -> Value {
    ops::get(target, &key.into()).unwrap()
}

#[test]
fn wrapping_is_memoized() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    let first = membrane.wrap(&value, "wet", "dry").unwrap();
    let second = membrane.wrap(&value, "wet", "dry").unwrap();
    assert_eq!(first.object_id(), second.object_id());
}

#[test]
fn primitives_pass_through() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    for primitive in [
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Int(-3),
        Value::Float(6.5),
        Value::str("plain"),
    ] {
        let crossed = membrane.wrap(&primitive, "wet", "dry").unwrap();
        assert!(same_value(&crossed, &primitive));
        assert!(crossed.is_primitive());
    }
    assert_eq!(membrane.tracked_values(), 0);
}

#[test]
fn wrappers_differ_per_domain() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry1");
    membrane.register_domain("dry2");

    let value = object_with_name("shared");
    let in_dry1 = membrane.wrap(&value, "wet", "dry1").unwrap();
    let in_dry2 = membrane.wrap(&value, "wet", "dry2").unwrap();
    assert_ne!(in_dry1.object_id(), in_dry2.object_id());
    // Yet both resolve back to the one canonical value
    assert_eq!(
        membrane.wrap(&in_dry1, "dry1", "wet").unwrap().object_id(),
        value.object_id()
    );
    assert_eq!(
        membrane.wrap(&in_dry2, "dry2", "wet").unwrap().object_id(),
        value.object_id()
    );
}

#[test]
fn wrapping_back_into_the_origin_unwraps() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();
    let unwrapped = membrane.wrap(&wrapper, "dry", "wet").unwrap();
    assert_eq!(unwrapped.object_id(), value.object_id());
}

#[test]
fn two_object_cycle_resolves_to_consistent_identities() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let a = object_with_name("a");
    let b = object_with_name("b");
    link(&a, "next", &b);
    link(&b, "next", &a);

    let wrapped_a = membrane.wrap(&a, "wet", "dry").unwrap();
    let wrapped_b = membrane.wrap(&b, "wet", "dry").unwrap();

    assert_eq!(
        get(&wrapped_a, "next").object_id(),
        wrapped_b.object_id()
    );
    assert_eq!(
        get(&get(&wrapped_a, "next"), "next").object_id(),
        wrapped_a.object_id()
    );
    assert_eq!(
        get(&get(&wrapped_b, "next"), "next").object_id(),
        wrapped_b.object_id()
    );
}

#[test]
fn sealed_cycle_finalizes_completely_in_one_pass() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let a = object_with_name("a");
    let b = object_with_name("b");
    link(&a, "child", &b);
    link(&b, "parent", &a);
    a.as_object().unwrap().seal();
    b.as_object().unwrap().seal();

    let wrapped_a = membrane.wrap(&a, "wet", "dry").unwrap();
    let wrapped_b = membrane.wrap(&b, "wet", "dry").unwrap();

    // Cyclic identity through two hops
    assert_eq!(
        get(&get(&wrapped_a, "child"), "parent").object_id(),
        wrapped_a.object_id()
    );
    assert_eq!(
        get(&get(&wrapped_b, "parent"), "child").object_id(),
        wrapped_b.object_id()
    );

    // Sealing completeness: both wrappers are non-extensible once the
    // outer wrap returns
    assert!(!ops::is_extensible(&wrapped_a).unwrap());
    assert!(!ops::is_extensible(&wrapped_b).unwrap());

    // And not a single residual accessor descriptor is left behind by
    // construction: every property finalized to the data property the
    // origin holds
    let mut accessor_count = 0;
    for wrapper in [&wrapped_a, &wrapped_b] {
        for key in ops::own_keys(wrapper).unwrap() {
            let desc = ops::get_own_property(wrapper, &key).unwrap().unwrap();
            if desc.is_accessor() {
                accessor_count += 1;
            }
        }
    }
    assert_eq!(accessor_count, 0);
}

#[test]
fn deep_chain_does_not_recurse() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    // A list long enough to blow the stack under naive eager recursion
    let head = object_with_name("node-0");
    let mut tail = head.clone();
    for i in 1..20_000 {
        let node = object_with_name(&format!("node-{i}"));
        link(&tail, "next", &node);
        tail = node;
    }
    // Close the loop for good measure
    link(&tail, "next", &head);

    let wrapped_head = membrane.wrap(&head, "wet", "dry").unwrap();
    let mut cursor = wrapped_head.clone();
    for _ in 0..20_000 {
        cursor = get(&cursor, "next");
    }
    assert_eq!(cursor.object_id(), wrapped_head.object_id());
}

#[test]
fn mutation_through_a_wrapper_reaches_the_origin() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();

    assert!(ops::set(&wrapper, &"count".into(), Value::Int(5)).unwrap());
    assert!(same_value(&get(&value, "count"), &Value::Int(5)));

    assert!(ops::delete(&wrapper, &"count".into()).unwrap());
    assert!(!ops::has(&value, &"count".into()).unwrap());
}

#[test]
fn referenceable_written_through_a_wrapper_is_unwrapped_origin_side() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let a = object_with_name("a");
    let b = object_with_name("b");
    let wrapped_a = membrane.wrap(&a, "wet", "dry").unwrap();
    let wrapped_b = membrane.wrap(&b, "wet", "dry").unwrap();

    // Assign the dry wrapper of b onto the dry wrapper of a: the wet side
    // must see the real b, not a wrapper of a wrapper
    assert!(ops::set(&wrapped_a, &"peer".into(), wrapped_b.clone()).unwrap());
    assert_eq!(get(&a, "peer").object_id(), b.object_id());
    // And reading it back through the membrane returns the memoized wrapper
    assert_eq!(get(&wrapped_a, "peer").object_id(), wrapped_b.object_id());
}

#[test]
fn prototypes_cross_the_membrane() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let proto = object_with_name("proto");
    let value = object_with_name("a");
    assert!(ops::set_prototype_of(&value, proto.clone()).unwrap());

    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();
    let crossed_proto = ops::prototype_of(&wrapper).unwrap();
    assert_eq!(
        crossed_proto.object_id(),
        membrane.wrap(&proto, "wet", "dry").unwrap().object_id()
    );
    // Inherited reads flow through the crossed prototype
    assert!(same_value(&get(&wrapper, "name"), &Value::str("a")));
}

#[test]
fn revocation_disables_every_trap() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();
    membrane.revoke(&value).unwrap();

    let err = ops::get(&wrapper, &"name".into()).unwrap_err();
    assert!(matches!(err, GraphError::Revoked(_)));
    let err = ops::own_keys(&wrapper).unwrap_err();
    assert!(matches!(err, GraphError::Revoked(_)));
    let err = ops::set(&wrapper, &"name".into(), Value::Int(0)).unwrap_err();
    assert!(matches!(err, GraphError::Revoked(_)));

    // The record is gone; wrapping again builds a fresh wrapper
    assert_eq!(membrane.tracked_values(), 0);
    let fresh = membrane.wrap(&value, "wet", "dry").unwrap();
    assert_ne!(fresh.object_id(), wrapper.object_id());
    assert!(same_value(&get(&fresh, "name"), &Value::str("a")));
}

#[test]
fn unify_merges_independent_records() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    // Two values created independently in different domains, later
    // discovered to describe the same entity
    let wet_face = object_with_name("entity");
    let dry_face = object_with_name("entity");
    membrane.unify("wet", &wet_face, "dry", &dry_face).unwrap();

    // Crossing the wet face into dry now yields the dry face itself
    let crossed = membrane.wrap(&wet_face, "wet", "dry").unwrap();
    assert_eq!(crossed.object_id(), dry_face.object_id());
    assert_eq!(membrane.tracked_values(), 1);
}

#[test]
fn unify_refuses_conflicting_records() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    // The wrap gives value a dry entry already
    membrane.wrap(&value, "wet", "dry").unwrap();

    let impostor = object_with_name("impostor");
    let err = membrane.unify("wet", &value, "dry", &impostor).unwrap_err();
    assert!(matches!(err, GraphError::IdentityConflict(_)));
}

#[test]
fn listeners_observe_each_new_wrapper_fully_built() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let seen: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        membrane.add_listener(Arc::new(move |event| {
            // The wrapper a listener sees is already constructed; reading
            // through it works
            let name = ops::get(&event.wrapper, &"name".into()).unwrap();
            let Value::Str(name) = name else {
                panic!("expected a name");
            };
            seen.lock()
                .push((name.to_string(), event.is_origin_domain));
            Broadcast::Continue
        }));
    }

    let a = object_with_name("a");
    let b = object_with_name("b");
    link(&a, "child", &b);

    membrane.wrap(&a, "wet", "dry").unwrap();
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|(_, is_origin)| !is_origin));
    assert!(seen.iter().any(|(name, _)| name == "a"));
    assert!(seen.iter().any(|(name, _)| name == "b"));
}

#[test]
fn listener_failure_aborts_the_crossing() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");
    membrane.add_listener(Arc::new(|_| {
        Broadcast::Fail(GraphError::type_error("listener vetoed the wrapper"))
    }));

    let value = object_with_name("a");
    // The listener's own error reaches the caller, not a construction
    // wrapper around it
    let err = membrane.wrap(&value, "wet", "dry").unwrap_err();
    assert!(matches!(err, GraphError::TypeError(_)));
}

#[test]
fn origin_side_prevent_extensions_reaches_sealed_wrappers() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();
    assert!(ops::is_extensible(&wrapper).unwrap());

    // Harden the origin directly, long after the wrapper sealed
    assert!(ops::prevent_extensions(&value).unwrap());
    assert!(!ops::is_extensible(&wrapper).unwrap());
    assert!(!ops::set(&wrapper, &"late".into(), Value::Int(1)).unwrap());
}

#[test]
fn origin_side_delete_reaches_sealed_wrappers() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let value = object_with_name("a");
    link(&value, "extra", &object_with_name("b"));
    assert!(ops::prevent_extensions(&value).unwrap());

    let wrapper = membrane.wrap(&value, "wet", "dry").unwrap();
    assert!(!ops::is_extensible(&wrapper).unwrap());

    // "extra" is configurable, so the origin may still drop it
    assert!(ops::delete(&value, &"extra".into()).unwrap());
    assert_eq!(
        ops::own_keys(&wrapper).unwrap(),
        vec![PropertyKey::from("name")]
    );
    assert!(!ops::has(&wrapper, &"extra".into()).unwrap());
    assert!(
        ops::get_own_property(&wrapper, &"extra".into())
            .unwrap()
            .is_none()
    );
}

#[test]
fn callable_wrappers_mirror_the_callable_kind() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let function = Value::object(GraphObject::callable(Arc::new(|_this, _args| {
        Ok(Value::Int(1))
    })));
    let holder = object_with_name("holder");
    link(&holder, "fn", &function);

    let wrapper = membrane.wrap(&holder, "wet", "dry").unwrap();
    let crossed_fn = get(&wrapper, "fn");
    // The representation is a wrapper, not the real function
    assert!(crossed_fn.as_proxy().is_some());
    assert_ne!(crossed_fn.object_id(), function.object_id());
}

#[test]
fn array_wrappers_mirror_the_array_kind_and_order() {
    let membrane = Membrane::new();
    membrane.register_domain("wet");
    membrane.register_domain("dry");

    let list = GraphObject::array();
    for i in 0..3u32 {
        list.define_property(
            PropertyKey::index(i),
            PropertyDescriptor::data(Value::Int(i as i64 * 10)),
        );
    }
    let list = Value::object(list);

    let wrapper = membrane.wrap(&list, "wet", "dry").unwrap();
    let keys = ops::own_keys(&wrapper).unwrap();
    assert_eq!(
        keys,
        vec![
            PropertyKey::index(0),
            PropertyKey::index(1),
            PropertyKey::index(2)
        ]
    );
    assert!(same_value(
        &ops::get(&wrapper, &PropertyKey::index(2)).unwrap(),
        &Value::Int(20)
    ));
}
