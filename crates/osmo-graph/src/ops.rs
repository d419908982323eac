//! Value-level structural operations
//!
//! Every operation dispatches on the receiver: plain objects are operated
//! on directly (honoring accessors and the prototype chain), proxies route
//! through their handler chain after a revocation check. Primitives reject
//! every structural operation with a `TypeError`.

use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::object::{GraphObject, PropertyDescriptor, PropertyKey};
use crate::proxy::GraphProxy;
use crate::value::{GcRef, Value};

enum Receiver<'a> {
    Object(&'a GcRef<GraphObject>),
    Proxy(&'a Arc<GraphProxy>),
}

fn classify<'a>(target: &'a Value, op: &str) -> GraphResult<Receiver<'a>> {
    match target {
        Value::Object(obj) => Ok(Receiver::Object(obj)),
        Value::Proxy(proxy) => {
            if proxy.is_revoked() {
                Err(GraphError::Revoked(op.to_string()))
            } else {
                Ok(Receiver::Proxy(proxy))
            }
        }
        _ => Err(GraphError::type_error(format!(
            "cannot perform '{op}' on a primitive value"
        ))),
    }
}

/// Invoke a callable value
///
/// Only plain callables can be invoked; a wrapped callable has no apply
/// trap (calls happen in the domain that owns the function).
pub fn call(callee: &Value, this: Value, args: &[Value]) -> GraphResult<Value> {
    let obj = callee
        .as_object()
        .ok_or_else(|| GraphError::type_error("value is not callable"))?;
    let native = obj
        .native_call()
        .ok_or_else(|| GraphError::type_error("object is not callable"))?;
    native(this, args)
}

/// Read a property, walking the prototype chain
pub fn get(target: &Value, key: &PropertyKey) -> GraphResult<Value> {
    match classify(target, "get")? {
        Receiver::Proxy(proxy) => proxy.handler().get(proxy.shadow(), key),
        Receiver::Object(obj) => get_from_object(obj, key, target),
    }
}

fn get_from_object(
    obj: &GcRef<GraphObject>,
    key: &PropertyKey,
    receiver: &Value,
) -> GraphResult<Value> {
    match obj.get_own_property(key) {
        Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
        Some(PropertyDescriptor::Accessor { get, .. }) => match get {
            Some(getter) => call(&getter, receiver.clone(), &[]),
            None => Ok(Value::Undefined),
        },
        None => match obj.prototype() {
            Value::Object(parent) => get_from_object(&parent, key, receiver),
            proto @ Value::Proxy(_) => get(&proto, key),
            _ => Ok(Value::Undefined),
        },
    }
}

/// Write a property
///
/// Returns `Ok(false)` when the write is rejected (non-writable data
/// property, accessor without a setter, or non-extensible receiver).
pub fn set(target: &Value, key: &PropertyKey, value: Value) -> GraphResult<bool> {
    match classify(target, "set")? {
        Receiver::Proxy(proxy) => proxy.handler().set(proxy.shadow(), key, value),
        Receiver::Object(obj) => set_on_object(obj, key, value, target),
    }
}

fn set_on_object(
    obj: &GcRef<GraphObject>,
    key: &PropertyKey,
    value: Value,
    receiver: &Value,
) -> GraphResult<bool> {
    match obj.get_own_property(key) {
        Some(PropertyDescriptor::Data { attributes, .. }) => {
            if !attributes.writable {
                return Ok(false);
            }
            Ok(obj.define_property(
                key.clone(),
                PropertyDescriptor::data_with_attrs(value, attributes),
            ))
        }
        Some(PropertyDescriptor::Accessor { set, .. }) => match set {
            Some(setter) => {
                call(&setter, receiver.clone(), &[value])?;
                Ok(true)
            }
            None => Ok(false),
        },
        None => {
            // Inherited accessors and non-writable data properties gate
            // the write before a new own property is created
            if let Some(inherited) = lookup_inherited(obj, key)? {
                match inherited {
                    PropertyDescriptor::Accessor { set, .. } => {
                        return match set {
                            Some(setter) => {
                                call(&setter, receiver.clone(), &[value])?;
                                Ok(true)
                            }
                            None => Ok(false),
                        };
                    }
                    PropertyDescriptor::Data { attributes, .. } if !attributes.writable => {
                        return Ok(false);
                    }
                    PropertyDescriptor::Data { .. } => {}
                }
            }
            if !obj.is_extensible() {
                return Ok(false);
            }
            Ok(obj.define_property(key.clone(), PropertyDescriptor::data(value)))
        }
    }
}

fn lookup_inherited(
    obj: &GcRef<GraphObject>,
    key: &PropertyKey,
) -> GraphResult<Option<PropertyDescriptor>> {
    let mut proto = obj.prototype();
    loop {
        match proto {
            Value::Object(parent) => {
                if let Some(desc) = parent.get_own_property(key) {
                    return Ok(Some(desc));
                }
                proto = parent.prototype();
            }
            ref p @ Value::Proxy(_) => return get_own_property(p, key),
            _ => return Ok(None),
        }
    }
}

/// Delete a property
pub fn delete(target: &Value, key: &PropertyKey) -> GraphResult<bool> {
    match classify(target, "deleteProperty")? {
        Receiver::Proxy(proxy) => proxy.handler().delete_property(proxy.shadow(), key),
        Receiver::Object(obj) => Ok(obj.delete(key)),
    }
}

/// Define or redefine a property
pub fn define_property(
    target: &Value,
    key: &PropertyKey,
    desc: PropertyDescriptor,
) -> GraphResult<bool> {
    match classify(target, "defineProperty")? {
        Receiver::Proxy(proxy) => proxy.handler().define_property(proxy.shadow(), key, desc),
        Receiver::Object(obj) => Ok(obj.define_property(key.clone(), desc)),
    }
}

/// Read an own property descriptor
pub fn get_own_property(
    target: &Value,
    key: &PropertyKey,
) -> GraphResult<Option<PropertyDescriptor>> {
    match classify(target, "getOwnPropertyDescriptor")? {
        Receiver::Proxy(proxy) => proxy.handler().get_own_property(proxy.shadow(), key),
        Receiver::Object(obj) => Ok(obj.get_own_property(key)),
    }
}

/// Check for a property, own or inherited
pub fn has(target: &Value, key: &PropertyKey) -> GraphResult<bool> {
    match classify(target, "has")? {
        Receiver::Proxy(proxy) => proxy.handler().has(proxy.shadow(), key),
        Receiver::Object(obj) => {
            if obj.has_own(key) {
                return Ok(true);
            }
            let proto = obj.prototype();
            if proto.is_referenceable() {
                has(&proto, key)
            } else {
                Ok(false)
            }
        }
    }
}

/// Enumerate own property keys
pub fn own_keys(target: &Value) -> GraphResult<Vec<PropertyKey>> {
    match classify(target, "ownKeys")? {
        Receiver::Proxy(proxy) => proxy.handler().own_keys(proxy.shadow()),
        Receiver::Object(obj) => Ok(obj.own_keys()),
    }
}

/// Read the prototype
pub fn prototype_of(target: &Value) -> GraphResult<Value> {
    match classify(target, "getPrototypeOf")? {
        Receiver::Proxy(proxy) => proxy.handler().get_prototype_of(proxy.shadow()),
        Receiver::Object(obj) => Ok(obj.prototype()),
    }
}

/// Replace the prototype
pub fn set_prototype_of(target: &Value, proto: Value) -> GraphResult<bool> {
    match classify(target, "setPrototypeOf")? {
        Receiver::Proxy(proxy) => proxy.handler().set_prototype_of(proxy.shadow(), proto),
        Receiver::Object(obj) => Ok(obj.set_prototype(proto)),
    }
}

/// Query extensibility
pub fn is_extensible(target: &Value) -> GraphResult<bool> {
    match classify(target, "isExtensible")? {
        Receiver::Proxy(proxy) => proxy.handler().is_extensible(proxy.shadow()),
        Receiver::Object(obj) => Ok(obj.is_extensible()),
    }
}

/// Make non-extensible
pub fn prevent_extensions(target: &Value) -> GraphResult<bool> {
    match classify(target, "preventExtensions")? {
        Receiver::Proxy(proxy) => proxy.handler().prevent_extensions(proxy.shadow()),
        Receiver::Object(obj) => {
            obj.prevent_extensions();
            Ok(true)
        }
    }
}
