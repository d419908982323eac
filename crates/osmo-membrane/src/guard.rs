//! Structural invariant enforcement
//!
//! [`InvariantGuard`] decorates any [`TrapHandler`] and checks each trap's
//! result against the shadow target's actual descriptor and extensibility
//! state before it is returned. The shadow carries the structural promises
//! a wrapper has made to its domain (non-configurable descriptors, fixed
//! extensibility); a handler whose answers contradict those promises has
//! broken isolation, so every violation is a hard error — never coerced,
//! never swallowed.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use osmo_graph::{
    GcRef, GraphError, GraphObject, GraphResult, PropertyDescriptor, PropertyKey, TrapHandler,
    Value, same_value,
};

/// Invariant-checking decorator over a trap handler
pub struct InvariantGuard {
    next: Arc<dyn TrapHandler>,
}

impl InvariantGuard {
    /// Wrap `next`, validating every result it produces
    pub fn new(next: Arc<dyn TrapHandler>) -> Self {
        Self { next }
    }
}

fn violation(trap: &str, detail: &str) -> GraphError {
    GraphError::invariant(format!("'{trap}' trap {detail}"))
}

impl TrapHandler for InvariantGuard {
    fn get(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<Value> {
        let result = self.next.get(shadow, key)?;
        match shadow.get_own_property(key) {
            Some(PropertyDescriptor::Data { value, attributes })
                if !attributes.configurable && !attributes.writable =>
            {
                if !same_value(&result, &value) {
                    return Err(violation(
                        "get",
                        "reported a different value for a non-configurable, non-writable property",
                    ));
                }
            }
            Some(PropertyDescriptor::Accessor {
                get: None,
                attributes,
                ..
            }) if !attributes.configurable => {
                if !result.is_undefined() {
                    return Err(violation(
                        "get",
                        "must report undefined for a non-configurable accessor without a getter",
                    ));
                }
            }
            _ => {}
        }
        Ok(result)
    }

    fn set(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
        value: Value,
    ) -> GraphResult<bool> {
        let accepted = self.next.set(shadow, key, value.clone())?;
        if accepted {
            match shadow.get_own_property(key) {
                Some(PropertyDescriptor::Data {
                    value: shadow_value,
                    attributes,
                }) if !attributes.configurable && !attributes.writable => {
                    if !same_value(&value, &shadow_value) {
                        return Err(violation(
                            "set",
                            "claimed to change a non-configurable, non-writable property",
                        ));
                    }
                }
                Some(PropertyDescriptor::Accessor {
                    set: None,
                    attributes,
                    ..
                }) if !attributes.configurable => {
                    return Err(violation(
                        "set",
                        "claimed success on a non-configurable accessor without a setter",
                    ));
                }
                _ => {}
            }
        }
        Ok(accepted)
    }

    fn delete_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
    ) -> GraphResult<bool> {
        let deleted = self.next.delete_property(shadow, key)?;
        if deleted
            && let Some(desc) = shadow.get_own_property(key)
            && !desc.is_configurable()
        {
            return Err(violation(
                "deleteProperty",
                "claimed to delete a non-configurable property",
            ));
        }
        Ok(deleted)
    }

    fn define_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> GraphResult<bool> {
        let accepted = self.next.define_property(shadow, key, desc)?;
        if accepted && !shadow.is_extensible() && !shadow.has_own(key) {
            return Err(violation(
                "defineProperty",
                "claimed to add a property to a non-extensible target",
            ));
        }
        Ok(accepted)
    }

    fn get_own_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
    ) -> GraphResult<Option<PropertyDescriptor>> {
        let result = self.next.get_own_property(shadow, key)?;
        let shadow_desc = shadow.get_own_property(key);
        match (&result, &shadow_desc) {
            (None, Some(existing)) => {
                // Absent may only be reported for properties that could
                // legitimately disappear
                if !existing.is_configurable() {
                    return Err(violation(
                        "getOwnPropertyDescriptor",
                        "reported a non-configurable property as absent",
                    ));
                }
                if !shadow.is_extensible() {
                    return Err(violation(
                        "getOwnPropertyDescriptor",
                        "reported a property of a non-extensible target as absent",
                    ));
                }
            }
            (Some(_), None) => {
                if !shadow.is_extensible() {
                    return Err(violation(
                        "getOwnPropertyDescriptor",
                        "invented a property on a non-extensible target",
                    ));
                }
            }
            (Some(reported), Some(existing)) if !existing.is_configurable() => {
                if reported.is_configurable() {
                    return Err(violation(
                        "getOwnPropertyDescriptor",
                        "reported a non-configurable property as configurable",
                    ));
                }
                if let (
                    PropertyDescriptor::Data {
                        value: reported_value,
                        ..
                    },
                    PropertyDescriptor::Data {
                        value: shadow_value,
                        attributes,
                    },
                ) = (reported, existing)
                    && !attributes.writable
                    && !same_value(reported_value, shadow_value)
                {
                    return Err(violation(
                        "getOwnPropertyDescriptor",
                        "changed the value of a non-configurable, non-writable property",
                    ));
                }
            }
            _ => {}
        }
        Ok(result)
    }

    fn has(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<bool> {
        let found = self.next.has(shadow, key)?;
        if !found
            && let Some(desc) = shadow.get_own_property(key)
        {
            if !desc.is_configurable() {
                return Err(violation(
                    "has",
                    "reported a non-configurable property as missing",
                ));
            }
            if !shadow.is_extensible() {
                return Err(violation(
                    "has",
                    "reported a property of a non-extensible target as missing",
                ));
            }
        }
        Ok(found)
    }

    fn own_keys(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Vec<PropertyKey>> {
        let keys = self.next.own_keys(shadow)?;
        let reported: FxHashSet<&PropertyKey> = keys.iter().collect();
        let shadow_keys = shadow.own_keys();

        for key in &shadow_keys {
            if reported.contains(key) {
                continue;
            }
            let non_configurable = shadow
                .get_own_property(key)
                .is_some_and(|desc| !desc.is_configurable());
            if non_configurable {
                return Err(violation("ownKeys", "omitted a non-configurable key"));
            }
            if !shadow.is_extensible() {
                return Err(violation(
                    "ownKeys",
                    "omitted a key of a non-extensible target",
                ));
            }
        }
        if !shadow.is_extensible() {
            let own: FxHashSet<&PropertyKey> = shadow_keys.iter().collect();
            for key in &keys {
                if !own.contains(key) {
                    return Err(violation(
                        "ownKeys",
                        "invented a key on a non-extensible target",
                    ));
                }
            }
        }
        Ok(keys)
    }

    fn get_prototype_of(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Value> {
        let proto = self.next.get_prototype_of(shadow)?;
        if !shadow.is_extensible() && !same_value(&proto, &shadow.prototype()) {
            return Err(violation(
                "getPrototypeOf",
                "reported a different prototype for a non-extensible target",
            ));
        }
        Ok(proto)
    }

    fn set_prototype_of(&self, shadow: &GcRef<GraphObject>, proto: Value) -> GraphResult<bool> {
        let accepted = self.next.set_prototype_of(shadow, proto.clone())?;
        if accepted && !shadow.is_extensible() && !same_value(&proto, &shadow.prototype()) {
            return Err(violation(
                "setPrototypeOf",
                "claimed to change the prototype of a non-extensible target",
            ));
        }
        Ok(accepted)
    }

    fn is_extensible(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool> {
        let reported = self.next.is_extensible(shadow)?;
        if reported != shadow.is_extensible() {
            return Err(violation(
                "isExtensible",
                "disagreed with the target's actual extensibility",
            ));
        }
        Ok(reported)
    }

    fn prevent_extensions(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool> {
        let accepted = self.next.prevent_extensions(shadow)?;
        if accepted && shadow.is_extensible() {
            return Err(violation(
                "preventExtensions",
                "claimed success while the target is still extensible",
            ));
        }
        Ok(accepted)
    }
}

impl std::fmt::Debug for InvariantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvariantGuard").finish()
    }
}
