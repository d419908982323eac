//! Revocable wrappers and the trap-handler interface
//!
//! A [`GraphProxy`] is the representation of a value in a domain that does
//! not own it. It is backed by a shadow target (a structural stand-in of
//! the same exotic kind as the real value) and a [`TrapHandler`] that
//! services every structural operation. The shadow is never handed out by
//! [`crate::ops`]; callers only ever see the proxy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::GraphResult;
use crate::object::{GraphObject, PropertyDescriptor, PropertyKey};
use crate::value::{GcRef, Value};

/// One method per structural trap
///
/// Handlers are composed by decoration: an invariant-checking handler wraps
/// a forwarding handler, each delegating to the next and receiving the
/// proxy's shadow target as its first argument.
pub trait TrapHandler: Send + Sync {
    /// Read a property (walking the represented value's prototype chain)
    fn get(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<Value>;

    /// Write a property; `false` means the write was rejected
    fn set(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey, value: Value)
    -> GraphResult<bool>;

    /// Delete a property; `false` means the deletion was rejected
    fn delete_property(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey)
    -> GraphResult<bool>;

    /// Define or redefine a property; `false` means the definition was
    /// rejected
    fn define_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> GraphResult<bool>;

    /// Read an own property descriptor
    fn get_own_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
    ) -> GraphResult<Option<PropertyDescriptor>>;

    /// Check for a property (own or inherited)
    fn has(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<bool>;

    /// Enumerate own property keys
    fn own_keys(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Vec<PropertyKey>>;

    /// Read the prototype
    fn get_prototype_of(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Value>;

    /// Replace the prototype; `false` means the change was rejected
    fn set_prototype_of(&self, shadow: &GcRef<GraphObject>, proto: Value) -> GraphResult<bool>;

    /// Query extensibility
    fn is_extensible(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool>;

    /// Make non-extensible; `false` means the change was rejected
    fn prevent_extensions(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool>;
}

/// A revocable wrapper over a shadow target
pub struct GraphProxy {
    shadow: GcRef<GraphObject>,
    handler: Arc<dyn TrapHandler>,
    revoked: AtomicBool,
}

impl GraphProxy {
    /// Create a new proxy
    pub fn new(shadow: GcRef<GraphObject>, handler: Arc<dyn TrapHandler>) -> Arc<Self> {
        Arc::new(Self {
            shadow,
            handler,
            revoked: AtomicBool::new(false),
        })
    }

    /// Create a revocable proxy
    pub fn revocable(shadow: GcRef<GraphObject>, handler: Arc<dyn TrapHandler>) -> RevocableProxy {
        let proxy = Self::new(shadow, handler);
        let proxy_for_revoke = proxy.clone();

        RevocableProxy {
            proxy,
            revoke: Arc::new(move || {
                proxy_for_revoke.revoke();
            }),
        }
    }

    /// The shadow target backing this proxy
    ///
    /// For handler and invariant-checker use; domain code only ever sees
    /// the proxy itself.
    pub fn shadow(&self) -> &GcRef<GraphObject> {
        &self.shadow
    }

    /// The handler chain
    pub fn handler(&self) -> &Arc<dyn TrapHandler> {
        &self.handler
    }

    /// Check if this proxy has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    /// Revoke this proxy
    ///
    /// After revocation, every trap fails with
    /// [`GraphError::Revoked`](crate::error::GraphError::Revoked).
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for GraphProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_revoked() {
            write!(f, "GraphProxy {{ <revoked> }}")
        } else {
            write!(f, "GraphProxy {{ shadow: {:?} }}", self.shadow)
        }
    }
}

/// Result of creating a revocable proxy
pub struct RevocableProxy {
    /// The proxy
    pub proxy: Arc<GraphProxy>,
    /// Revocation capability (internally calls `proxy.revoke()`)
    pub revoke: Arc<dyn Fn() + Send + Sync>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    /// Handler that fails every trap; enough to exercise proxy plumbing
    struct NullHandler;

    impl TrapHandler for NullHandler {
        fn get(&self, _: &GcRef<GraphObject>, _: &PropertyKey) -> GraphResult<Value> {
            Err(GraphError::type_error("null handler"))
        }
        fn set(&self, _: &GcRef<GraphObject>, _: &PropertyKey, _: Value) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn delete_property(&self, _: &GcRef<GraphObject>, _: &PropertyKey) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn define_property(
            &self,
            _: &GcRef<GraphObject>,
            _: &PropertyKey,
            _: PropertyDescriptor,
        ) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn get_own_property(
            &self,
            _: &GcRef<GraphObject>,
            _: &PropertyKey,
        ) -> GraphResult<Option<PropertyDescriptor>> {
            Err(GraphError::type_error("null handler"))
        }
        fn has(&self, _: &GcRef<GraphObject>, _: &PropertyKey) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn own_keys(&self, _: &GcRef<GraphObject>) -> GraphResult<Vec<PropertyKey>> {
            Err(GraphError::type_error("null handler"))
        }
        fn get_prototype_of(&self, _: &GcRef<GraphObject>) -> GraphResult<Value> {
            Err(GraphError::type_error("null handler"))
        }
        fn set_prototype_of(&self, _: &GcRef<GraphObject>, _: Value) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn is_extensible(&self, _: &GcRef<GraphObject>) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
        fn prevent_extensions(&self, _: &GcRef<GraphObject>) -> GraphResult<bool> {
            Err(GraphError::type_error("null handler"))
        }
    }

    #[test]
    fn test_proxy_revoke() {
        let proxy = GraphProxy::new(GraphObject::ordinary(), Arc::new(NullHandler));
        assert!(!proxy.is_revoked());
        proxy.revoke();
        assert!(proxy.is_revoked());
    }

    #[test]
    fn test_revocable_proxy() {
        let RevocableProxy { proxy, revoke } =
            GraphProxy::revocable(GraphObject::ordinary(), Arc::new(NullHandler));
        assert!(!proxy.is_revoked());
        revoke();
        assert!(proxy.is_revoked());
    }
}
