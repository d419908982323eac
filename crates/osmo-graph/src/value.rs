//! Dynamic values flowing through an object graph
//!
//! A [`Value`] is either a primitive (copied freely across domain
//! boundaries) or a referenceable (an object or a wrapper), which carries
//! pointer identity and must be tracked by the membrane's registry.

use std::sync::Arc;

use crate::object::GraphObject;
use crate::proxy::GraphProxy;

/// Handle to a graph-managed object
///
/// Reference-counted; identity is pointer identity.
pub type GcRef<T> = Arc<T>;

/// Stable identity of a referenceable value
///
/// Derived from the allocation address of the backing `Arc`. Two values
/// have the same `ObjectId` iff they are the same allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

/// A dynamically-typed graph value
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Undefined,
    /// Explicit null
    Null,
    /// Boolean primitive
    Bool(bool),
    /// Integer primitive
    Int(i64),
    /// Floating-point primitive
    Float(f64),
    /// String primitive (immutable, compared by content)
    Str(Arc<str>),
    /// A plain graph object
    Object(GcRef<GraphObject>),
    /// A wrapper produced by a membrane crossing
    Proxy(Arc<GraphProxy>),
}

impl Value {
    /// The `undefined` value
    pub fn undefined() -> Self {
        Self::Undefined
    }

    /// The `null` value
    pub fn null() -> Self {
        Self::Null
    }

    /// Create a string value
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Create an object value
    pub fn object(obj: GcRef<GraphObject>) -> Self {
        Self::Object(obj)
    }

    /// Create a proxy value
    pub fn proxy(proxy: Arc<GraphProxy>) -> Self {
        Self::Proxy(proxy)
    }

    /// Check if this value is `undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if this value is `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Primitives pass through a membrane unchanged and are never wrapped
    pub fn is_primitive(&self) -> bool {
        !self.is_referenceable()
    }

    /// Referenceables (objects and wrappers) carry identity
    pub fn is_referenceable(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Proxy(_))
    }

    /// Get the plain object, if this value is one
    pub fn as_object(&self) -> Option<&GcRef<GraphObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the proxy, if this value is one
    pub fn as_proxy(&self) -> Option<&Arc<GraphProxy>> {
        match self {
            Self::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }

    /// Pointer identity of a referenceable; `None` for primitives
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Object(obj) => Some(ObjectId(Arc::as_ptr(obj) as usize)),
            Self::Proxy(proxy) => Some(ObjectId(Arc::as_ptr(proxy) as usize)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Object(obj) => write!(f, "Object@{:p}", Arc::as_ptr(obj)),
            Self::Proxy(proxy) => {
                if proxy.is_revoked() {
                    write!(f, "Proxy {{ <revoked> }}")
                } else {
                    write!(f, "Proxy@{:p}", Arc::as_ptr(proxy))
                }
            }
        }
    }
}

/// SameValue comparison
///
/// Referenceables compare by identity, strings by content, floats bitwise
/// (so `NaN` equals `NaN`).
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
            *y == *x as f64
        }
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(_) | Value::Proxy(_), Value::Object(_) | Value::Proxy(_)) => {
            a.object_id() == b.object_id()
        }
        _ => false,
    }
}
