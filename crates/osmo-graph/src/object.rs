//! Graph objects: property bags with descriptors, a prototype link, and an
//! extensibility flag
//!
//! Objects come in three exotic kinds (ordinary, array, callable). The kind
//! matters to the membrane: a wrapper's shadow target must mirror the kind
//! of the value it represents.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::GraphResult;
use crate::value::{GcRef, Value, same_value};

/// Property key (string or integer index)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Integer index (for array-like objects)
    Index(u32),
}

impl PropertyKey {
    /// Create a string property key
    pub fn string(s: &str) -> Self {
        Self::String(Arc::from(s))
    }

    /// Create an index property key
    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Property attributes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyAttributes {
    /// Property is writable (data properties only)
    pub writable: bool,
    /// Property shows up in enumeration
    pub enumerable: bool,
    /// Property may be deleted or redefined
    pub configurable: bool,
}

impl PropertyAttributes {
    /// Default data property attributes (all true)
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::data()
    }
}

/// Property descriptor
#[derive(Clone, Debug)]
pub enum PropertyDescriptor {
    /// Data property
    Data {
        /// The value
        value: Value,
        /// Attributes
        attributes: PropertyAttributes,
    },
    /// Accessor property
    Accessor {
        /// Getter (a callable value)
        get: Option<Value>,
        /// Setter (a callable value)
        set: Option<Value>,
        /// Attributes
        attributes: PropertyAttributes,
    },
}

impl PropertyDescriptor {
    /// Create a data property with default attributes
    pub fn data(value: Value) -> Self {
        Self::Data {
            value,
            attributes: PropertyAttributes::data(),
        }
    }

    /// Create a data property with specific attributes
    pub fn data_with_attrs(value: Value, attributes: PropertyAttributes) -> Self {
        Self::Data { value, attributes }
    }

    /// Create an accessor property
    pub fn accessor(get: Option<Value>, set: Option<Value>, attributes: PropertyAttributes) -> Self {
        Self::Accessor {
            get,
            set,
            attributes,
        }
    }

    /// The attributes, regardless of descriptor kind
    pub fn attributes(&self) -> PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => *attributes,
        }
    }

    /// Mutable attributes access
    pub fn attributes_mut(&mut self) -> &mut PropertyAttributes {
        match self {
            Self::Data { attributes, .. } | Self::Accessor { attributes, .. } => attributes,
        }
    }

    /// Get the value (for data properties)
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Data { value, .. } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    /// Check if this is an accessor descriptor
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    /// Check if configurable
    pub fn is_configurable(&self) -> bool {
        self.attributes().configurable
    }

    /// Check if writable (accessors report false)
    pub fn is_writable(&self) -> bool {
        match self {
            Self::Data { attributes, .. } => attributes.writable,
            Self::Accessor { .. } => false,
        }
    }
}

/// Native function backing a callable object
///
/// Receives the `this` value and the arguments.
pub type NativeCall = Arc<dyn Fn(Value, &[Value]) -> GraphResult<Value> + Send + Sync>;

/// Exotic kind of a graph object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array-like object
    Array,
    /// Callable object
    Callable,
}

/// A graph object
///
/// Thread-safe with interior mutability.
pub struct GraphObject {
    kind: ObjectKind,
    properties: RwLock<IndexMap<PropertyKey, PropertyDescriptor>>,
    prototype: RwLock<Value>,
    extensible: AtomicBool,
    call: Option<NativeCall>,
}

impl GraphObject {
    fn with_kind(kind: ObjectKind, call: Option<NativeCall>) -> GcRef<Self> {
        Arc::new(Self {
            kind,
            properties: RwLock::new(IndexMap::new()),
            prototype: RwLock::new(Value::Null),
            extensible: AtomicBool::new(true),
            call,
        })
    }

    /// Create a new ordinary object
    pub fn ordinary() -> GcRef<Self> {
        Self::with_kind(ObjectKind::Ordinary, None)
    }

    /// Create a new array-like object
    pub fn array() -> GcRef<Self> {
        Self::with_kind(ObjectKind::Array, None)
    }

    /// Create a new callable object backed by a native function
    pub fn callable(call: NativeCall) -> GcRef<Self> {
        Self::with_kind(ObjectKind::Callable, Some(call))
    }

    /// Create a structural stand-in of the given kind with no behavior
    ///
    /// Shadow targets mirror the exotic kind of the value they back but
    /// never carry a native function of their own.
    pub fn shadow_of_kind(kind: ObjectKind) -> GcRef<Self> {
        Self::with_kind(kind, None)
    }

    /// The exotic kind
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// The native function, for callable objects
    pub fn native_call(&self) -> Option<&NativeCall> {
        self.call.as_ref()
    }

    /// Get a snapshot of the own property descriptor for `key`
    pub fn get_own_property(&self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        self.properties.read().get(key).cloned()
    }

    /// Check for an own property
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.properties.read().contains_key(key)
    }

    /// Own property keys, in insertion order
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.properties.read().keys().cloned().collect()
    }

    /// Define or redefine a property
    ///
    /// Returns `false` (without mutating) when the definition is rejected:
    /// new properties on a non-extensible object, or any incompatible
    /// change to a non-configurable property.
    pub fn define_property(&self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        let mut props = self.properties.write();
        match props.get(&key) {
            None => {
                if !self.is_extensible() {
                    return false;
                }
                props.insert(key, desc);
                true
            }
            Some(current) => {
                if !current.is_configurable() && !compatible_redefinition(current, &desc) {
                    return false;
                }
                props.insert(key, desc);
                true
            }
        }
    }

    /// Delete a property
    ///
    /// Returns `false` for non-configurable properties; `true` when the
    /// property was removed or never existed.
    pub fn delete(&self, key: &PropertyKey) -> bool {
        let mut props = self.properties.write();
        match props.get(key) {
            Some(desc) if !desc.is_configurable() => false,
            Some(_) => {
                props.shift_remove(key);
                true
            }
            None => true,
        }
    }

    /// The prototype (`Object` or `Null`)
    pub fn prototype(&self) -> Value {
        self.prototype.read().clone()
    }

    /// Replace the prototype
    ///
    /// Rejected on a non-extensible object unless the prototype is
    /// unchanged.
    pub fn set_prototype(&self, proto: Value) -> bool {
        let mut slot = self.prototype.write();
        if !self.is_extensible() && !same_value(&slot, &proto) {
            return false;
        }
        *slot = proto;
        true
    }

    /// Check extensibility
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// Make the object non-extensible (irreversible)
    pub fn prevent_extensions(&self) {
        self.extensible.store(false, Ordering::Release);
    }

    /// Seal: prevent extensions and mark every property non-configurable
    pub fn seal(&self) {
        self.prevent_extensions();
        let mut props = self.properties.write();
        for desc in props.values_mut() {
            desc.attributes_mut().configurable = false;
        }
    }
}

/// Whether `next` is an allowed redefinition of a non-configurable `current`
fn compatible_redefinition(current: &PropertyDescriptor, next: &PropertyDescriptor) -> bool {
    if next.is_configurable() {
        return false;
    }
    match (current, next) {
        (
            PropertyDescriptor::Data {
                value: cur_value,
                attributes: cur_attrs,
            },
            PropertyDescriptor::Data {
                value: next_value,
                attributes: next_attrs,
            },
        ) => {
            if cur_attrs.enumerable != next_attrs.enumerable {
                return false;
            }
            if cur_attrs.writable {
                true
            } else {
                !next_attrs.writable && same_value(cur_value, next_value)
            }
        }
        (
            PropertyDescriptor::Accessor {
                get: cur_get,
                set: cur_set,
                attributes: cur_attrs,
            },
            PropertyDescriptor::Accessor {
                get: next_get,
                set: next_set,
                attributes: next_attrs,
            },
        ) => {
            cur_attrs.enumerable == next_attrs.enumerable
                && option_same_value(cur_get, next_get)
                && option_same_value(cur_set, next_set)
        }
        // Data <-> accessor conversion is never allowed on a
        // non-configurable property
        _ => false,
    }
}

fn option_same_value(a: &Option<Value>, b: &Option<Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => same_value(x, y),
        _ => false,
    }
}

impl std::fmt::Debug for GraphObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphObject")
            .field("kind", &self.kind)
            .field("properties", &self.properties.read().len())
            .field("extensible", &self.is_extensible())
            .finish()
    }
}
