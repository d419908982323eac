//! # osmo-graph
//!
//! Object-graph substrate for the osmo membrane.
//!
//! ## Design principles
//!
//! - **Identity first**: referenceable values compare by allocation
//!   identity; that identity is what the membrane's registry tracks.
//! - **Descriptors carry the promises**: `configurable` / `writable` /
//!   extensibility flags are the structural contracts that invariant
//!   checking enforces, independently of the values behind them.
//! - **Shadow-backed wrappers**: a proxy never exposes its shadow target;
//!   every structural operation routes through its [`TrapHandler`] chain.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod object;
pub mod ops;
pub mod proxy;
pub mod value;

pub use error::{GraphError, GraphResult};
pub use object::{
    GraphObject, NativeCall, ObjectKind, PropertyAttributes, PropertyDescriptor, PropertyKey,
};
pub use proxy::{GraphProxy, RevocableProxy, TrapHandler};
pub use value::{GcRef, ObjectId, Value, same_value};
