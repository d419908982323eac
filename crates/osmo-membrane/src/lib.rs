//! # osmo-membrane
//!
//! A reference-virtualization membrane: objects living in one isolated
//! domain can be observed and mutated from another through revocable
//! wrappers, while every logical value keeps a single canonical identity
//! across all domains and no domain ever sees another's real objects.
//!
//! ## How a crossing works
//!
//! A caller asks the [`Membrane`] to represent a value in a target domain.
//! The domain's [`GraphHandler`] consults the [`IdentityRegistry`]; if no
//! representation exists yet, it registers a stub immediately and defers
//! population and sealing to the [`ConstructionScheduler`], whose
//! trampoline finishes the whole discovered subgraph — cyclic structures
//! included — before the wrap call returns. Every trap the wrapper exposes
//! is checked by an [`InvariantGuard`] against the shadow target's
//! structural state.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod domain;
pub mod guard;
pub mod handler;
pub mod membrane;
pub mod registry;
pub mod scheduler;

pub use broadcast::{Broadcast, ObserverSet, WrapperEvent, WrapperListener};
pub use domain::Domain;
pub use guard::InvariantGuard;
pub use handler::GraphHandler;
pub use membrane::{DomainHandle, Membrane};
pub use registry::{ConstructionState, Entry, IdentityRecord, IdentityRegistry, RevokeFn};
pub use scheduler::{
    ConstructionScheduler, LEVEL_POPULATE, LEVEL_SEAL, PendingCallback, PendingKey, ScheduledJob,
    SchedulerQueue,
};
