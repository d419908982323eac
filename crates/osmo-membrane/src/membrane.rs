//! The membrane orchestrator
//!
//! Owns the identity registry, the construction scheduler, the observer
//! set, and one [`GraphHandler`] per registered domain. All public
//! crossing operations live here.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use osmo_graph::{GraphError, GraphResult, TrapHandler, Value};

use crate::broadcast::{ObserverSet, WrapperListener};
use crate::domain::Domain;
use crate::guard::InvariantGuard;
use crate::handler::{GraphHandler, HandlerMap};
use crate::registry::IdentityRegistry;
use crate::scheduler::ConstructionScheduler;

/// Handle to a registered domain
#[derive(Clone)]
pub struct DomainHandle {
    domain: Domain,
    handler: Arc<GraphHandler>,
}

impl DomainHandle {
    /// The domain's name
    pub fn name(&self) -> &str {
        self.domain.name()
    }

    /// The domain identifier
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub(crate) fn handler(&self) -> &Arc<GraphHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for DomainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainHandle")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Mediator for value crossings between isolated object graphs
///
/// Every logical value keeps a single canonical identity across all
/// domains; a domain's real objects are never handed to another domain
/// directly, only through revocable wrappers.
pub struct Membrane {
    registry: Arc<IdentityRegistry>,
    scheduler: Arc<ConstructionScheduler>,
    observers: Arc<ObserverSet>,
    handlers: HandlerMap,
}

impl Default for Membrane {
    fn default() -> Self {
        Self::new()
    }
}

impl Membrane {
    /// Create an empty membrane
    pub fn new() -> Self {
        Self {
            registry: Arc::new(IdentityRegistry::new()),
            scheduler: Arc::new(ConstructionScheduler::new()),
            observers: Arc::new(ObserverSet::new()),
            handlers: Arc::new(RwLock::new(FxHashMap::default())),
        }
    }

    /// Register a domain, or fetch the handle of an already-registered one
    pub fn register_domain(&self, name: &str) -> DomainHandle {
        let domain = Domain::new(name);
        let mut handlers = self.handlers.write();
        let handler = handlers
            .entry(domain.clone())
            .or_insert_with(|| {
                let handler = GraphHandler::new(
                    domain.clone(),
                    self.registry.clone(),
                    self.scheduler.clone(),
                    self.observers.clone(),
                    self.handlers.clone(),
                );
                let chain: Arc<dyn TrapHandler> = Arc::new(InvariantGuard::new(handler.clone()));
                handler.bind_chain(chain);
                debug!(domain = %domain, "registered domain");
                handler
            })
            .clone();
        DomainHandle { domain, handler }
    }

    fn handler(&self, domain: &Domain) -> GraphResult<Arc<GraphHandler>> {
        self.handlers
            .read()
            .get(domain)
            .cloned()
            .ok_or_else(|| GraphError::UnknownDomain(domain.name().to_string()))
    }

    /// Produce `to`'s representation of a value living in `from`
    ///
    /// Primitives pass through unchanged. Referenceables route through the
    /// target domain's handler; the construction queue is drained before
    /// the wrapper is returned, so the entire newly discovered subgraph —
    /// cycles included — is sealed by then.
    pub fn wrap(&self, value: &Value, from: &str, to: &str) -> GraphResult<Value> {
        let from = Domain::new(from);
        let to = Domain::new(to);
        self.handler(&from)?;
        let target = self.handler(&to)?;

        if value.is_primitive() {
            return Ok(value.clone());
        }

        debug!(%from, %to, "membrane crossing");
        let wrapper = target.cross(value, &from)?;
        self.scheduler.drain()?;
        Ok(wrapper)
    }

    /// Merge two independently-created records discovered post hoc to
    /// describe the same conceptual entity
    ///
    /// Fails with `IdentityConflict` if the records disagree on any
    /// domain's representation.
    pub fn unify(
        &self,
        domain_a: &str,
        value_a: &Value,
        domain_b: &str,
        value_b: &Value,
    ) -> GraphResult<()> {
        let domain_a = Domain::new(domain_a);
        let domain_b = Domain::new(domain_b);
        self.handler(&domain_a)?;
        self.handler(&domain_b)?;

        let record_a = self.registry.get_or_create(value_a, &domain_a)?;
        let record_b = self.registry.get_or_create(value_b, &domain_b)?;
        self.registry.merge(&record_a, &record_b)
    }

    /// Permanently disable every wrapper of a value and forget its record
    ///
    /// Every trap on a revoked wrapper fails with `RevocationError` from
    /// then on. The value itself (in its origin domain) is untouched and
    /// may be wrapped afresh later, producing new wrappers.
    pub fn revoke(&self, value: &Value) -> GraphResult<()> {
        let record = self.registry.lookup(value).ok_or_else(|| {
            GraphError::type_error("cannot revoke a value this membrane has never tracked")
        })?;
        let mut revoked = 0usize;
        for (_, entry) in record.entries() {
            if let Some(revoke) = entry.revoke() {
                revoke();
                revoked += 1;
            }
        }
        self.registry.remove(&record);
        debug!(wrappers = revoked, "revoked record");
        Ok(())
    }

    /// Register a wrapper-construction listener
    ///
    /// Invoked synchronously, in registration order, whenever a new
    /// wrapper finishes construction.
    pub fn add_listener(&self, listener: WrapperListener) {
        self.observers.add_listener(listener);
    }

    /// Number of tracked identity records
    pub fn tracked_values(&self) -> usize {
        self.registry.len()
    }
}

impl std::fmt::Debug for Membrane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membrane")
            .field("domains", &self.handlers.read().len())
            .field("records", &self.registry.len())
            .finish()
    }
}
