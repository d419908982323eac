//! Per-domain graph handlers
//!
//! A [`GraphHandler`] owns one side of the membrane: it services every
//! structural trap for the wrappers living in its domain by forwarding the
//! operation to the real value in its origin domain and translating every
//! referenceable that flows across the boundary.
//!
//! Translation is `cross`: pass primitives and same-domain values through,
//! reuse an existing entry (possibly a still-finalizing wrapper), or
//! stub-register a fresh wrapper *before any property is copied* and leave
//! population and sealing to the construction scheduler. The early
//! registration is what breaks recursion on cyclic graphs: a second
//! `cross` reached through a cycle finds the entry and returns the
//! in-progress wrapper instead of descending further.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::trace;

use osmo_graph::{
    GcRef, GraphError, GraphObject, GraphProxy, GraphResult, ObjectKind, PropertyDescriptor,
    PropertyKey, TrapHandler, Value, ops,
};

use crate::broadcast::{ObserverSet, WrapperEvent};
use crate::domain::Domain;
use crate::registry::{ConstructionState, Entry, IdentityRecord, IdentityRegistry};
use crate::scheduler::{ConstructionScheduler, LEVEL_POPULATE, LEVEL_SEAL, PendingKey};

/// Domain → handler table shared between the membrane and its handlers
pub(crate) type HandlerMap = Arc<RwLock<FxHashMap<Domain, Arc<GraphHandler>>>>;

/// The exotic kind a shadow target must mirror
fn referenceable_kind(value: &Value) -> ObjectKind {
    match value {
        Value::Object(obj) => obj.kind(),
        Value::Proxy(proxy) => proxy.shadow().kind(),
        _ => ObjectKind::Ordinary,
    }
}

/// One domain's boundary handler
pub struct GraphHandler {
    domain: Domain,
    registry: Arc<IdentityRegistry>,
    scheduler: Arc<ConstructionScheduler>,
    observers: Arc<ObserverSet>,
    handlers: HandlerMap,
    /// The guard-wrapped trap chain new wrappers are bound to
    chain: OnceLock<Arc<dyn TrapHandler>>,
    self_ref: Weak<GraphHandler>,
}

impl GraphHandler {
    /// Create a handler for `domain`
    pub(crate) fn new(
        domain: Domain,
        registry: Arc<IdentityRegistry>,
        scheduler: Arc<ConstructionScheduler>,
        observers: Arc<ObserverSet>,
        handlers: HandlerMap,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            domain,
            registry,
            scheduler,
            observers,
            handlers,
            chain: OnceLock::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Bind the decorated trap chain (set once by the membrane right
    /// after construction)
    pub(crate) fn bind_chain(&self, chain: Arc<dyn TrapHandler>) {
        let _ = self.chain.set(chain);
    }

    /// The domain this handler serves
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    fn chain(&self) -> GraphResult<Arc<dyn TrapHandler>> {
        self.chain
            .get()
            .cloned()
            .ok_or_else(|| GraphError::type_error("graph handler has no trap chain bound"))
    }

    fn peer(&self, domain: &Domain) -> GraphResult<Arc<GraphHandler>> {
        self.handlers
            .read()
            .get(domain)
            .cloned()
            .ok_or_else(|| GraphError::UnknownDomain(domain.name().to_string()))
    }

    fn record_for_shadow(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Arc<IdentityRecord>> {
        let id = Value::object(shadow.clone())
            .object_id()
            .ok_or_else(|| GraphError::type_error("shadow target has no identity"))?;
        self.registry
            .lookup_id(id)
            .ok_or_else(|| GraphError::type_error("shadow target is not tracked by the registry"))
    }

    /// Produce this domain's representation of `value`
    ///
    /// `from` names the domain `value` currently lives in. Primitives and
    /// same-domain values pass through unchanged; a known value returns
    /// its existing (possibly still-finalizing) representation; anything
    /// else is stub-registered and queued for populate + seal.
    pub fn cross(&self, value: &Value, from: &Domain) -> GraphResult<Value> {
        if value.is_primitive() {
            return Ok(value.clone());
        }
        if *from == self.domain {
            return Ok(value.clone());
        }

        let record = match self.registry.lookup(value) {
            Some(record) => record,
            None => self.registry.get_or_create(value, from)?,
        };
        if let Some(entry) = record.entry(&self.domain) {
            return Ok(entry.representation().clone());
        }

        // Stub-register before any property is copied. A cross reached
        // through a cycle during population finds this entry and stops.
        let shadow = GraphObject::shadow_of_kind(referenceable_kind(record.origin()));
        let revocable = GraphProxy::revocable(shadow.clone(), self.chain()?);
        let wrapper = Value::proxy(revocable.proxy.clone());
        let entry = Entry::wrapper(wrapper.clone(), revocable.proxy, revocable.revoke);
        self.registry.add_entry(&record, &self.domain, entry.clone())?;
        if let Some(shadow_id) = Value::object(shadow.clone()).object_id() {
            self.registry.add_alias(shadow_id, &record);
        }
        trace!(
            domain = %self.domain,
            origin = %record.origin_domain(),
            "stub-registered wrapper"
        );

        let key: PendingKey = (record.key(), self.domain.clone());
        let observers = self.observers.clone();
        let event = WrapperEvent {
            wrapper: wrapper.clone(),
            real_value: record.origin().clone(),
            domain: self.domain.clone(),
            is_origin_domain: self.domain == *record.origin_domain(),
        };
        self.scheduler
            .defer_until_sealed(key.clone(), Box::new(move || observers.broadcast(&event)));

        let this = self
            .self_ref
            .upgrade()
            .ok_or_else(|| GraphError::type_error("graph handler was dropped"))?;
        {
            let this = this.clone();
            let record = record.clone();
            let entry = entry.clone();
            let shadow = shadow.clone();
            self.scheduler.enqueue(
                LEVEL_POPULATE,
                Box::new(move || this.populate(&record, &entry, &shadow)),
            )?;
        }
        self.scheduler.enqueue(
            LEVEL_SEAL,
            Box::new(move || this.seal(&record, &entry, &shadow, &key)),
        )?;

        Ok(wrapper)
    }

    /// Translate a value of this domain into `to` (trap arguments moving
    /// toward the origin graph)
    fn export(&self, value: &Value, to: &Domain) -> GraphResult<Value> {
        if value.is_primitive() || *to == self.domain {
            return Ok(value.clone());
        }
        self.peer(to)?.cross(value, &self.domain)
    }

    /// Cross a descriptor's value/getter/setter into this domain
    ///
    /// The `configurable`/`enumerable`/`writable` flags are copied
    /// unchanged: the flags, not the wrapped values, carry the structural
    /// promises the invariant guard enforces.
    pub fn wrap_descriptor(
        &self,
        desc: PropertyDescriptor,
        from: &Domain,
    ) -> GraphResult<PropertyDescriptor> {
        self.translate_descriptor(desc, |value| self.cross(value, from))
    }

    fn export_descriptor(
        &self,
        desc: PropertyDescriptor,
        to: &Domain,
    ) -> GraphResult<PropertyDescriptor> {
        self.translate_descriptor(desc, |value| self.export(value, to))
    }

    fn translate_descriptor(
        &self,
        desc: PropertyDescriptor,
        translate: impl Fn(&Value) -> GraphResult<Value>,
    ) -> GraphResult<PropertyDescriptor> {
        Ok(match desc {
            PropertyDescriptor::Data { value, attributes } => PropertyDescriptor::Data {
                value: translate(&value)?,
                attributes,
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                attributes,
            } => PropertyDescriptor::Accessor {
                get: get.as_ref().map(&translate).transpose()?,
                set: set.as_ref().map(&translate).transpose()?,
                attributes,
            },
        })
    }

    /// Reconcile the shadow with structural changes made directly in the
    /// origin domain after sealing: dropped properties, hardened
    /// attributes, lost extensibility
    fn sync_shadow(
        &self,
        shadow: &GcRef<GraphObject>,
        record: &IdentityRecord,
    ) -> GraphResult<()> {
        let origin = record.origin();
        for key in shadow.own_keys() {
            match ops::get_own_property(origin, &key)? {
                None => {
                    let _ = shadow.delete(&key);
                }
                Some(origin_desc) => {
                    if let Some(mut shadow_desc) = shadow.get_own_property(&key)
                        && shadow_desc.attributes() != origin_desc.attributes()
                    {
                        *shadow_desc.attributes_mut() = origin_desc.attributes();
                        let _ = shadow.define_property(key, shadow_desc);
                    }
                }
            }
        }
        if shadow.is_extensible() && !ops::is_extensible(origin)? {
            // The prototype pins along with extensibility; mirror it first
            let proto = self.cross(&ops::prototype_of(origin)?, record.origin_domain())?;
            let _ = shadow.set_prototype(proto);
            shadow.prevent_extensions();
            self.scheduler.drain()?;
        }
        Ok(())
    }

    /// Copy every translated property and the prototype onto the shadow
    fn populate(
        &self,
        record: &Arc<IdentityRecord>,
        entry: &Arc<Entry>,
        shadow: &GcRef<GraphObject>,
    ) -> GraphResult<()> {
        entry.set_state(ConstructionState::Finalizing);
        let origin = record.origin();
        let origin_domain = record.origin_domain();

        for key in ops::own_keys(origin)? {
            if let Some(desc) = ops::get_own_property(origin, &key)? {
                let wrapped = self.wrap_descriptor(desc, origin_domain)?;
                let _ = shadow.define_property(key, wrapped);
            }
        }

        let proto = ops::prototype_of(origin)?;
        let crossed = self.cross(&proto, origin_domain)?;
        let _ = shadow.set_prototype(crossed);
        Ok(())
    }

    /// Fix the shadow's extensibility and attributes to the origin's as of
    /// now, mark the entry sealed, and release its pending callbacks
    fn seal(
        &self,
        record: &Arc<IdentityRecord>,
        entry: &Arc<Entry>,
        shadow: &GcRef<GraphObject>,
        key: &PendingKey,
    ) -> GraphResult<()> {
        let origin = record.origin();

        // Attributes may have hardened between populate and seal
        for prop in shadow.own_keys() {
            if let (Some(mut shadow_desc), Some(origin_desc)) = (
                shadow.get_own_property(&prop),
                ops::get_own_property(origin, &prop)?,
            ) && shadow_desc.attributes() != origin_desc.attributes()
            {
                *shadow_desc.attributes_mut() = origin_desc.attributes();
                let _ = shadow.define_property(prop, shadow_desc);
            }
        }
        if !ops::is_extensible(origin)? {
            shadow.prevent_extensions();
        }

        entry.set_state(ConstructionState::Sealed);
        trace!(domain = %self.domain, "wrapper sealed");
        self.scheduler.notify_sealed(key);
        Ok(())
    }
}

impl TrapHandler for GraphHandler {
    fn get(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<Value> {
        let record = self.record_for_shadow(shadow)?;
        let result = ops::get(record.origin(), key)?;
        let crossed = self.cross(&result, record.origin_domain())?;
        self.scheduler.drain()?;
        Ok(crossed)
    }

    fn set(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
        value: Value,
    ) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        let exported = self.export(&value, record.origin_domain())?;
        self.scheduler.drain()?;
        let accepted = ops::set(record.origin(), key, exported)?;
        if accepted {
            // Mirror the resulting descriptor so the shadow keeps telling
            // the truth to the invariant guard
            if let Some(desc) = ops::get_own_property(record.origin(), key)? {
                let wrapped = self.wrap_descriptor(desc, record.origin_domain())?;
                self.scheduler.drain()?;
                let _ = shadow.define_property(key.clone(), wrapped);
            }
        }
        Ok(accepted)
    }

    fn delete_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
    ) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        let deleted = ops::delete(record.origin(), key)?;
        if deleted {
            let _ = shadow.delete(key);
        }
        Ok(deleted)
    }

    fn define_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
        desc: PropertyDescriptor,
    ) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        let exported = self.export_descriptor(desc.clone(), record.origin_domain())?;
        self.scheduler.drain()?;
        let accepted = ops::define_property(record.origin(), key, exported)?;
        if accepted {
            let _ = shadow.define_property(key.clone(), desc);
        }
        Ok(accepted)
    }

    fn get_own_property(
        &self,
        shadow: &GcRef<GraphObject>,
        key: &PropertyKey,
    ) -> GraphResult<Option<PropertyDescriptor>> {
        let record = self.record_for_shadow(shadow)?;
        self.sync_shadow(shadow, &record)?;
        match ops::get_own_property(record.origin(), key)? {
            None => Ok(None),
            Some(desc) => {
                let wrapped = self.wrap_descriptor(desc, record.origin_domain())?;
                self.scheduler.drain()?;
                Ok(Some(wrapped))
            }
        }
    }

    fn has(&self, shadow: &GcRef<GraphObject>, key: &PropertyKey) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        self.sync_shadow(shadow, &record)?;
        ops::has(record.origin(), key)
    }

    fn own_keys(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Vec<PropertyKey>> {
        let record = self.record_for_shadow(shadow)?;
        self.sync_shadow(shadow, &record)?;
        ops::own_keys(record.origin())
    }

    fn get_prototype_of(&self, shadow: &GcRef<GraphObject>) -> GraphResult<Value> {
        let record = self.record_for_shadow(shadow)?;
        self.sync_shadow(shadow, &record)?;
        let proto = ops::prototype_of(record.origin())?;
        let crossed = self.cross(&proto, record.origin_domain())?;
        self.scheduler.drain()?;
        Ok(crossed)
    }

    fn set_prototype_of(&self, shadow: &GcRef<GraphObject>, proto: Value) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        let exported = self.export(&proto, record.origin_domain())?;
        self.scheduler.drain()?;
        let accepted = ops::set_prototype_of(record.origin(), exported)?;
        if accepted {
            let _ = shadow.set_prototype(proto);
        }
        Ok(accepted)
    }

    fn is_extensible(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        self.sync_shadow(shadow, &record)?;
        ops::is_extensible(record.origin())
    }

    fn prevent_extensions(&self, shadow: &GcRef<GraphObject>) -> GraphResult<bool> {
        let record = self.record_for_shadow(shadow)?;
        let accepted = ops::prevent_extensions(record.origin())?;
        if accepted {
            shadow.prevent_extensions();
        }
        Ok(accepted)
    }
}

impl std::fmt::Debug for GraphHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphHandler")
            .field("domain", &self.domain)
            .finish()
    }
}
