//! Canonical identity bookkeeping
//!
//! One [`IdentityRecord`] exists per logical referenceable, keyed by the
//! identity of the value it originated as. A secondary index maps every
//! representation (the origin value, each domain's wrapper, and each
//! wrapper's shadow target) back to the record, so a lookup resolves any
//! face of a value to the same canonical record.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use osmo_graph::{GraphError, GraphProxy, GraphResult, ObjectId, Value};

use crate::domain::Domain;

/// Construction progress of a wrapper within one domain
///
/// `Sealed` is terminal; origin entries are born sealed (the real value
/// needs no construction).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructionState {
    /// Entry registered, shadow target still empty
    StubRegistered,
    /// Populate pass running or queued behind other work
    Finalizing,
    /// Fully populated and extensibility fixed
    Sealed,
}

/// Revocation capability held by non-origin entries
pub type RevokeFn = Arc<dyn Fn() + Send + Sync>;

/// One domain's representation of a logical value
pub struct Entry {
    representation: Value,
    proxy: Option<Arc<GraphProxy>>,
    revoke: Option<RevokeFn>,
    is_origin: bool,
    state: RwLock<ConstructionState>,
}

impl Entry {
    /// Entry for the domain a value originated in: the real value, no
    /// wrapper, born sealed
    pub fn origin(representation: Value) -> Arc<Self> {
        Arc::new(Self {
            representation,
            proxy: None,
            revoke: None,
            is_origin: true,
            state: RwLock::new(ConstructionState::Sealed),
        })
    }

    /// Entry for a non-origin domain: always carries the wrapper and with
    /// it the revoke capability
    pub fn wrapper(representation: Value, proxy: Arc<GraphProxy>, revoke: RevokeFn) -> Arc<Self> {
        Arc::new(Self {
            representation,
            proxy: Some(proxy),
            revoke: Some(revoke),
            is_origin: false,
            state: RwLock::new(ConstructionState::StubRegistered),
        })
    }

    /// The value this domain sees
    pub fn representation(&self) -> &Value {
        &self.representation
    }

    /// The wrapper, for non-origin entries
    pub fn proxy(&self) -> Option<&Arc<GraphProxy>> {
        self.proxy.as_ref()
    }

    /// The revoke capability, for non-origin entries
    pub fn revoke(&self) -> Option<&RevokeFn> {
        self.revoke.as_ref()
    }

    /// Whether this entry holds the real value
    pub fn is_origin(&self) -> bool {
        self.is_origin
    }

    /// Current construction state
    pub fn state(&self) -> ConstructionState {
        *self.state.read()
    }

    /// Advance the construction state
    pub fn set_state(&self, state: ConstructionState) {
        *self.state.write() = state;
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("is_origin", &self.is_origin)
            .field("state", &self.state())
            .finish()
    }
}

/// Canonical record for one logical referenceable
pub struct IdentityRecord {
    key: ObjectId,
    origin_domain: Domain,
    origin: Value,
    entries: RwLock<FxHashMap<Domain, Arc<Entry>>>,
}

impl IdentityRecord {
    /// The domain the value originated in
    pub fn origin_domain(&self) -> &Domain {
        &self.origin_domain
    }

    /// The real value
    pub fn origin(&self) -> &Value {
        &self.origin
    }

    /// Registry key (identity of the origin value)
    pub fn key(&self) -> ObjectId {
        self.key
    }

    /// This domain's entry, if one exists
    pub fn entry(&self, domain: &Domain) -> Option<Arc<Entry>> {
        self.entries.read().get(domain).cloned()
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<(Domain, Arc<Entry>)> {
        self.entries
            .read()
            .iter()
            .map(|(d, e)| (d.clone(), e.clone()))
            .collect()
    }
}

impl std::fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("origin_domain", &self.origin_domain)
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

/// Value-identity keyed record store
///
/// Owned by a single membrane; never process-global.
#[derive(Default)]
pub struct IdentityRegistry {
    records: RwLock<FxHashMap<ObjectId, Arc<IdentityRecord>>>,
    by_representation: RwLock<FxHashMap<ObjectId, ObjectId>>,
}

impl IdentityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// O(1) identity lookup; never triggers construction
    ///
    /// Resolves any representation of a value (origin, wrapper, shadow)
    /// to its record.
    pub fn lookup(&self, value: &Value) -> Option<Arc<IdentityRecord>> {
        let id = value.object_id()?;
        self.lookup_id(id)
    }

    /// Lookup by raw identity
    pub fn lookup_id(&self, id: ObjectId) -> Option<Arc<IdentityRecord>> {
        let key = *self.by_representation.read().get(&id)?;
        self.records.read().get(&key).cloned()
    }

    /// Find or create the record for a value
    ///
    /// Idempotent: repeated calls on the same value return the same
    /// record. On creation the record gets a sealed origin entry holding
    /// the real value.
    pub fn get_or_create(
        &self,
        value: &Value,
        origin_domain: &Domain,
    ) -> GraphResult<Arc<IdentityRecord>> {
        let id = value.object_id().ok_or_else(|| {
            GraphError::type_error("only referenceable values carry identity")
        })?;
        if let Some(record) = self.lookup_id(id) {
            return Ok(record);
        }

        let record = Arc::new(IdentityRecord {
            key: id,
            origin_domain: origin_domain.clone(),
            origin: value.clone(),
            entries: RwLock::new(FxHashMap::default()),
        });
        record
            .entries
            .write()
            .insert(origin_domain.clone(), Entry::origin(value.clone()));
        self.records.write().insert(id, record.clone());
        self.by_representation.write().insert(id, id);
        Ok(record)
    }

    /// Add a domain's entry to a record
    ///
    /// Fails with `IdentityConflict` if the domain already has one. The
    /// entry's representation is indexed back to the record.
    pub fn add_entry(
        &self,
        record: &Arc<IdentityRecord>,
        domain: &Domain,
        entry: Arc<Entry>,
    ) -> GraphResult<()> {
        let mut entries = record.entries.write();
        if entries.contains_key(domain) {
            return Err(GraphError::identity_conflict(format!(
                "domain '{domain}' already has an entry for this value"
            )));
        }
        if let Some(rep_id) = entry.representation().object_id() {
            self.by_representation.write().insert(rep_id, record.key);
        }
        entries.insert(domain.clone(), entry);
        Ok(())
    }

    /// Index an additional identity (a wrapper's shadow target) to a record
    pub fn add_alias(&self, id: ObjectId, record: &Arc<IdentityRecord>) {
        self.by_representation.write().insert(id, record.key);
    }

    /// Drop a record and every index pointing at it
    pub fn remove(&self, record: &Arc<IdentityRecord>) {
        let key = record.key;
        self.records.write().remove(&key);
        self.by_representation.write().retain(|_, v| *v != key);
    }

    /// Merge `from` into `into` after a post-hoc discovery that both
    /// records describe the same conceptual entity
    ///
    /// Fails with `IdentityConflict` when the records disagree on any
    /// domain's representation; on success `from` is gone and all of its
    /// representations resolve to `into`.
    pub fn merge(
        &self,
        into: &Arc<IdentityRecord>,
        from: &Arc<IdentityRecord>,
    ) -> GraphResult<()> {
        if Arc::ptr_eq(into, from) {
            return Ok(());
        }

        let from_entries = from.entries();
        {
            let into_entries = into.entries.read();
            for (domain, entry) in &from_entries {
                if let Some(existing) = into_entries.get(domain)
                    && existing.representation().object_id()
                        != entry.representation().object_id()
                {
                    return Err(GraphError::identity_conflict(format!(
                        "records disagree on the representation for domain '{domain}'"
                    )));
                }
            }
        }

        {
            let mut into_entries = into.entries.write();
            let mut index = self.by_representation.write();
            for (domain, entry) in from_entries {
                if let Some(rep_id) = entry.representation().object_id() {
                    index.insert(rep_id, into.key);
                }
                into_entries.entry(domain).or_insert(entry);
            }
            // Anything else indexed to the old record (shadow targets)
            // follows it
            for target in index.values_mut() {
                if *target == from.key {
                    *target = into.key;
                }
            }
        }
        self.records.write().remove(&from.key);
        Ok(())
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
