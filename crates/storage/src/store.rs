//! In-memory graph store
//!
//! Committed state lives behind a single `RwLock`. Transactions stage their
//! writes privately and apply them under the write lock at commit, after the
//! pre-commit observers have run. There is no conflict detection: concurrent
//! writers to the same entity are last-committer-wins.
//!
//! The store also owns the two observer channels (commit events and kernel
//! events) and the stopped flag that turns away new transactions after
//! `shutdown()` or `panic()`.

use crate::events::{ErrorState, KernelEventHandler, TransactionEventHandler};
use crate::index::IndexSet;
use crate::records::{NodeRecord, RelationshipRecord};
use crate::transaction::Transaction;
use graphtx_core::{EntityKind, EntityRef, Error, NodeId, RelationshipId, Result, TxnId, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, trace};

#[derive(Debug, Default)]
pub(crate) struct GraphState {
    pub(crate) nodes: BTreeMap<NodeId, NodeRecord>,
    pub(crate) relationships: BTreeMap<RelationshipId, RelationshipRecord>,
    node_indexes: IndexSet,
    relationship_indexes: IndexSet,
}

impl GraphState {
    pub(crate) fn contains(&self, entity: EntityRef) -> bool {
        match entity {
            EntityRef::Node(id) => self.nodes.contains_key(&id),
            EntityRef::Relationship(id) => self.relationships.contains_key(&id),
        }
    }

    pub(crate) fn indexes(&self, kind: EntityKind) -> &IndexSet {
        match kind {
            EntityKind::Node => &self.node_indexes,
            EntityKind::Relationship => &self.relationship_indexes,
        }
    }

    pub(crate) fn indexes_mut(&mut self, kind: EntityKind) -> &mut IndexSet {
        match kind {
            EntityKind::Node => &mut self.node_indexes,
            EntityKind::Relationship => &mut self.relationship_indexes,
        }
    }
}

pub(crate) struct StoreInner {
    pub(crate) state: RwLock<GraphState>,
    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
    next_txn_id: AtomicU64,
    transaction_handlers: RwLock<Vec<Arc<dyn TransactionEventHandler>>>,
    kernel_handlers: RwLock<Vec<Arc<dyn KernelEventHandler>>>,
    stopped: AtomicBool,
}

impl StoreInner {
    pub(crate) fn allocate_node_id(&self) -> NodeId {
        NodeId(self.next_node_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn allocate_relationship_id(&self) -> RelationshipId {
        RelationshipId(self.next_relationship_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn is_available(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    // Snapshot so no lock is held while observers run
    pub(crate) fn transaction_handlers(&self) -> Vec<Arc<dyn TransactionEventHandler>> {
        self.transaction_handlers.read().clone()
    }
}

/// Handle to an in-memory graph store
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<StoreInner>,
}

impl GraphStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(GraphState::default()),
                next_node_id: AtomicU64::new(0),
                next_relationship_id: AtomicU64::new(0),
                next_txn_id: AtomicU64::new(1),
                transaction_handlers: RwLock::new(Vec::new()),
                kernel_handlers: RwLock::new(Vec::new()),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Begin a new transaction
    ///
    /// # Errors
    /// `DatabaseShutdown` once the store has been shut down or panicked.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        if !self.inner.is_available() {
            return Err(Error::DatabaseShutdown);
        }
        let id = TxnId(self.inner.next_txn_id.fetch_add(1, Ordering::Relaxed));
        trace!(target: "graphtx::txn", txn = %id, "Transaction started");
        Ok(Transaction::new(id, Arc::clone(&self.inner)))
    }

    /// Register a commit observer. Observers run in registration order.
    pub fn register_transaction_event_handler(&self, handler: Arc<dyn TransactionEventHandler>) {
        trace!(target: "graphtx::txn", handler = handler.name(), "Registered commit observer");
        self.inner.transaction_handlers.write().push(handler);
    }

    /// Remove a previously registered commit observer.
    /// Returns false if it was not registered.
    pub fn unregister_transaction_event_handler(
        &self,
        handler: &Arc<dyn TransactionEventHandler>,
    ) -> bool {
        let mut handlers = self.inner.transaction_handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Register a lifecycle observer
    pub fn register_kernel_event_handler(&self, handler: Arc<dyn KernelEventHandler>) {
        self.inner.kernel_handlers.write().push(handler);
    }

    /// Remove a previously registered lifecycle observer.
    /// Returns false if it was not registered.
    pub fn unregister_kernel_event_handler(&self, handler: &Arc<dyn KernelEventHandler>) -> bool {
        let mut handlers = self.inner.kernel_handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    /// Stop the store. Kernel observers get `before_shutdown`; afterwards
    /// `begin_transaction` fails. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(target: "graphtx::db", "Graph store shutting down");
        let handlers = self.inner.kernel_handlers.read().clone();
        for handler in handlers {
            handler.before_shutdown();
        }
    }

    /// Stop the store after a fatal error. Kernel observers get
    /// `kernel_panic`. No-op if the store is already stopped.
    pub fn panic(&self, reason: impl Into<String>) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let state = ErrorState {
            reason: reason.into(),
        };
        error!(target: "graphtx::db", reason = %state.reason, "Graph store kernel panic");
        let handlers = self.inner.kernel_handlers.read().clone();
        for handler in handlers {
            handler.kernel_panic(&state);
        }
    }

    /// True until `shutdown()` or `panic()`
    pub fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    /// Committed state of a node
    pub fn node(&self, id: NodeId) -> Option<NodeRecord> {
        self.inner.state.read().nodes.get(&id).cloned()
    }

    /// Committed state of a relationship
    pub fn relationship(&self, id: RelationshipId) -> Option<RelationshipRecord> {
        self.inner.state.read().relationships.get(&id).cloned()
    }

    /// Number of committed nodes
    pub fn node_count(&self) -> usize {
        self.inner.state.read().nodes.len()
    }

    /// Number of committed relationships
    pub fn relationship_count(&self) -> usize {
        self.inner.state.read().relationships.len()
    }

    /// Committed index names of `kind`
    pub fn index_names(&self, kind: EntityKind) -> Vec<String> {
        self.inner.state.read().indexes(kind).names()
    }

    /// Committed index lookup
    pub fn index_get(&self, kind: EntityKind, name: &str, key: &str, value: &Value) -> Vec<EntityRef> {
        self.inner
            .state
            .read()
            .indexes(kind)
            .get(name)
            .map(|index| index.get(key, value))
            .unwrap_or_default()
    }

    /// True if `entity` has a committed entry in index `name`
    pub fn index_contains(&self, name: &str, entity: EntityRef) -> bool {
        self.inner
            .state
            .read()
            .indexes(entity.kind())
            .get(name)
            .map(|index| index.contains(&entity))
            .unwrap_or(false)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphStore")
            .field("available", &self.is_available())
            .field("nodes", &self.node_count())
            .finish()
    }
}
