//! Transaction handle
//!
//! A [`Transaction`] stages every write in a private overlay. Nothing is
//! visible to other transactions until `close()` commits it. The outcome is
//! decided by `mark_success()` / `mark_failure()` before close; a failure
//! mark is sticky and wins over any later success mark.
//!
//! ## Commit protocol
//!
//! 1. Take the staged state out of the handle (the handle is closed from
//!    here on, whatever happens next).
//! 2. Not marked successful: roll back, notify `after_rollback`.
//! 3. Nothing written: done, no observers are called.
//! 4. Build the [`TransactionData`] change set and run every `before_commit`
//!    observer with no lock held. The first error vetoes the commit.
//! 5. Apply the overlay under the store's write lock, then run
//!    `after_commit`.
//!
//! A handle dropped without `close()` rolls back.

use crate::events::{LabelEntry, PropertyEntry, TransactionData};
use crate::index::{IndexOp, NamedIndex};
use crate::records::{NodeRecord, RelationshipRecord};
use crate::store::StoreInner;
use graphtx_core::{
    EntityKind, EntityRef, Error, Label, NodeId, RelationshipId, Result, TxnId, Value,
};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome mark of an open transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Neither success nor failure marked; closes as a rollback
    #[default]
    Undecided,
    /// Marked successful; closes as a commit
    Success,
    /// Marked failed; closes as a rollback
    Failure,
}

/// What `close()` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Writes (if any) are now visible
    Committed,
    /// Writes were discarded
    RolledBack,
}

#[derive(Default)]
struct Staged {
    outcome: Outcome,
    closed: bool,
    // `None` marks a deletion of a committed entity
    nodes: BTreeMap<NodeId, Option<NodeRecord>>,
    created_nodes: BTreeSet<NodeId>,
    relationships: BTreeMap<RelationshipId, Option<RelationshipRecord>>,
    created_relationships: BTreeSet<RelationshipId>,
    assigned_properties: Vec<PropertyEntry>,
    removed_properties: Vec<PropertyEntry>,
    assigned_labels: Vec<LabelEntry>,
    removed_labels: Vec<LabelEntry>,
    index_ops: Vec<IndexOp>,
}

impl Staged {
    fn has_writes(&self) -> bool {
        !self.nodes.is_empty() || !self.relationships.is_empty() || !self.index_ops.is_empty()
    }

    fn change_set(&self, txn: TxnId) -> TransactionData {
        let mut data = TransactionData {
            txn_id: Some(txn),
            created_nodes: self.created_nodes.iter().copied().collect(),
            created_relationships: self.created_relationships.iter().copied().collect(),
            assigned_node_properties: self.assigned_properties.clone(),
            removed_node_properties: self.removed_properties.clone(),
            assigned_labels: self.assigned_labels.clone(),
            removed_labels: self.removed_labels.clone(),
            index_writes: self.index_ops.len(),
            ..TransactionData::default()
        };
        for (id, record) in &self.nodes {
            match record {
                Some(record) => {
                    data.nodes_after.insert(*id, record.clone());
                }
                None => data.deleted_nodes.push(*id),
            }
        }
        for (id, record) in &self.relationships {
            if record.is_none() {
                data.deleted_relationships.push(*id);
            }
        }
        data
    }
}

/// An open unit of work against a [`GraphStore`](crate::GraphStore)
pub struct Transaction {
    id: TxnId,
    store: Arc<StoreInner>,
    staged: Mutex<Staged>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId, store: Arc<StoreInner>) -> Self {
        Self {
            id,
            store,
            staged: Mutex::new(Staged::default()),
        }
    }

    /// Transaction id
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// True once `close()` has run
    pub fn is_closed(&self) -> bool {
        self.staged.lock().closed
    }

    /// Current outcome mark
    pub fn outcome(&self) -> Outcome {
        self.staged.lock().outcome
    }

    /// Mark the transaction to commit on close. Ignored after a failure mark.
    pub fn mark_success(&self) {
        let mut staged = self.staged.lock();
        if staged.outcome != Outcome::Failure {
            staged.outcome = Outcome::Success;
        }
    }

    /// Mark the transaction to roll back on close. Sticky.
    pub fn mark_failure(&self) {
        self.staged.lock().outcome = Outcome::Failure;
    }

    fn open(&self) -> Result<MutexGuard<'_, Staged>> {
        let staged = self.staged.lock();
        if staged.closed {
            return Err(Error::TransactionClosed(self.id));
        }
        Ok(staged)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Create a node carrying `labels`
    pub fn create_node(&self, labels: &[Label]) -> Result<NodeId> {
        let mut staged = self.open()?;
        let id = self.store.allocate_node_id();
        let mut record = NodeRecord::new(id);
        for label in labels {
            if record.labels.insert(label.clone()) {
                staged.assigned_labels.push(LabelEntry {
                    node: id,
                    label: label.clone(),
                });
            }
        }
        staged.nodes.insert(id, Some(record));
        staged.created_nodes.insert(id);
        Ok(id)
    }

    /// Node as seen by this transaction
    pub fn get_node(&self, id: NodeId) -> Result<NodeRecord> {
        let staged = self.open()?;
        match staged.nodes.get(&id) {
            Some(Some(record)) => Ok(record.clone()),
            Some(None) => Err(Error::NodeNotFound(id)),
            None => self
                .store
                .state
                .read()
                .nodes
                .get(&id)
                .cloned()
                .ok_or(Error::NodeNotFound(id)),
        }
    }

    fn node_mut<'a>(store: &StoreInner, staged: &'a mut Staged, id: NodeId) -> Result<&'a mut NodeRecord> {
        if !staged.nodes.contains_key(&id) {
            let committed = store
                .state
                .read()
                .nodes
                .get(&id)
                .cloned()
                .ok_or(Error::NodeNotFound(id))?;
            staged.nodes.insert(id, Some(committed));
        }
        match staged.nodes.get_mut(&id) {
            Some(Some(record)) => Ok(record),
            _ => Err(Error::NodeNotFound(id)),
        }
    }

    /// Set a node property, returning the previous value
    pub fn set_node_property(
        &self,
        id: NodeId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        let value = value.into();
        let mut staged = self.open()?;
        let previous = Self::node_mut(&self.store, &mut staged, id)?
            .properties
            .insert(key.to_string(), value.clone());
        staged.assigned_properties.push(PropertyEntry {
            node: id,
            key: key.to_string(),
            previous: previous.clone(),
            value: Some(value),
        });
        Ok(previous)
    }

    /// Remove a node property, returning the removed value
    pub fn remove_node_property(&self, id: NodeId, key: &str) -> Result<Option<Value>> {
        let mut staged = self.open()?;
        let removed = Self::node_mut(&self.store, &mut staged, id)?
            .properties
            .remove(key);
        if let Some(previous) = &removed {
            staged.removed_properties.push(PropertyEntry {
                node: id,
                key: key.to_string(),
                previous: Some(previous.clone()),
                value: None,
            });
        }
        Ok(removed)
    }

    /// Add a label. Returns false if the node already carried it.
    pub fn add_label(&self, id: NodeId, label: &Label) -> Result<bool> {
        let mut staged = self.open()?;
        let added = Self::node_mut(&self.store, &mut staged, id)?
            .labels
            .insert(label.clone());
        if added {
            staged.assigned_labels.push(LabelEntry {
                node: id,
                label: label.clone(),
            });
        }
        Ok(added)
    }

    /// Remove a label. Returns false if the node did not carry it.
    pub fn remove_label(&self, id: NodeId, label: &Label) -> Result<bool> {
        let mut staged = self.open()?;
        let removed = Self::node_mut(&self.store, &mut staged, id)?
            .labels
            .remove(label);
        if removed {
            staged.removed_labels.push(LabelEntry {
                node: id,
                label: label.clone(),
            });
        }
        Ok(removed)
    }

    /// Delete a node. The node must have no live relationships.
    pub fn delete_node(&self, id: NodeId) -> Result<()> {
        let mut staged = self.open()?;
        Self::node_mut(&self.store, &mut staged, id)?;

        let attached = self.live_relationships(&staged, id);
        if let Some(rel) = attached.first() {
            return Err(Error::InvalidOperation(format!(
                "cannot delete {} while {} is attached",
                id, rel
            )));
        }

        if staged.created_nodes.remove(&id) {
            staged.nodes.remove(&id);
        } else {
            staged.nodes.insert(id, None);
        }
        Ok(())
    }

    fn live_relationships(&self, staged: &Staged, node: NodeId) -> Vec<RelationshipId> {
        let mut attached: Vec<RelationshipId> = staged
            .relationships
            .values()
            .flatten()
            .filter(|rel| rel.touches(node))
            .map(|rel| rel.id)
            .collect();
        let state = self.store.state.read();
        attached.extend(
            state
                .relationships
                .values()
                .filter(|rel| rel.touches(node) && !staged.relationships.contains_key(&rel.id))
                .map(|rel| rel.id),
        );
        attached
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship of `rel_type` from `start` to `end`
    pub fn create_relationship(&self, start: NodeId, end: NodeId, rel_type: &str) -> Result<RelationshipId> {
        let mut staged = self.open()?;
        Self::node_mut(&self.store, &mut staged, start)?;
        Self::node_mut(&self.store, &mut staged, end)?;

        let id = self.store.allocate_relationship_id();
        staged.relationships.insert(
            id,
            Some(RelationshipRecord {
                id,
                start,
                end,
                rel_type: rel_type.to_string(),
                properties: BTreeMap::new(),
            }),
        );
        staged.created_relationships.insert(id);
        Ok(id)
    }

    /// Relationship as seen by this transaction
    pub fn get_relationship(&self, id: RelationshipId) -> Result<RelationshipRecord> {
        let staged = self.open()?;
        match staged.relationships.get(&id) {
            Some(Some(record)) => Ok(record.clone()),
            Some(None) => Err(Error::RelationshipNotFound(id)),
            None => self
                .store
                .state
                .read()
                .relationships
                .get(&id)
                .cloned()
                .ok_or(Error::RelationshipNotFound(id)),
        }
    }

    fn relationship_mut<'a>(
        store: &StoreInner,
        staged: &'a mut Staged,
        id: RelationshipId,
    ) -> Result<&'a mut RelationshipRecord> {
        if !staged.relationships.contains_key(&id) {
            let committed = store
                .state
                .read()
                .relationships
                .get(&id)
                .cloned()
                .ok_or(Error::RelationshipNotFound(id))?;
            staged.relationships.insert(id, Some(committed));
        }
        match staged.relationships.get_mut(&id) {
            Some(Some(record)) => Ok(record),
            _ => Err(Error::RelationshipNotFound(id)),
        }
    }

    /// Set a relationship property, returning the previous value
    pub fn set_relationship_property(
        &self,
        id: RelationshipId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        let mut staged = self.open()?;
        Ok(Self::relationship_mut(&self.store, &mut staged, id)?
            .properties
            .insert(key.to_string(), value.into()))
    }

    /// Delete a relationship
    pub fn delete_relationship(&self, id: RelationshipId) -> Result<()> {
        let mut staged = self.open()?;
        Self::relationship_mut(&self.store, &mut staged, id)?;
        if staged.created_relationships.remove(&id) {
            staged.relationships.remove(&id);
        } else {
            staged.relationships.insert(id, None);
        }
        Ok(())
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Create an index of `kind` named `name` (no-op if it exists)
    pub fn index_create(&self, kind: EntityKind, name: &str) -> Result<()> {
        let mut staged = self.open()?;
        staged.index_ops.push(IndexOp::Create {
            kind,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Register `entity` under `(key, value)` in index `name`.
    /// The entity must exist in this transaction's view.
    pub fn index_add(
        &self,
        name: &str,
        entity: impl Into<EntityRef>,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let entity = entity.into();
        let mut staged = self.open()?;
        // Only the index entry is staged; the entity record stays untouched
        Self::ensure_visible(&self.store, &staged, entity)?;
        staged.index_ops.push(IndexOp::Add {
            name: name.to_string(),
            entity,
            key: key.to_string(),
            value: value.into(),
        });
        Ok(())
    }

    fn ensure_visible(store: &StoreInner, staged: &Staged, entity: EntityRef) -> Result<()> {
        let visible = match entity {
            EntityRef::Node(id) => match staged.nodes.get(&id) {
                Some(record) => record.is_some(),
                None => store.state.read().nodes.contains_key(&id),
            },
            EntityRef::Relationship(id) => match staged.relationships.get(&id) {
                Some(record) => record.is_some(),
                None => store.state.read().relationships.contains_key(&id),
            },
        };
        match (visible, entity) {
            (true, _) => Ok(()),
            (false, EntityRef::Node(id)) => Err(Error::NodeNotFound(id)),
            (false, EntityRef::Relationship(id)) => Err(Error::RelationshipNotFound(id)),
        }
    }

    /// Remove every entry of `entity` from index `name`.
    /// Works for entities that no longer exist.
    pub fn index_remove(&self, name: &str, entity: impl Into<EntityRef>) -> Result<()> {
        let entity = entity.into();
        let mut staged = self.open()?;
        trace!(target: "graphtx::index", txn = %self.id, index = name, %entity, "Staged index removal");
        staged.index_ops.push(IndexOp::Remove {
            name: name.to_string(),
            entity,
        });
        Ok(())
    }

    /// Index names of `kind` visible to this transaction, sorted
    pub fn index_names(&self, kind: EntityKind) -> Result<Vec<String>> {
        let staged = self.open()?;
        let mut names: BTreeSet<String> =
            self.store.state.read().indexes(kind).names().into_iter().collect();
        for op in &staged.index_ops {
            if op.kind() == kind && !matches!(op, IndexOp::Remove { .. }) {
                names.insert(op.name().to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Index lookup including this transaction's staged index writes
    pub fn index_get(&self, kind: EntityKind, name: &str, key: &str, value: &Value) -> Result<Vec<EntityRef>> {
        let staged = self.open()?;
        let mut index: NamedIndex = self
            .store
            .state
            .read()
            .indexes(kind)
            .get(name)
            .cloned()
            .unwrap_or_default();
        for op in staged
            .index_ops
            .iter()
            .filter(|op| op.kind() == kind && op.name() == name)
        {
            match op {
                IndexOp::Create { .. } => {}
                IndexOp::Add {
                    entity,
                    key: entry_key,
                    value: entry_value,
                    ..
                } => index.insert(*entity, entry_key, entry_value),
                IndexOp::Remove { entity, .. } => {
                    index.remove_entity(entity);
                }
            }
        }
        Ok(index.get(key, value))
    }

    // ========================================================================
    // Close
    // ========================================================================

    /// Commit or roll back according to the outcome mark
    ///
    /// # Errors
    /// - `TransactionClosed` if already closed
    /// - `DatabaseShutdown` if the store stopped before a commit could apply
    /// - `CommitVetoed` if a `before_commit` observer refused the commit
    pub fn close(&self) -> Result<CloseOutcome> {
        let staged = {
            let mut guard = self.staged.lock();
            if guard.closed {
                return Err(Error::TransactionClosed(self.id));
            }
            let staged = std::mem::take(&mut *guard);
            guard.closed = true;
            staged
        };

        if staged.outcome != Outcome::Success {
            self.discard(&staged);
            return Ok(CloseOutcome::RolledBack);
        }

        if !staged.has_writes() {
            trace!(target: "graphtx::txn", txn = %self.id, "Committed empty transaction");
            return Ok(CloseOutcome::Committed);
        }

        if !self.store.is_available() {
            self.discard(&staged);
            return Err(Error::DatabaseShutdown);
        }

        let data = staged.change_set(self.id);
        let handlers = self.store.transaction_handlers();
        for handler in &handlers {
            if let Err(e) = handler.before_commit(&data) {
                warn!(
                    target: "graphtx::txn",
                    txn = %self.id,
                    handler = handler.name(),
                    error = %e,
                    "Commit vetoed"
                );
                for h in &handlers {
                    h.after_rollback(&data);
                }
                return Err(Error::CommitVetoed {
                    handler: handler.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }

        self.apply(staged);
        debug!(
            target: "graphtx::txn",
            txn = %self.id,
            created = data.created_nodes.len(),
            deleted = data.deleted_nodes.len(),
            index_writes = data.index_writes,
            "Transaction committed"
        );

        for handler in &handlers {
            handler.after_commit(&data);
        }
        Ok(CloseOutcome::Committed)
    }

    fn discard(&self, staged: &Staged) {
        debug!(target: "graphtx::txn", txn = %self.id, outcome = ?staged.outcome, "Transaction rolled back");
        if !staged.has_writes() {
            return;
        }
        let handlers = self.store.transaction_handlers();
        if handlers.is_empty() {
            return;
        }
        let data = staged.change_set(self.id);
        for handler in &handlers {
            handler.after_rollback(&data);
        }
    }

    fn apply(&self, staged: Staged) {
        let mut state = self.store.state.write();
        for (id, record) in staged.nodes {
            match record {
                Some(record) => {
                    state.nodes.insert(id, record);
                }
                None => {
                    state.nodes.remove(&id);
                }
            }
        }
        for (id, record) in staged.relationships {
            match record {
                Some(record) => {
                    state.relationships.insert(id, record);
                }
                None => {
                    state.relationships.remove(&id);
                }
            }
        }
        for op in &staged.index_ops {
            // The entity may have been deleted by a commit since it was added
            if let IndexOp::Add { entity, .. } = op {
                if !state.contains(*entity) {
                    trace!(target: "graphtx::index", txn = %self.id, index = op.name(), %entity, "Skipped entry for a deleted entity");
                    continue;
                }
            }
            state.indexes_mut(op.kind()).apply(op);
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let staged = self.staged.get_mut();
        if staged.closed {
            return;
        }
        trace!(target: "graphtx::txn", txn = %self.id, "Transaction dropped while open");
        staged.outcome = Outcome::Failure;
        if let Err(e) = self.close() {
            warn!(target: "graphtx::txn", txn = %self.id, error = %e, "Rollback on drop did not succeed");
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let staged = self.staged.lock();
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("outcome", &staged.outcome)
            .field("closed", &staged.closed)
            .finish()
    }
}
