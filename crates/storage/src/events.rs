//! Commit and kernel event channels
//!
//! Two observer contracts:
//! - [`TransactionEventHandler`]: called around every commit of a transaction
//!   that wrote something. `before_commit` runs on the committing thread
//!   before the writes become visible and may veto the commit.
//! - [`KernelEventHandler`]: told when the store shuts down or panics.
//!
//! The [`TransactionData`] handed to observers lives only for the duration
//! of the call; observers that need it later must copy what they keep.

use crate::records::NodeRecord;
use graphtx_core::{Label, NodeId, RelationshipId, Result, TxnId, Value};
use std::collections::BTreeMap;

/// A property assignment or removal on a node
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    /// Node the property belongs to
    pub node: NodeId,
    /// Property key
    pub key: String,
    /// Value before the change
    pub previous: Option<Value>,
    /// Value after the change (`None` for removals)
    pub value: Option<Value>,
}

/// A label assignment or removal on a node
#[derive(Debug, Clone, PartialEq)]
pub struct LabelEntry {
    /// Node the label belongs to
    pub node: NodeId,
    /// Label
    pub label: Label,
}

/// Change set of a committing transaction
#[derive(Debug, Clone, Default)]
pub struct TransactionData {
    pub(crate) txn_id: Option<TxnId>,
    pub(crate) created_nodes: Vec<NodeId>,
    pub(crate) deleted_nodes: Vec<NodeId>,
    pub(crate) created_relationships: Vec<RelationshipId>,
    pub(crate) deleted_relationships: Vec<RelationshipId>,
    pub(crate) assigned_node_properties: Vec<PropertyEntry>,
    pub(crate) removed_node_properties: Vec<PropertyEntry>,
    pub(crate) assigned_labels: Vec<LabelEntry>,
    pub(crate) removed_labels: Vec<LabelEntry>,
    pub(crate) index_writes: usize,
    pub(crate) nodes_after: BTreeMap<NodeId, NodeRecord>,
}

impl TransactionData {
    /// Transaction this change set belongs to
    pub fn txn_id(&self) -> Option<TxnId> {
        self.txn_id
    }

    /// Nodes created by the transaction (and still alive at commit)
    pub fn created_nodes(&self) -> &[NodeId] {
        &self.created_nodes
    }

    /// Previously committed nodes deleted by the transaction
    pub fn deleted_nodes(&self) -> &[NodeId] {
        &self.deleted_nodes
    }

    /// Relationships created by the transaction
    pub fn created_relationships(&self) -> &[RelationshipId] {
        &self.created_relationships
    }

    /// Previously committed relationships deleted by the transaction
    pub fn deleted_relationships(&self) -> &[RelationshipId] {
        &self.deleted_relationships
    }

    /// Node property assignments, in write order
    pub fn assigned_node_properties(&self) -> &[PropertyEntry] {
        &self.assigned_node_properties
    }

    /// Node property removals, in write order
    pub fn removed_node_properties(&self) -> &[PropertyEntry] {
        &self.removed_node_properties
    }

    /// Label assignments, in write order
    pub fn assigned_labels(&self) -> &[LabelEntry] {
        &self.assigned_labels
    }

    /// Label removals, in write order
    pub fn removed_labels(&self) -> &[LabelEntry] {
        &self.removed_labels
    }

    /// Number of staged index mutations
    pub fn index_writes(&self) -> usize {
        self.index_writes
    }

    /// State a touched node will have once the commit applies.
    /// `None` for nodes that were not touched or are deleted.
    pub fn node_after(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes_after.get(&id)
    }

    /// True if the transaction changed nothing
    pub fn is_empty(&self) -> bool {
        self.created_nodes.is_empty()
            && self.deleted_nodes.is_empty()
            && self.created_relationships.is_empty()
            && self.deleted_relationships.is_empty()
            && self.assigned_node_properties.is_empty()
            && self.removed_node_properties.is_empty()
            && self.assigned_labels.is_empty()
            && self.removed_labels.is_empty()
            && self.index_writes == 0
            && self.nodes_after.is_empty()
    }
}

/// Observer of transaction commits
pub trait TransactionEventHandler: Send + Sync {
    /// Name used in logs and veto errors
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Called before the writes are applied. An error vetoes the commit and
    /// the transaction rolls back.
    fn before_commit(&self, data: &TransactionData) -> Result<()>;

    /// Called after the writes are visible
    fn after_commit(&self, _data: &TransactionData) {}

    /// Called after a transaction with writes rolled back (including vetoes)
    fn after_rollback(&self, _data: &TransactionData) {}
}

/// Why the store stopped unexpectedly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    /// Description of the fatal condition
    pub reason: String,
}

/// Observer of store lifecycle events
pub trait KernelEventHandler: Send + Sync {
    /// The store is shutting down; no new transactions will begin
    fn before_shutdown(&self);

    /// The store hit a fatal error and stopped
    fn kernel_panic(&self, error: &ErrorState);
}
