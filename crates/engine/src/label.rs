//! Label-scoped change tracking
//!
//! [`NodeByLabelHandler`] narrows every commit down to the nodes carrying one
//! label and reports them to a [`LabelChangeConsumer`]:
//!
//! - deleted: nodes deleted outright, plus nodes that lost the label
//! - updated: nodes created, nodes with property changes, and nodes that
//!   gained the label, as long as they carry the label after the commit
//!
//! [`FulltextIndexConsumer`] keeps a node index in step with a set of
//! property values of those nodes, through the background worker.

use crate::background::BackgroundWorker;
use graphtx_core::{Label, NodeId, Result, Value};
use graphtx_storage::{NodeRecord, TransactionData, TransactionEventHandler};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name of the background job that rewrites fulltext entries.
pub const FULLTEXT_JOB: &str = "fulltext-index-update";

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Handlers currently inside `before_commit` on this thread
    static ACTIVE_HANDLERS: RefCell<HashSet<u64>> = RefCell::new(HashSet::new());
}

/// Receives the label-scoped change set of a commit.
pub trait LabelChangeConsumer: Send + Sync {
    /// `updated` holds after-images in id order; `deleted` holds ids in
    /// id order. At least one of them is non-empty.
    fn on_change(&self, updated: &[NodeRecord], deleted: &[NodeId]) -> Result<()>;
}

impl<F> LabelChangeConsumer for F
where
    F: Fn(&[NodeRecord], &[NodeId]) -> Result<()> + Send + Sync,
{
    fn on_change(&self, updated: &[NodeRecord], deleted: &[NodeId]) -> Result<()> {
        self(updated, deleted)
    }
}

/// Commit observer reporting changes to nodes of one label.
pub struct NodeByLabelHandler {
    id: u64,
    label: Label,
    consumer: Arc<dyn LabelChangeConsumer>,
}

impl NodeByLabelHandler {
    /// Handler for `label` reporting to `consumer`.
    pub fn new(label: Label, consumer: Arc<dyn LabelChangeConsumer>) -> Self {
        Self {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            label,
            consumer,
        }
    }

    /// Handler maintaining fulltext index `index_name` for `label`.
    pub fn fulltext<I, S>(
        worker: Arc<BackgroundWorker>,
        label: Label,
        index_name: impl Into<String>,
        key: impl Into<String>,
        properties: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let consumer = FulltextIndexConsumer::new(worker, index_name, key, properties);
        Self::new(label, Arc::new(consumer))
    }

    /// Label this handler tracks.
    pub fn label(&self) -> &Label {
        &self.label
    }

    fn changes(&self, data: &TransactionData) -> (Vec<NodeRecord>, Vec<NodeId>) {
        let mut deleted: BTreeSet<NodeId> = data.deleted_nodes().iter().copied().collect();
        deleted.extend(
            data.removed_labels()
                .iter()
                .filter(|entry| entry.label == self.label)
                .map(|entry| entry.node),
        );

        let mut candidates: BTreeSet<NodeId> = data.created_nodes().iter().copied().collect();
        candidates.extend(data.assigned_node_properties().iter().map(|entry| entry.node));
        candidates.extend(data.removed_node_properties().iter().map(|entry| entry.node));
        candidates.extend(
            data.assigned_labels()
                .iter()
                .filter(|entry| entry.label == self.label)
                .map(|entry| entry.node),
        );

        let updated = candidates
            .into_iter()
            .filter_map(|id| data.node_after(id))
            .filter(|node| node.has_label(&self.label))
            .cloned()
            .collect();
        (updated, deleted.into_iter().collect())
    }
}

/// Clears this handler's active mark on drop.
struct ActiveMark(u64);

impl ActiveMark {
    /// `None` if the handler is already active on this thread.
    fn enter(id: u64) -> Option<Self> {
        ACTIVE_HANDLERS
            .with(|active| active.borrow_mut().insert(id))
            .then(|| ActiveMark(id))
    }
}

impl Drop for ActiveMark {
    fn drop(&mut self) {
        ACTIVE_HANDLERS.with(|active| {
            active.borrow_mut().remove(&self.0);
        });
    }
}

impl TransactionEventHandler for NodeByLabelHandler {
    fn name(&self) -> &str {
        "node-by-label"
    }

    fn before_commit(&self, data: &TransactionData) -> Result<()> {
        let Some(_mark) = ActiveMark::enter(self.id) else {
            trace!(target: "graphtx::index", label = %self.label, "Ignoring nested commit notification");
            return Ok(());
        };

        let (updated, deleted) = self.changes(data);
        if updated.is_empty() && deleted.is_empty() {
            return Ok(());
        }
        debug!(
            target: "graphtx::index",
            label = %self.label,
            updated = updated.len(),
            deleted = deleted.len(),
            "Label change set"
        );
        self.consumer.on_change(&updated, &deleted)
    }
}

/// Rewrites one node index from a fixed list of properties.
///
/// For every reported node the job removes all of its entries and adds one
/// `(key, value)` entry per configured property the node has. Deleted nodes
/// are only removed.
pub struct FulltextIndexConsumer {
    worker: Arc<BackgroundWorker>,
    index_name: String,
    key: String,
    properties: Vec<String>,
}

impl FulltextIndexConsumer {
    /// Consumer writing `(key, value)` entries to `index_name`.
    pub fn new<I, S>(
        worker: Arc<BackgroundWorker>,
        index_name: impl Into<String>,
        key: impl Into<String>,
        properties: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            worker,
            index_name: index_name.into(),
            key: key.into(),
            properties: properties.into_iter().map(Into::into).collect(),
        }
    }

    /// Index this consumer maintains.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn values_of(&self, node: &NodeRecord) -> Vec<Value> {
        self.properties
            .iter()
            .filter_map(|name| node.property(name))
            .filter(|value| !value.is_null())
            .cloned()
            .collect()
    }
}

impl LabelChangeConsumer for FulltextIndexConsumer {
    fn on_change(&self, updated: &[NodeRecord], deleted: &[NodeId]) -> Result<()> {
        let mut entries: BTreeMap<NodeId, Vec<Value>> = updated
            .iter()
            .map(|node| (node.id, self.values_of(node)))
            .collect();
        for id in deleted {
            entries.insert(*id, Vec::new());
        }

        let index_name = self.index_name.clone();
        let key = self.key.clone();
        self.worker.submit(FULLTEXT_JOB, move |txn| {
            for (node, values) in entries {
                txn.index_remove(&index_name, node)?;
                // The node may be gone by the time the job runs
                if values.is_empty() || txn.get_node(node).is_err() {
                    continue;
                }
                for value in values {
                    txn.index_add(&index_name, node, &key, value)?;
                }
            }
            Ok(())
        })
    }
}
