//! Deferred index maintenance
//!
//! [`DeferredIndexMaintainer`] watches commits for deleted nodes and
//! relationships and hands their removal from every index to the background
//! worker. The committing transaction never touches an index itself; the
//! indexes catch up once the queued job has run.
//!
//! The job's own commit is a write and comes back through `before_commit`.
//! Notifications raised while the worker is running a patch job are ignored,
//! otherwise every patch would enqueue another one.

use crate::background::BackgroundWorker;
use graphtx_core::{EntityKind, NodeId, RelationshipId, Result};
use graphtx_storage::{TransactionData, TransactionEventHandler};
use std::sync::Arc;
use tracing::{debug, trace};

/// Name of the background job that patches indexes.
pub const PATCH_JOB: &str = "patch-deleted-from-indexes";

/// Commit observer that removes deleted entities from indexes in the
/// background.
pub struct DeferredIndexMaintainer {
    worker: Arc<BackgroundWorker>,
}

impl DeferredIndexMaintainer {
    /// Maintainer submitting its jobs to `worker`.
    pub fn new(worker: Arc<BackgroundWorker>) -> Self {
        Self { worker }
    }
}

impl TransactionEventHandler for DeferredIndexMaintainer {
    fn name(&self) -> &str {
        "deferred-index-maintainer"
    }

    fn before_commit(&self, data: &TransactionData) -> Result<()> {
        if BackgroundWorker::current_job() == Some(PATCH_JOB) {
            trace!(target: "graphtx::index", "Ignoring commit of an index patch job");
            return Ok(());
        }

        // The change set is only valid during this call
        let nodes: Vec<NodeId> = data.deleted_nodes().to_vec();
        let relationships: Vec<RelationshipId> = data.deleted_relationships().to_vec();
        if nodes.is_empty() && relationships.is_empty() {
            return Ok(());
        }

        debug!(
            target: "graphtx::index",
            nodes = nodes.len(),
            relationships = relationships.len(),
            "Queueing index patch for deleted entities"
        );
        self.worker.submit(PATCH_JOB, move |txn| {
            if !nodes.is_empty() {
                for index in txn.index_names(EntityKind::Node)? {
                    for node in &nodes {
                        txn.index_remove(&index, *node)?;
                    }
                }
            }
            if !relationships.is_empty() {
                for index in txn.index_names(EntityKind::Relationship)? {
                    for rel in &relationships {
                        txn.index_remove(&index, *rel)?;
                    }
                }
            }
            Ok(())
        })
    }
}
