//! graphtx - transaction scoping and deferred commit events for an embedded
//! graph store
//!
//! # Quick Start
//!
//! ```no_run
//! use graphtx::{Database, EngineConfig, Label};
//!
//! let db = Database::open(EngineConfig::default())?;
//!
//! let neo = db.transaction(|txn| {
//!     let id = txn.create_node(&[Label::new("Crew")])?;
//!     txn.set_node_property(id, "name", "Neo")?;
//!     Ok(id)
//! })?;
//!
//! db.transaction(|txn| txn.delete_node(neo))?;
//! db.shutdown()?;
//! # Ok::<(), graphtx::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `graphtx-core`: identifiers, values, the failure taxonomy, errors
//! - `graphtx-storage`: the graph store, transactions, commit observers
//! - `graphtx-concurrency`: scope stack, rollback policy, interceptor
//! - `graphtx-engine`: background worker, index maintenance, the database

pub use graphtx_concurrency::{
    RollbackDecision, RollbackPolicy, RollbackSpec, ScopeGuard, ScopeStack, TransactionInterceptor,
    TransactionSource, Transactional,
};
pub use graphtx_core::{
    Classify, EntityKind, EntityRef, Error, Failure, FailureKind, Label, Lineage, NodeId,
    RelationshipId, Result, TxnId, Value,
};
pub use graphtx_engine::{
    BackgroundWorker, Database, DeferredIndexMaintainer, EngineConfig, FulltextIndexConsumer,
    LabelChangeConsumer, NodeByLabelHandler, WorkerStats, CONFIG_FILE_NAME,
    DEFAULT_WORKER_THREAD_NAME, FULLTEXT_JOB, PATCH_JOB,
};
pub use graphtx_storage::{
    CloseOutcome, ErrorState, GraphStore, IndexOp, KernelEventHandler, LabelEntry, NodeRecord,
    Outcome, PropertyEntry, RelationshipRecord, Transaction, TransactionData,
    TransactionEventHandler,
};
