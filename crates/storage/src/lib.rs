//! In-memory graph storage for graphtx
//!
//! This crate provides the transactional collaborator the scoping and
//! deferred-work layers sit on:
//! - `GraphStore`: committed nodes, relationships and named indexes behind
//!   a single `RwLock`
//! - `Transaction`: private write overlay with success/failure marking and
//!   an explicit `close()`
//! - Commit observers (`TransactionEventHandler`) that see the change set
//!   before it applies and may veto it
//! - Lifecycle observers (`KernelEventHandler`) for shutdown and panic

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod index;
pub mod records;
pub mod store;
pub mod transaction;

pub use events::{
    ErrorState, KernelEventHandler, LabelEntry, PropertyEntry, TransactionData,
    TransactionEventHandler,
};
pub use index::{IndexOp, IndexSet, NamedIndex};
pub use records::{NodeRecord, RelationshipRecord};
pub use store::GraphStore;
pub use transaction::{CloseOutcome, Outcome, Transaction};
