//! Database engine for graphtx
//!
//! This crate orchestrates the lower layers:
//! - Database: open/shutdown, transaction entry points, configuration
//! - BackgroundWorker: single-thread FIFO job executor bound to the store
//! - DeferredIndexMaintainer: removes deleted entities from indexes after commit
//! - NodeByLabelHandler: label-scoped change sets and fulltext index upkeep

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod database;
pub mod label;
pub mod maintainer;

pub use background::{BackgroundWorker, WorkerStats};
pub use database::{Database, EngineConfig, CONFIG_FILE_NAME, DEFAULT_WORKER_THREAD_NAME};
pub use label::{FulltextIndexConsumer, LabelChangeConsumer, NodeByLabelHandler, FULLTEXT_JOB};
pub use maintainer::{DeferredIndexMaintainer, PATCH_JOB};
