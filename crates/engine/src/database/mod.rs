//! Database struct and open/shutdown logic
//!
//! This module provides the main Database struct that wires together:
//! - The graph store
//! - The scope stack and transaction interceptor
//! - The background worker, bound to the store's lifecycle
//! - The deferred index maintainer (when enabled)
//!
//! ## Transaction API
//!
//! 1. **Closure API**: `db.transaction(|txn| { ... })`
//!    - Commit on success, rollback on error
//!    - Nested calls join the enclosing transaction
//!
//! 2. **Declared API**: `db.invoke(&Transactional::new().no_rollback_for([..]), || { ... })`
//!    - Per-operation rollback declaration
//!    - The operation reaches the ambient transaction through
//!      `db.current_transaction()`

pub mod config;

pub use config::{EngineConfig, CONFIG_FILE_NAME, DEFAULT_WORKER_THREAD_NAME};

use crate::background::BackgroundWorker;
use crate::label::NodeByLabelHandler;
use crate::maintainer::DeferredIndexMaintainer;
use graphtx_concurrency::{ScopeStack, TransactionInterceptor, TransactionSource, Transactional};
use graphtx_core::{Classify, Error, Label, Result};
use graphtx_storage::{GraphStore, KernelEventHandler, Transaction, TransactionEventHandler};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An open graph database with transaction scoping and deferred commit work.
pub struct Database {
    store: GraphStore,
    worker: Arc<BackgroundWorker>,
    interceptor: TransactionInterceptor,
    config: EngineConfig,
    kernel_handler: Arc<dyn KernelEventHandler>,
    handlers: Mutex<Vec<Arc<dyn TransactionEventHandler>>>,
    open: AtomicBool,
}

impl Database {
    /// Open an in-memory database with `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the worker thread cannot
    /// be spawned.
    pub fn open(config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let store = GraphStore::new();
        let source: Arc<dyn TransactionSource> = Arc::new(store.clone());
        let worker = Arc::new(BackgroundWorker::new(
            Arc::clone(&source),
            config.worker_thread_name.clone(),
        )?);

        let kernel_handler: Arc<dyn KernelEventHandler> = worker.clone();
        store.register_kernel_event_handler(Arc::clone(&kernel_handler));

        let mut handlers: Vec<Arc<dyn TransactionEventHandler>> = Vec::new();
        if config.patch_deleted_from_indexes {
            let maintainer: Arc<dyn TransactionEventHandler> =
                Arc::new(DeferredIndexMaintainer::new(Arc::clone(&worker)));
            store.register_transaction_event_handler(Arc::clone(&maintainer));
            handlers.push(maintainer);
        }

        let interceptor =
            TransactionInterceptor::new(source, ScopeStack::new()).with_joining(config.joining);

        info!(
            target: "graphtx::db",
            joining = config.joining,
            patch_deleted_from_indexes = config.patch_deleted_from_indexes,
            worker = %config.worker_thread_name,
            "Database opened"
        );

        Ok(Arc::new(Self {
            store,
            worker,
            interceptor,
            config,
            kernel_handler,
            handlers: Mutex::new(handlers),
            open: AtomicBool::new(true),
        }))
    }

    /// Open with the config file at `path`, writing the default file first
    /// if it does not exist.
    pub fn open_with_config_file(path: &Path) -> Result<Arc<Self>> {
        EngineConfig::write_default_if_missing(path)?;
        Self::open(EngineConfig::from_file(path)?)
    }

    /// The underlying graph store.
    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// The background worker.
    pub fn worker(&self) -> &Arc<BackgroundWorker> {
        &self.worker
    }

    /// The scope stack used by this database's interceptor.
    pub fn scopes(&self) -> &ScopeStack {
        self.interceptor.scopes()
    }

    /// The transaction interceptor.
    pub fn interceptor(&self) -> &TransactionInterceptor {
        &self.interceptor
    }

    /// Configuration this database was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True until `shutdown()`.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && self.store.is_available()
    }

    /// Ambient transaction of the calling thread.
    ///
    /// # Errors
    ///
    /// `Error::NoActiveScope` outside any transactional call.
    pub fn current_transaction(&self) -> Result<Arc<Transaction>> {
        self.interceptor.current()
    }

    /// Run `op` as a transactional operation declared by `declared`.
    pub fn invoke<T, E, F>(&self, declared: &Transactional, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Classify + From<Error>,
    {
        self.interceptor.invoke(declared, op)
    }

    /// Run `f` against the ambient transaction, opening one if needed.
    ///
    /// Every failure rolls back.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        self.interceptor.invoke(&Transactional::new(), || {
            let txn = self.interceptor.current()?;
            f(&txn)
        })
    }

    /// Register a commit observer for the lifetime of this database.
    pub fn register_transaction_event_handler(&self, handler: Arc<dyn TransactionEventHandler>) {
        self.store
            .register_transaction_event_handler(Arc::clone(&handler));
        self.handlers.lock().push(handler);
    }

    /// Maintain fulltext index `index_name` over the `properties` of every
    /// node labelled `label`.
    pub fn register_fulltext_index<I, S>(
        &self,
        label: Label,
        index_name: &str,
        key: &str,
        properties: I,
    ) -> Arc<NodeByLabelHandler>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let handler = Arc::new(NodeByLabelHandler::fulltext(
            Arc::clone(&self.worker),
            label,
            index_name,
            key,
            properties,
        ));
        debug!(target: "graphtx::db", label = %handler.label(), index = index_name, "Registered fulltext index");
        self.register_transaction_event_handler(handler.clone());
        handler
    }

    /// Shut the database down.
    ///
    /// With `drain_on_shutdown`, queued background jobs run first; otherwise
    /// they are dropped. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the drain error when draining was requested from the worker
    /// thread. The database is shut down either way.
    pub fn shutdown(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // A drain failure is reported after the rest of the teardown
        let drained = if self.config.drain_on_shutdown {
            self.worker.drain_and_wait()
        } else {
            Ok(())
        };

        // Stops the worker through its kernel handler
        self.store.shutdown();
        self.worker.shutdown();

        for handler in self.handlers.lock().drain(..) {
            self.store.unregister_transaction_event_handler(&handler);
        }
        self.store
            .unregister_kernel_event_handler(&self.kernel_handler);

        let stats = self.worker.stats();
        if stats.abandoned > 0 {
            warn!(target: "graphtx::db", abandoned = stats.abandoned, "Background jobs dropped at shutdown");
        }
        info!(target: "graphtx::db", completed = stats.completed, failed = stats.failed, "Database shut down");
        drained
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(target: "graphtx::db", error = %e, "Shutdown on drop failed");
        }
    }
}
