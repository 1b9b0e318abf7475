//! Transactional call interception
//!
//! [`TransactionInterceptor`] runs an operation inside a transaction scope.
//! The operation itself knows nothing about transactions; it reaches the
//! ambient transaction through [`ScopeStack::current`] if it needs one.
//!
//! ## Per-call state machine
//!
//! ```text
//! NO_SCOPE ──open──► OUTER_ACTIVE ──nested call──► INNER_JOINED
//!    ▲                    │  ▲                          │
//!    └──commit/rollback───┘  └─────────return───────────┘
//! ```
//!
//! - Not in scope (or joining disabled): begin a transaction, enter it, run
//!   the operation, then mark and close it exactly once.
//! - In scope: push a join frame for the current transaction and run the
//!   operation. A failure the declaration says to roll back sets the sticky
//!   scope flag; the outermost call owns the commit.
//!
//! The caller always sees the operation's own failure, whatever happened to
//! the transaction.

use crate::policy::{RollbackDecision, Transactional};
use crate::scope::ScopeStack;
use graphtx_core::{Classify, Error, Result};
use graphtx_storage::{CloseOutcome, GraphStore, Transaction};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Something that can open transactions
pub trait TransactionSource: Send + Sync {
    /// Begin a new transaction
    fn begin(&self) -> Result<Transaction>;
}

impl TransactionSource for GraphStore {
    fn begin(&self) -> Result<Transaction> {
        self.begin_transaction()
    }
}

/// Runs operations inside transaction scopes
pub struct TransactionInterceptor {
    source: Arc<dyn TransactionSource>,
    scopes: ScopeStack,
    joining: bool,
}

impl TransactionInterceptor {
    /// Interceptor over `source` tracking scopes on `scopes`, in joining mode
    pub fn new(source: Arc<dyn TransactionSource>, scopes: ScopeStack) -> Self {
        Self {
            source,
            scopes,
            joining: true,
        }
    }

    /// Enable or disable joining. With joining disabled every call opens its
    /// own transaction, even when nested.
    pub fn with_joining(mut self, joining: bool) -> Self {
        self.joining = joining;
        self
    }

    /// True if nested calls join the enclosing transaction
    pub fn is_joining(&self) -> bool {
        self.joining
    }

    /// Scope stack used by this interceptor
    pub fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    /// Ambient transaction of the calling thread
    ///
    /// # Errors
    /// `NoActiveScope` outside any intercepted call.
    pub fn current(&self) -> Result<Arc<Transaction>> {
        self.scopes.current()
    }

    /// Run `op` inside a transaction scope declared by `declared`
    ///
    /// # Errors
    /// The operation's own error, or a plumbing error (cannot begin, commit
    /// vetoed, scope imbalance) converted into `E`.
    pub fn invoke<T, E, F>(&self, declared: &Transactional, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Classify + From<Error>,
    {
        if self.joining && self.scopes.in_scope() {
            self.join(declared, op)
        } else {
            self.open(declared, op)
        }
    }

    /// Decorate `op` so every call runs through [`invoke`](Self::invoke)
    pub fn wrap<'a, T, E, F>(
        &'a self,
        declared: Transactional,
        op: F,
    ) -> impl Fn() -> std::result::Result<T, E> + 'a
    where
        F: Fn() -> std::result::Result<T, E> + 'a,
        E: Classify + From<Error>,
    {
        move || self.invoke(&declared, &op)
    }

    fn join<T, E, F>(&self, declared: &Transactional, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Classify + From<Error>,
    {
        let txn = self.scopes.current()?;
        let guard = self.scopes.enter(txn);
        let result = op();

        if let Err(e) = &result {
            let kind = e.failure_kind();
            if declared.decide(kind) == RollbackDecision::Rollback {
                debug!(target: "graphtx::txn", %kind, depth = guard.depth(), "Joined call failed, scope will roll back");
                self.scopes.mark_failed()?;
            }
        }

        guard.release()?;
        result
    }

    fn open<T, E, F>(&self, declared: &Transactional, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: Classify + From<Error>,
    {
        let txn = Arc::new(self.source.begin()?);
        let guard = self.scopes.enter(Arc::clone(&txn));
        let outermost = guard.depth() == 1;

        let result = op();

        let failed = outermost && self.scopes.is_failed();
        let released = guard.release();

        match result {
            Ok(value) => {
                if let Err(e) = released {
                    txn.mark_failure();
                    if let Err(close_err) = txn.close() {
                        warn!(target: "graphtx::txn", txn = %txn.id(), error = %close_err, "Close after scope imbalance did not succeed");
                    }
                    return Err(e.into());
                }
                if failed {
                    txn.mark_failure();
                } else {
                    txn.mark_success();
                }
                match txn.close()? {
                    CloseOutcome::Committed => {
                        debug!(target: "graphtx::txn", txn = %txn.id(), "Transactional call committed")
                    }
                    CloseOutcome::RolledBack => {
                        debug!(target: "graphtx::txn", txn = %txn.id(), "Transactional call rolled back by a nested failure")
                    }
                }
                Ok(value)
            }
            Err(e) => {
                let kind = e.failure_kind();
                let decision = declared.decide(kind);
                if decision == RollbackDecision::Commit && !failed {
                    txn.mark_success();
                } else {
                    txn.mark_failure();
                }
                debug!(target: "graphtx::txn", txn = %txn.id(), %kind, ?decision, "Transactional call failed");

                if let Err(close_err) = txn.close() {
                    warn!(target: "graphtx::txn", txn = %txn.id(), error = %close_err, "Close after failure did not succeed");
                }
                if let Err(scope_err) = released {
                    error!(target: "graphtx::scope", error = %scope_err, "Scope imbalance while propagating a failure");
                }
                Err(e)
            }
        }
    }
}
