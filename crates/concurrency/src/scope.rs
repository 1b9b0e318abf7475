//! Thread-confined transaction scopes
//!
//! A [`ScopeStack`] tracks, per thread, the transactions that call chains are
//! currently running inside. The first frame on a thread is pushed by the
//! call that opened the transaction; nested calls that join push further
//! frames referencing the same transaction. Frames pop in strict LIFO order
//! through the [`ScopeGuard`] returned by `enter`.
//!
//! # Per-thread state
//!
//! State lives in a thread-local map keyed by the stack's id, so several
//! independent stacks (one per database) can coexist on the same thread. A
//! thread's entry is removed when its outermost frame pops, so a pooled
//! thread picks up nothing from earlier work.
//!
//! # Sticky failure flag
//!
//! `mark_failed()` flags the whole scope. The flag starts cleared when the
//! outermost frame is pushed and lives until that frame pops; the opening
//! call reads it to force a rollback.

use graphtx_core::{Error, Result};
use graphtx_storage::Transaction;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

static NEXT_STACK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Scope state of the current thread, per stack id
    static SCOPES: RefCell<HashMap<u64, ScopeState>> = RefCell::new(HashMap::new());
}

struct ScopeFrame {
    txn: Arc<Transaction>,
    depth: usize,
}

#[derive(Default)]
struct ScopeState {
    frames: Vec<ScopeFrame>,
    failed: bool,
}

/// Per-thread stack of active transaction scopes
///
/// Clones share the same per-thread stacks.
#[derive(Clone)]
pub struct ScopeStack {
    id: u64,
}

impl ScopeStack {
    /// Create a stack with its own per-thread state
    pub fn new() -> Self {
        Self {
            id: NEXT_STACK_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Push a frame referencing `txn`
    ///
    /// The frame is popped when the returned guard is released or dropped.
    pub fn enter(&self, txn: Arc<Transaction>) -> ScopeGuard<'_> {
        let txn_id = txn.id();
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let state = scopes.entry(self.id).or_default();
            if state.frames.is_empty() {
                state.failed = false;
            }
            let depth = state.frames.len() + 1;
            state.frames.push(ScopeFrame { txn, depth });
            depth
        });
        trace!(target: "graphtx::scope", txn = %txn_id, depth, "Entered scope");
        ScopeGuard {
            stack: self,
            depth,
            released: false,
            _thread: PhantomData,
        }
    }

    /// Number of active frames on this thread, `None` outside any scope
    pub fn current_depth(&self) -> Option<usize> {
        SCOPES.with(|scopes| scopes.borrow().get(&self.id).map(|state| state.frames.len()))
    }

    /// True if this thread is inside a scope
    pub fn in_scope(&self) -> bool {
        self.current_depth().is_some()
    }

    /// Transaction of the innermost frame
    ///
    /// # Errors
    /// `NoActiveScope` outside any scope.
    pub fn current(&self) -> Result<Arc<Transaction>> {
        SCOPES.with(|scopes| {
            scopes
                .borrow()
                .get(&self.id)
                .and_then(|state| state.frames.last())
                .map(|frame| Arc::clone(&frame.txn))
                .ok_or(Error::NoActiveScope)
        })
    }

    /// Flag the whole scope as failed; the outermost call will roll back
    ///
    /// # Errors
    /// `NoActiveScope` outside any scope.
    pub fn mark_failed(&self) -> Result<()> {
        SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let state = scopes.get_mut(&self.id).ok_or(Error::NoActiveScope)?;
            if !state.failed {
                trace!(target: "graphtx::scope", depth = state.frames.len(), "Scope marked failed");
            }
            state.failed = true;
            Ok(())
        })
    }

    /// Sticky failure flag of this thread's scope (`false` outside any scope)
    pub fn is_failed(&self) -> bool {
        SCOPES.with(|scopes| {
            scopes
                .borrow()
                .get(&self.id)
                .map(|state| state.failed)
                .unwrap_or(false)
        })
    }

    fn pop(&self, depth: usize) -> Result<()> {
        let popped = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let state = scopes.get_mut(&self.id).ok_or_else(|| {
                Error::ScopeImbalance(format!("exit of depth {} with no active scope", depth))
            })?;
            match state.frames.last() {
                Some(top) if top.depth == depth => {}
                Some(top) => {
                    return Err(Error::ScopeImbalance(format!(
                        "exit of depth {} while depth {} is innermost",
                        depth, top.depth
                    )));
                }
                None => {
                    return Err(Error::ScopeImbalance(format!(
                        "exit of depth {} from an empty stack",
                        depth
                    )));
                }
            }
            let frame = state.frames.pop();
            if state.frames.is_empty() {
                scopes.remove(&self.id);
            }
            Ok(frame)
        })?;
        // Released outside the borrow: the last reference may close the
        // transaction and run commit observers.
        drop(popped);
        trace!(target: "graphtx::scope", depth, "Exited scope");
        Ok(())
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeStack")
            .field("id", &self.id)
            .field("current_depth", &self.current_depth())
            .finish()
    }
}

/// Frame handle returned by [`ScopeStack::enter`]
///
/// Pops exactly the frame it pushed. Dropping a guard whose frame is not the
/// innermost one is an imbalance and panics.
#[must_use = "dropping the guard pops the scope immediately"]
pub struct ScopeGuard<'a> {
    stack: &'a ScopeStack,
    depth: usize,
    released: bool,
    // Frames never migrate threads
    _thread: PhantomData<*const ()>,
}

impl ScopeGuard<'_> {
    /// Depth of the frame this guard owns (1 for the outermost)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Pop the frame now
    ///
    /// # Errors
    /// `ScopeImbalance` if the frame is not the innermost one.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.stack.pop(self.depth)
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.stack.pop(self.depth) {
            if std::thread::panicking() {
                error!(target: "graphtx::scope", error = %e, "Scope imbalance during unwind");
            } else {
                panic!("{}", e);
            }
        }
    }
}

impl fmt::Debug for ScopeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard").field("depth", &self.depth).finish()
    }
}
