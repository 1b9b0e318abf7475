//! Background worker for deferred commit work.
//!
//! A single named thread executes submitted jobs in strict FIFO order, each
//! inside its own transaction. Producers only block for the queue lock.
//!
//! A failing or panicking job is logged and counted; the worker moves on to
//! the next one. `shutdown()` is cooperative: the job in flight finishes, and
//! jobs still queued at that moment are dropped (callers that need them must
//! `drain_and_wait()` first).

use graphtx_concurrency::TransactionSource;
use graphtx_core::{Error, Result};
use graphtx_storage::{ErrorState, KernelEventHandler, Transaction};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, error, info, trace, warn};

thread_local! {
    /// Name of the job the current thread is running, if any
    static CURRENT_JOB: Cell<Option<&'static str>> = const { Cell::new(None) };
}

type Job = Box<dyn FnOnce(&Transaction) -> Result<()> + Send>;

struct JobEnvelope {
    name: &'static str,
    sequence: u64,
    work: Job,
}

/// Worker metrics snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs waiting in the queue.
    pub queue_depth: usize,
    /// Jobs currently executing (0 or 1).
    pub in_flight: usize,
    /// Jobs that ran and committed.
    pub completed: u64,
    /// Jobs that returned an error, panicked, or failed to commit.
    pub failed: u64,
    /// Jobs dropped from the queue by shutdown.
    pub abandoned: u64,
}

struct WorkerInner {
    queue: Mutex<VecDeque<JobEnvelope>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    sequence: AtomicU64,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    thread_id: OnceCell<ThreadId>,
    source: Arc<dyn TransactionSource>,
}

impl WorkerInner {
    fn on_worker_thread(&self) -> bool {
        self.thread_id.get() == Some(&std::thread::current().id())
    }
}

/// Single-consumer FIFO job queue with a dedicated thread.
pub struct BackgroundWorker {
    inner: Arc<WorkerInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_name: String,
}

impl BackgroundWorker {
    /// Spawn the worker thread. Jobs open their transactions on `source`.
    ///
    /// # Errors
    ///
    /// Returns `Error::IoError` if the thread cannot be spawned.
    pub fn new(source: Arc<dyn TransactionSource>, thread_name: impl Into<String>) -> Result<Self> {
        let thread_name = thread_name.into();
        let inner = Arc::new(WorkerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            thread_id: OnceCell::new(),
            source,
        });

        let inner_clone = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&inner_clone))?;
        let _ = inner.thread_id.set(handle.thread().id());
        debug!(target: "graphtx::worker", thread = %thread_name, "Background worker started");

        Ok(Self {
            inner,
            handle: Mutex::new(Some(handle)),
            thread_name,
        })
    }

    /// Name of the job the calling thread is executing.
    ///
    /// `Some` only on the worker thread, for the whole run and commit of a
    /// job. Commit observers use it to recognise writes made by their own
    /// jobs.
    pub fn current_job() -> Option<&'static str> {
        CURRENT_JOB.with(|job| job.get())
    }

    /// Append a job to the queue.
    ///
    /// # Errors
    ///
    /// Returns `Error::WorkerStopped` after shutdown.
    pub fn submit<F>(&self, name: &'static str, job: F) -> Result<()>
    where
        F: FnOnce(&Transaction) -> Result<()> + Send + 'static,
    {
        let depth = {
            let mut queue = self.inner.queue.lock();
            // Checked under the lock so no job lands behind a worker that
            // already exited
            if self.inner.shutdown.load(Ordering::Acquire) {
                return Err(Error::WorkerStopped);
            }
            let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
            queue.push_back(JobEnvelope {
                name,
                sequence,
                work: Box::new(job),
            });
            queue.len()
        };
        self.inner.work_ready.notify_one();
        trace!(target: "graphtx::worker", job = name, depth, "Job queued");
        Ok(())
    }

    /// Block until the queue is empty and no job is in flight.
    ///
    /// Returns immediately once the worker is shut down.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOperation` when called from the worker thread,
    /// which could never observe its own job finishing.
    pub fn drain_and_wait(&self) -> Result<()> {
        if self.inner.on_worker_thread() {
            return Err(Error::InvalidOperation(
                "drain_and_wait called from the background worker thread".to_string(),
            ));
        }
        let mut queue = self.inner.queue.lock();
        while !self.inner.shutdown.load(Ordering::Acquire)
            && (!queue.is_empty() || self.inner.in_flight.load(Ordering::Acquire) > 0)
        {
            self.inner.drain_cond.wait(&mut queue);
        }
        Ok(())
    }

    /// Stop the worker: the job in flight finishes, queued jobs are dropped.
    ///
    /// Joins the thread unless called from it. Idempotent.
    pub fn shutdown(&self) {
        // Flag and notify under the lock to prevent lost wake-ups
        {
            let _queue = self.inner.queue.lock();
            if !self.inner.shutdown.swap(true, Ordering::AcqRel) {
                info!(target: "graphtx::worker", thread = %self.thread_name, "Background worker shutting down");
            }
            self.inner.work_ready.notify_all();
            self.inner.drain_cond.notify_all();
        }

        if self.inner.on_worker_thread() {
            return;
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(target: "graphtx::worker", "Background worker thread panicked");
            }
        }
    }

    /// True once `shutdown()` was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Name of the worker thread.
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Return a snapshot of worker metrics.
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            queue_depth: self.inner.queue.lock().len(),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            abandoned: self.inner.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("thread_name", &self.thread_name)
            .field("shutdown", &self.is_shutdown())
            .field("stats", &self.stats())
            .finish()
    }
}

impl KernelEventHandler for BackgroundWorker {
    fn before_shutdown(&self) {
        self.shutdown();
    }

    fn kernel_panic(&self, error: &ErrorState) {
        warn!(target: "graphtx::worker", reason = %error.reason, "Stopping background worker after kernel panic");
        self.shutdown();
    }
}

/// RAII guard that clears the in-flight marker and notifies drain waiters on
/// drop, so a panicking job cannot leave `drain_and_wait()` hanging.
struct InFlightGuard<'a> {
    inner: &'a WorkerInner,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::Release);
        // Lock before notifying: drain_and_wait() checks and waits under it
        let _queue = self.inner.queue.lock();
        self.inner.drain_cond.notify_all();
    }
}

/// Resets the current-job marker even if the job unwinds.
struct CurrentJobGuard;

impl CurrentJobGuard {
    fn enter(name: &'static str) -> Self {
        CURRENT_JOB.with(|job| job.set(Some(name)));
        CurrentJobGuard
    }
}

impl Drop for CurrentJobGuard {
    fn drop(&mut self) {
        CURRENT_JOB.with(|job| job.set(None));
    }
}

fn worker_loop(inner: &WorkerInner) {
    let _ = inner.thread_id.set(std::thread::current().id());
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if inner.shutdown.load(Ordering::Acquire) {
                    let dropped = queue.len();
                    if dropped > 0 {
                        queue.clear();
                        inner.abandoned.fetch_add(dropped as u64, Ordering::Relaxed);
                        warn!(target: "graphtx::worker", dropped, "Queued jobs dropped by shutdown");
                    }
                    inner.drain_cond.notify_all();
                    return;
                }
                if let Some(job) = queue.pop_front() {
                    inner.in_flight.fetch_add(1, Ordering::Release);
                    break job;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = InFlightGuard { inner };
        run_job(inner, job);
    }
}

fn run_job(inner: &WorkerInner, job: JobEnvelope) {
    let JobEnvelope {
        name,
        sequence,
        work,
    } = job;

    let outcome = {
        let _current = CurrentJobGuard::enter(name);
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| execute(inner, work)))
    };

    match outcome {
        Ok(Ok(())) => {
            inner.completed.fetch_add(1, Ordering::Relaxed);
            trace!(target: "graphtx::worker", job = name, sequence, "Job completed");
        }
        Ok(Err(e)) => {
            inner.failed.fetch_add(1, Ordering::Relaxed);
            let failure = Error::JobFailure {
                job: name.to_string(),
                reason: e.to_string(),
            };
            error!(target: "graphtx::worker", sequence, error = %failure, "Background job failed");
        }
        Err(panic) => {
            inner.failed.fetch_add(1, Ordering::Relaxed);
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            error!(target: "graphtx::worker", job = name, sequence, %reason, "Background job panicked");
        }
    }
}

fn execute(inner: &WorkerInner, work: Job) -> Result<()> {
    let txn = inner.source.begin()?;
    if let Err(e) = work(&txn) {
        txn.mark_failure();
        if let Err(close_err) = txn.close() {
            warn!(target: "graphtx::worker", txn = %txn.id(), error = %close_err, "Rollback of failed job did not succeed");
        }
        return Err(e);
    }
    txn.mark_success();
    txn.close()?;
    Ok(())
}
