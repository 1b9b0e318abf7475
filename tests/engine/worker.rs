//! Background worker ordering and liveness through the database.

use crate::common::*;
use graphtx::{BackgroundWorker, WorkerStats};
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};

#[test]
fn concurrent_producers_keep_per_thread_order() {
    let db = open_db();
    let log: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let start = Arc::new(Barrier::new(10));

    let producers: Vec<_> = (0..10)
        .map(|thread| {
            let db = Arc::clone(&db);
            let log = Arc::clone(&log);
            let start = Arc::clone(&start);
            std::thread::spawn(move || {
                start.wait();
                for seq in 0..10 {
                    let log = Arc::clone(&log);
                    db.worker()
                        .submit("record", move |_txn| {
                            log.lock().push((thread, seq));
                            Ok(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    db.worker().drain_and_wait().unwrap();
    let stats = db.worker().stats();
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.completed, 100);

    let log = log.lock();
    assert_eq!(log.len(), 100);
    for thread in 0..10 {
        let seen: Vec<usize> = log
            .iter()
            .filter(|(t, _)| *t == thread)
            .map(|(_, seq)| *seq)
            .collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>(), "thread {}", thread);
    }
}

#[test]
fn failing_job_does_not_stop_the_worker() {
    let db = open_db();
    db.worker()
        .submit("broken", |_txn| Err(Error::InvalidOperation("broken job".into())))
        .unwrap();
    db.worker()
        .submit("create", |txn| {
            txn.create_node(&[])?;
            Ok(())
        })
        .unwrap();

    db.worker().drain_and_wait().unwrap();
    let stats = db.worker().stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(db.store().node_count(), 1);
}

#[test]
fn failed_job_rolls_back_its_writes() {
    let db = open_db();
    db.worker()
        .submit("half-done", |txn| {
            txn.create_node(&[])?;
            Err(Error::InvalidOperation("gave up".into()))
        })
        .unwrap();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(db.store().node_count(), 0);
}

#[test]
fn panicking_job_does_not_stop_the_worker() {
    let db = open_db();
    db.worker()
        .submit("panics", |_txn| panic!("job blew up"))
        .unwrap();
    db.worker().submit("after", |_txn| Ok(())).unwrap();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(db.worker().stats().failed, 1);
    assert_eq!(db.worker().stats().completed, 1);
}

#[test]
fn jobs_see_their_own_name() {
    let db = open_db();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    db.worker()
        .submit("named-job", move |_txn| {
            *sink.lock() = BackgroundWorker::current_job();
            Ok(())
        })
        .unwrap();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(*seen.lock(), Some("named-job"));
    assert_eq!(BackgroundWorker::current_job(), None);
}

#[test]
fn worker_thread_uses_configured_name() {
    let db = Database::open(EngineConfig {
        worker_thread_name: "graphtx-custom-worker".into(),
        ..EngineConfig::default()
    })
    .unwrap();
    let name = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&name);
    db.worker()
        .submit("name", move |_txn| {
            *sink.lock() = std::thread::current().name().unwrap_or_default().to_string();
            Ok(())
        })
        .unwrap();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(*name.lock(), "graphtx-custom-worker");
    assert_eq!(db.worker().thread_name(), "graphtx-custom-worker");
}

#[test]
fn idle_worker_reports_empty_stats() {
    let db = open_db();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(db.worker().stats(), WorkerStats::default());
}
