//! Open, shutdown and kernel events.

use crate::common::*;
use std::sync::Arc;

#[test]
fn store_shutdown_stops_the_worker() {
    let db = open_db();
    db.store().shutdown();
    wait_until(|| db.worker().is_shutdown());
    assert!(matches!(
        db.worker().submit("late", |_txn| Ok(())),
        Err(Error::WorkerStopped)
    ));
    assert!(!db.is_open());
}

#[test]
fn kernel_panic_stops_the_worker() {
    let db = open_db();
    db.store().panic("disk on fire");
    assert!(db.worker().is_shutdown());
    assert!(matches!(db.store().begin_transaction(), Err(Error::DatabaseShutdown)));
    assert!(matches!(
        db.transaction(|txn| txn.create_node(&[])),
        Err(Error::DatabaseShutdown)
    ));
}

#[test]
fn shutdown_drops_queued_jobs_by_default() {
    let db = open_db();
    let started = Arc::new(std::sync::Barrier::new(2));
    let gate = Arc::new(std::sync::Barrier::new(2));
    let (running, release) = (Arc::clone(&started), Arc::clone(&gate));
    db.worker()
        .submit("gate", move |_txn| {
            running.wait();
            release.wait();
            Ok(())
        })
        .unwrap();
    for _ in 0..3 {
        db.worker()
            .submit("queued", |txn| {
                txn.create_node(&[])?;
                Ok(())
            })
            .unwrap();
    }

    // The gate job is in flight, the rest are queued behind it
    started.wait();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        gate.wait();
    });
    db.shutdown().unwrap();
    releaser.join().unwrap();

    let stats = db.worker().stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.abandoned, 3);
    assert_eq!(db.store().node_count(), 0);
}

#[test]
fn shutdown_is_idempotent_and_drop_safe() {
    let db = open_db();
    create_named(&db, &[], "Dozer");
    db.shutdown().unwrap();
    db.shutdown().unwrap();
    assert!(!db.is_open());
    drop(db);
}

#[test]
fn dropping_the_database_joins_the_worker() {
    let db = open_db();
    let worker = Arc::clone(db.worker());
    drop(db);
    assert!(worker.is_shutdown());
}

#[test]
fn independent_databases_do_not_share_scopes() {
    let a = open_db();
    let b = open_db();
    a.transaction(|_| {
        assert!(b.current_transaction().is_err());
        b.transaction(|txn| txn.create_node(&[]))?;
        Ok(())
    })
    .unwrap();
    assert_eq!(a.store().node_count(), 0);
    assert_eq!(b.store().node_count(), 1);
}
