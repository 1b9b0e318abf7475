//! Deleted entities leave every index once the patch job has run.

use crate::common::*;
use graphtx::{TransactionData, TransactionEventHandler};
use parking_lot::Mutex;
use std::sync::Arc;

fn index_node(db: &Database, id: NodeId, name: &str) {
    db.transaction(|txn| {
        txn.index_add("people", id, "name", name)?;
        txn.index_add("nicknames", id, "nick", name.to_lowercase())?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn deleted_node_leaves_all_node_indexes() {
    let db = open_db();
    let neo = create_named(&db, &[], "Neo");
    let trinity = create_named(&db, &[], "Trinity");
    index_node(&db, neo, "Neo");
    index_node(&db, trinity, "Trinity");

    db.transaction(|txn| txn.delete_node(neo)).unwrap();
    db.worker().drain_and_wait().unwrap();

    assert!(lookup(&db, "people", "name", "Neo").is_empty());
    assert!(lookup(&db, "nicknames", "nick", "neo").is_empty());
    assert_eq!(lookup(&db, "people", "name", "Trinity"), vec![EntityRef::Node(trinity)]);
}

#[test]
fn deleted_relationship_leaves_relationship_indexes() {
    let db = open_db();
    let a = create_named(&db, &[], "Neo");
    let b = create_named(&db, &[], "Morpheus");
    let rel = db
        .transaction(|txn| {
            let rel = txn.create_relationship(a, b, "KNOWS")?;
            txn.index_add("acquaintances", rel, "since", 1999i64)?;
            Ok(rel)
        })
        .unwrap();

    db.transaction(|txn| txn.delete_relationship(rel)).unwrap();
    db.worker().drain_and_wait().unwrap();

    assert!(!db.store().index_contains("acquaintances", EntityRef::Relationship(rel)));
    assert!(db.store().node(a).is_some());
}

#[test]
fn patch_job_commit_enqueues_nothing_further() {
    struct Counter(Mutex<usize>);
    impl TransactionEventHandler for Counter {
        fn before_commit(&self, _data: &TransactionData) -> graphtx::Result<()> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    let db = open_db();
    let neo = create_named(&db, &[], "Neo");
    index_node(&db, neo, "Neo");
    db.worker().drain_and_wait().unwrap();

    let counter = Arc::new(Counter(Mutex::new(0)));
    db.register_transaction_event_handler(counter.clone());

    db.transaction(|txn| txn.delete_node(neo)).unwrap();
    db.worker().drain_and_wait().unwrap();

    // The delete and its single patch job
    assert_eq!(*counter.0.lock(), 2);
    assert_eq!(db.worker().stats().completed, 1);
    assert_eq!(db.worker().stats().queue_depth, 0);
}

#[test]
fn index_is_stale_until_the_job_runs() {
    let db = Database::open(EngineConfig {
        drain_on_shutdown: false,
        ..EngineConfig::default()
    })
    .unwrap();
    let neo = create_named(&db, &[], "Neo");
    index_node(&db, neo, "Neo");

    // Keep the worker busy so the patch job stays queued
    let gate = Arc::new(std::sync::Barrier::new(2));
    let release = Arc::clone(&gate);
    db.worker()
        .submit("gate", move |_txn| {
            release.wait();
            Ok(())
        })
        .unwrap();

    db.transaction(|txn| txn.delete_node(neo)).unwrap();
    assert!(db.store().node(neo).is_none());
    assert!(db.store().index_contains("people", EntityRef::Node(neo)));

    gate.wait();
    db.worker().drain_and_wait().unwrap();
    assert!(!db.store().index_contains("people", EntityRef::Node(neo)));
}
