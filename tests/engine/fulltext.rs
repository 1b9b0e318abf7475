//! Fulltext index upkeep for labelled nodes.

use crate::common::*;
use graphtx::{
    BackgroundWorker, NodeByLabelHandler, NodeRecord, TransactionData, TransactionEventHandler,
    FULLTEXT_JOB,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};

fn crew() -> Label {
    Label::new("Crew")
}

fn matrix() -> Label {
    Label::new("Matrix")
}

fn count(db: &Database, text: &str) -> usize {
    lookup(db, "ft", "text", text).len()
}

#[test]
fn index_follows_the_crew() {
    let db = open_db();
    db.register_fulltext_index(crew(), "ft", "text", ["name", "addon"]);

    let trinity = create_named(&db, &[crew()], "Trinity");
    let neo = create_named(&db, &[crew()], "Neo");
    let cypher = create_named(&db, &[matrix()], "Cypher");
    let neo1 = create_named(&db, &[matrix()], "Neo1");
    let neo2 = create_named(&db, &[matrix()], "Neo2");

    db.transaction(|txn| txn.set_node_property(trinity, "addon", "favorite"))
        .unwrap();
    db.transaction(|txn| txn.set_node_property(trinity, "name", "trinity"))
        .unwrap();
    db.transaction(|txn| txn.delete_node(neo)).unwrap();
    db.transaction(|txn| {
        txn.add_label(neo1, &crew())?;
        txn.set_node_property(neo1, "_trigger_update", true)?;
        txn.remove_node_property(neo1, "_trigger_update")
    })
    .unwrap();
    db.transaction(|txn| txn.add_label(neo2, &crew())).unwrap();
    db.transaction(|txn| txn.set_node_property(cypher, "name", "cypher"))
        .unwrap();

    db.worker().drain_and_wait().unwrap();

    assert_eq!(count(&db, "Cypher"), 0);
    assert_eq!(count(&db, "cypher"), 0);
    assert_eq!(count(&db, "Neo"), 0);
    assert_eq!(count(&db, "Neo1"), 1);
    assert_eq!(count(&db, "Neo2"), 1);
    assert_eq!(count(&db, "trinity"), 1);
    assert_eq!(count(&db, "favorite"), 1);
    assert_eq!(count(&db, "Trinity"), 0);
    assert_eq!(db.worker().stats().failed, 0);
}

#[test]
fn removing_the_label_drops_the_entries() {
    let db = open_db();
    db.register_fulltext_index(crew(), "ft", "text", ["name"]);
    let switch = create_named(&db, &[crew()], "Switch");
    db.worker().drain_and_wait().unwrap();
    assert_eq!(count(&db, "Switch"), 1);

    db.transaction(|txn| txn.remove_label(switch, &crew())).unwrap();
    db.worker().drain_and_wait().unwrap();
    assert_eq!(count(&db, "Switch"), 0);
    assert!(db.store().node(switch).is_some());
}

#[test]
fn rolled_back_changes_are_not_indexed() {
    let db = open_db();
    db.register_fulltext_index(crew(), "ft", "text", ["name"]);
    let _ = db.transaction(|txn| {
        let id = txn.create_node(&[crew()])?;
        txn.set_node_property(id, "name", "Mouse")?;
        Err::<(), _>(Error::InvalidOperation("abandon".into()))
    });
    db.worker().drain_and_wait().unwrap();
    assert_eq!(count(&db, "Mouse"), 0);
    assert_eq!(db.worker().stats().completed, 0);
}

#[test]
fn custom_consumer_sees_label_scoped_changes() {
    type Changes = Vec<(Vec<NodeId>, Vec<NodeId>)>;
    let db = open_db();
    let seen: Arc<Mutex<Changes>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let consumer = move |updated: &[NodeRecord], deleted: &[NodeId]| -> graphtx::Result<()> {
        sink.lock()
            .push((updated.iter().map(|n| n.id).collect(), deleted.to_vec()));
        Ok(())
    };
    db.register_transaction_event_handler(Arc::new(NodeByLabelHandler::new(
        crew(),
        Arc::new(consumer),
    )));

    let tank = create_named(&db, &[crew()], "Tank");
    create_named(&db, &[matrix()], "Agent");
    db.transaction(|txn| txn.delete_node(tank)).unwrap();

    let seen = seen.lock();
    assert_eq!(*seen, vec![(vec![tank], vec![]), (vec![], vec![tank])]);
}

/// Holds the next fulltext job inside its commit until released
struct CommitGate {
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl CommitGate {
    fn install(db: &Database) -> Arc<Self> {
        let gate = Arc::new(Self {
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        db.register_transaction_event_handler(gate.clone());
        gate
    }
}

impl TransactionEventHandler for CommitGate {
    fn name(&self) -> &str {
        "commit-gate"
    }

    fn before_commit(&self, _data: &TransactionData) -> graphtx::Result<()> {
        if BackgroundWorker::current_job() == Some(FULLTEXT_JOB) && self.armed.swap(false, Ordering::AcqRel) {
            self.entered.wait();
            self.release.wait();
        }
        Ok(())
    }
}

#[test]
fn delete_during_index_commit_stays_deleted() {
    let db = open_db();
    db.register_fulltext_index(crew(), "ft", "text", ["name"]);
    let gate = CommitGate::install(&db);

    let neo = create_named(&db, &[crew()], "Neo");
    // The job has staged its entry for Neo and is now inside its commit
    gate.entered.wait();

    db.transaction(|txn| txn.delete_node(neo)).unwrap();
    assert!(db.store().node(neo).is_none());

    gate.release.wait();
    db.worker().drain_and_wait().unwrap();

    assert!(db.store().node(neo).is_none());
    assert_eq!(db.store().node_count(), 0);
    assert_eq!(count(&db, "Neo"), 0);
    assert!(!db.store().index_contains("ft", EntityRef::Node(neo)));
    assert_eq!(db.worker().stats().failed, 0);
}

#[test]
fn update_during_index_commit_is_kept() {
    let db = open_db();
    db.register_fulltext_index(crew(), "ft", "text", ["name"]);
    let gate = CommitGate::install(&db);

    let neo = create_named(&db, &[crew()], "Neo");
    gate.entered.wait();

    db.transaction(|txn| txn.set_node_property(neo, "name", "Thomas"))
        .unwrap();

    gate.release.wait();
    db.worker().drain_and_wait().unwrap();

    assert_eq!(
        db.store().node(neo).unwrap().property("name"),
        Some(&Value::from("Thomas"))
    );
    assert_eq!(count(&db, "Neo"), 0);
    assert_eq!(lookup(&db, "ft", "text", "Thomas"), vec![EntityRef::Node(neo)]);
}
