//! Ambient transaction visibility with joining enabled.

use crate::common::*;
use std::sync::Arc;

#[test]
fn not_scoped() {
    let db = open_db();
    assert!(matches!(db.current_transaction(), Err(Error::NoActiveScope)));
    assert_eq!(db.scopes().current_depth(), None);
}

#[test]
fn scoped() {
    let db = open_db();
    let seen = db
        .transaction(|txn| {
            let ambient = db.current_transaction()?;
            assert_eq!(ambient.id(), txn.id());
            Ok(ambient.id())
        })
        .unwrap();
    assert!(seen.0 > 0);
    assert!(!db.scopes().in_scope());
}

#[test]
fn nested_calls_observe_one_transaction() {
    let db = open_db();
    let declared = Transactional::new();
    let (outer, inner, depth) = db
        .invoke(&declared, || {
            let outer = db.current_transaction()?.id();
            let (inner, depth) = db.invoke(&declared, || {
                Ok::<_, Error>((db.current_transaction()?.id(), db.scopes().current_depth()))
            })?;
            Ok::<_, Error>((outer, inner, depth))
        })
        .unwrap();
    assert_eq!(outer, inner);
    assert_eq!(depth, Some(2));
}

#[test]
fn inner_failure_dooms_the_outer_commit() {
    let db = open_db();
    let declared = Transactional::new();
    let outcome = db.invoke(&declared, || {
        create_in_scope(&db)?;
        let inner: Result<(), Failure> =
            db.invoke(&declared, || Err(Failure::new(E1, "inner failure")));
        assert_eq!(inner.unwrap_err().failure_kind(), E1);
        Ok::<_, Failure>(())
    });
    assert!(outcome.is_ok());
    assert_eq!(db.store().node_count(), 0);
}

#[test]
fn tolerated_inner_failure_keeps_the_outer_commit() {
    let db = open_db();
    let lenient = Transactional::new().no_rollback_for([E2]);
    db.invoke(&Transactional::new(), || {
        create_in_scope(&db)?;
        let _ = db.invoke(&lenient, || Err::<(), _>(Failure::new(E2X, "tolerated")));
        Ok::<_, Failure>(())
    })
    .unwrap();
    assert_eq!(db.store().node_count(), 1);
}

#[test]
fn doomed_scope_overrides_no_rollback_for_at_the_outer_call() {
    let db = open_db();
    let lenient = Transactional::new().no_rollback_for([E1]);
    let result = db.invoke(&lenient, || {
        create_in_scope(&db)?;
        let _ = db.invoke(&Transactional::new(), || Err::<(), _>(Failure::new(E2, "inner")));
        Err::<(), _>(Failure::new(E1, "outer"))
    });
    assert_eq!(result.unwrap_err().failure_kind(), E1);
    assert_eq!(db.store().node_count(), 0);
}

#[test]
fn failed_flag_does_not_leak_into_the_next_scope() {
    let db = open_db();
    let declared = Transactional::new();
    let _ = db.invoke(&declared, || {
        db.invoke(&declared, || Err::<(), _>(Failure::new(E1, "inner")))
    });
    assert!(!db.scopes().is_failed());

    db.invoke(&declared, || create_in_scope(&db)).unwrap();
    assert_eq!(db.store().node_count(), 1);
}

#[test]
fn scopes_are_per_thread() {
    let db = open_db();
    db.transaction(|_| {
        let db = Arc::clone(&db);
        let other = std::thread::spawn(move || db.current_transaction().is_err())
            .join()
            .unwrap();
        assert!(other, "another thread must not see this scope");
        Ok(())
    })
    .unwrap();
}

#[test]
fn concurrent_threads_commit_independently() {
    let db = open_db();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                for j in 0..10 {
                    let fail = (i + j) % 2 == 0;
                    let _ = db.invoke(&Transactional::new(), || {
                        create_in_scope(&db)?;
                        if fail {
                            Err(Failure::new(E1, "odd one out"))
                        } else {
                            Ok(())
                        }
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(db.store().node_count(), 40);
}

fn create_in_scope(db: &Database) -> Result<NodeId, Failure> {
    Ok(db.current_transaction()?.create_node(&[])?)
}
