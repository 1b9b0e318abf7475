//! Commit/rollback outcomes for every declaration against every raised kind.
//!
//! Each call sets `v = true` on a fixture node and then fails. The flag is
//! visible afterwards only if the failure committed.

use crate::common::*;

struct Fixture {
    db: std::sync::Arc<Database>,
    node: NodeId,
}

impl Fixture {
    fn new() -> Self {
        let db = open_db();
        let node = db.transaction(|txn| txn.create_node(&[])).unwrap();
        Self { db, node }
    }

    fn call(&self, declared: &Transactional, kind: FailureKind) {
        let result: Result<(), Failure> = self.db.invoke(declared, || {
            let txn = self.db.current_transaction()?;
            txn.set_node_property(self.node, "v", true)?;
            Err(Failure::new(kind, "raised"))
        });
        let err = result.unwrap_err();
        assert_eq!(err.failure_kind(), kind, "caller must see the raised failure");
    }

    /// Reads and resets the flag in one transaction
    fn was_executed(&self) -> bool {
        self.db
            .transaction(|txn| {
                let v = txn
                    .get_node(self.node)?
                    .property("v")
                    .cloned()
                    .unwrap_or(Value::Bool(false));
                txn.set_node_property(self.node, "v", false)?;
                Ok(v == Value::Bool(true))
            })
            .unwrap()
    }

    /// Expected outcome per kind of `RAISED`
    fn assert_matrix(&self, declared: Transactional, expected: [bool; 4]) {
        for (kind, committed) in RAISED.into_iter().zip(expected) {
            self.call(&declared, kind);
            assert_eq!(
                self.was_executed(),
                committed,
                "{:?} raising {}",
                declared.spec(),
                kind
            );
        }
    }
}

#[test]
fn rollback_on_e1() {
    Fixture::new().assert_matrix(Transactional::new().rollback_on([E1]), [true, false, true, true]);
}

#[test]
fn rollback_on_e2() {
    Fixture::new().assert_matrix(Transactional::new().rollback_on([E2]), [true, true, false, false]);
}

#[test]
fn rollback_on_e2x() {
    Fixture::new().assert_matrix(Transactional::new().rollback_on([E2X]), [true, true, true, false]);
}

#[test]
fn rollback_on_list() {
    Fixture::new().assert_matrix(
        Transactional::new().rollback_on([E1, E2X]),
        [true, false, true, false],
    );
}

#[test]
fn no_rollback_for_e1() {
    Fixture::new().assert_matrix(
        Transactional::new().no_rollback_for([E1]),
        [false, true, false, false],
    );
}

#[test]
fn no_rollback_for_e2() {
    Fixture::new().assert_matrix(
        Transactional::new().no_rollback_for([E2]),
        [false, false, true, true],
    );
}

#[test]
fn no_rollback_for_e2x() {
    Fixture::new().assert_matrix(
        Transactional::new().no_rollback_for([E2X]),
        [false, false, false, true],
    );
}

#[test]
fn no_rollback_for_list() {
    Fixture::new().assert_matrix(
        Transactional::new().no_rollback_for([E1, E2X]),
        [false, true, false, true],
    );
}

#[test]
fn default_rolls_back_everything() {
    Fixture::new().assert_matrix(Transactional::new(), [false, false, false, false]);
}

#[test]
fn no_rollback_for_beats_rollback_on() {
    Fixture::new().assert_matrix(
        Transactional::new().rollback_on([E2]).no_rollback_for([E2X]),
        [true, true, false, true],
    );
}

#[test]
fn plumbing_errors_use_the_default_declaration() {
    let fixture = Fixture::new();
    let declared = Transactional::new().no_rollback_for([E1]);
    let result: Result<(), Error> = fixture.db.invoke(&declared, || {
        fixture
            .db
            .current_transaction()?
            .set_node_property(fixture.node, "v", true)?;
        Err(Error::NodeNotFound(NodeId(9999)))
    });
    assert!(matches!(result, Err(Error::NodeNotFound(_))));
    assert!(!fixture.was_executed());
}

mod properties {
    use super::*;
    use graphtx::{RollbackDecision, RollbackPolicy, RollbackSpec};
    use proptest::prelude::*;

    fn kinds() -> impl Strategy<Value = Vec<FailureKind>> {
        prop::collection::vec(prop::sample::select(RAISED.to_vec()), 0..3)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn commit_outcome_follows_the_policy(
            rollback_on in kinds(),
            no_rollback_for in kinds(),
            raised in prop::sample::select(RAISED.to_vec()),
        ) {
            let fixture = Fixture::new();
            let spec = RollbackSpec::new(rollback_on, no_rollback_for);
            let expected = RollbackPolicy::decide(&spec, raised) == RollbackDecision::Commit;
            fixture.call(&Transactional::from(spec), raised);
            prop_assert_eq!(fixture.was_executed(), expected);
        }
    }
}
