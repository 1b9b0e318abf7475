//! Rollback policy
//!
//! Decides whether a failure raised inside a transactional operation rolls
//! the transaction back or lets it commit anyway:
//!
//! 1. The raised kind is-a some `no_rollback_for` entry → commit.
//! 2. Else it is-a some `rollback_on` entry → roll back.
//! 3. Else → commit.
//!
//! Rule 1 beats rule 2 when a kind matches both sets. By default every
//! failure rolls back.

use graphtx_core::FailureKind;

/// Outcome of [`RollbackPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDecision {
    /// Keep the writes despite the failure
    Commit,
    /// Discard the writes
    Rollback,
}

/// Failure kinds declared on one transactional operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackSpec {
    rollback_on: Vec<FailureKind>,
    no_rollback_for: Vec<FailureKind>,
}

impl RollbackSpec {
    /// Spec with explicit sets
    pub fn new(
        rollback_on: impl IntoIterator<Item = FailureKind>,
        no_rollback_for: impl IntoIterator<Item = FailureKind>,
    ) -> Self {
        Self {
            rollback_on: rollback_on.into_iter().collect(),
            no_rollback_for: no_rollback_for.into_iter().collect(),
        }
    }

    /// Kinds that roll back
    pub fn rollback_on(&self) -> &[FailureKind] {
        &self.rollback_on
    }

    /// Kinds that commit anyway
    pub fn no_rollback_for(&self) -> &[FailureKind] {
        &self.no_rollback_for
    }
}

impl Default for RollbackSpec {
    fn default() -> Self {
        Self {
            rollback_on: vec![FailureKind::ANY],
            no_rollback_for: Vec::new(),
        }
    }
}

/// Pure commit/rollback decision
pub struct RollbackPolicy;

impl RollbackPolicy {
    /// Decide what a failure of `kind` does to the transaction
    pub fn decide(spec: &RollbackSpec, kind: FailureKind) -> RollbackDecision {
        if kind.is_any_of(&spec.no_rollback_for) {
            RollbackDecision::Commit
        } else if kind.is_any_of(&spec.rollback_on) {
            RollbackDecision::Rollback
        } else {
            RollbackDecision::Commit
        }
    }
}

/// Declaration of a transactional operation
///
/// ```
/// use graphtx_concurrency::Transactional;
/// use graphtx_core::FailureKind;
///
/// const AUDIT: FailureKind = FailureKind::new("audit");
///
/// let declared = Transactional::new().no_rollback_for([AUDIT]);
/// assert_eq!(declared.spec().no_rollback_for(), &[AUDIT]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transactional {
    spec: RollbackSpec,
}

impl Transactional {
    /// Default declaration: every failure rolls back
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rollback set
    pub fn rollback_on(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.spec.rollback_on = kinds.into_iter().collect();
        self
    }

    /// Replace the no-rollback set
    pub fn no_rollback_for(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.spec.no_rollback_for = kinds.into_iter().collect();
        self
    }

    /// Declared spec
    pub fn spec(&self) -> &RollbackSpec {
        &self.spec
    }

    /// Decision for a failure of `kind` under this declaration
    pub fn decide(&self, kind: FailureKind) -> RollbackDecision {
        RollbackPolicy::decide(&self.spec, kind)
    }
}

impl From<RollbackSpec> for Transactional {
    fn from(spec: RollbackSpec) -> Self {
        Self { spec }
    }
}
