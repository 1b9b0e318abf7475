//! Failure-kind taxonomy
//!
//! A `FailureKind` names a class of failure. Kinds form a tree rooted at
//! [`FailureKind::ANY`]; a kind declared with [`FailureKind::child`] *is a*
//! member of its parent (and of every ancestor). Rollback policies match a
//! raised kind against declared kinds with this relation, so declaring a
//! parent covers all of its descendants.
//!
//! ```
//! use graphtx_core::FailureKind;
//!
//! const VALIDATION: FailureKind = FailureKind::new("validation");
//! const MISSING_FIELD: FailureKind = FailureKind::child("missing_field", &VALIDATION);
//!
//! assert!(MISSING_FIELD.is_a(&VALIDATION));
//! assert!(MISSING_FIELD.is_a(&FailureKind::ANY));
//! assert!(!VALIDATION.is_a(&MISSING_FIELD));
//! ```
//!
//! Error types raised inside transactional operations expose their kind
//! through [`Classify`].

use std::fmt;
use thiserror::Error;

/// A node in the failure taxonomy
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FailureKind {
    name: &'static str,
    parent: Option<&'static FailureKind>,
}

impl FailureKind {
    /// Root of the taxonomy; every kind is-a `ANY`.
    pub const ANY: FailureKind = FailureKind {
        name: "any",
        parent: None,
    };

    /// Scope plumbing failures (no active scope, imbalance)
    pub const SCOPE: FailureKind = FailureKind::child("scope", &FailureKind::ANY);

    /// Graph store failures (missing entities, closed transactions, vetoes)
    pub const STORAGE: FailureKind = FailureKind::child("storage", &FailureKind::ANY);

    /// Background worker failures
    pub const WORKER: FailureKind = FailureKind::child("worker", &FailureKind::ANY);

    /// Configuration and I/O failures
    pub const CONFIG: FailureKind = FailureKind::child("config", &FailureKind::ANY);

    /// Declare a top-level kind (a direct child of [`FailureKind::ANY`])
    pub const fn new(name: &'static str) -> Self {
        Self::child(name, &FailureKind::ANY)
    }

    /// Declare a kind that is-a `parent`
    pub const fn child(name: &'static str, parent: &'static FailureKind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Name of this kind
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent, `None` only for [`FailureKind::ANY`]
    pub fn parent(&self) -> Option<&'static FailureKind> {
        self.parent
    }

    /// True if `self` equals `other` or descends from it
    pub fn is_a(&self, other: &FailureKind) -> bool {
        self.lineage().any(|kind| kind == *other)
    }

    /// True if `self` is-a any of `kinds`
    pub fn is_any_of(&self, kinds: &[FailureKind]) -> bool {
        kinds.iter().any(|kind| self.is_a(kind))
    }

    /// Iterate from `self` up to the root
    pub fn lineage(&self) -> Lineage {
        Lineage {
            next: Some(*self),
        }
    }
}

/// Iterator over a kind and its ancestors
pub struct Lineage {
    next: Option<FailureKind>,
}

impl Iterator for Lineage {
    type Item = FailureKind;

    fn next(&mut self) -> Option<FailureKind> {
        let current = self.next?;
        self.next = current.parent.copied();
        Some(current)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path: Vec<&str> = self.lineage().map(|k| k.name).collect();
        path.reverse();
        write!(f, "{}", path.join("/"))
    }
}

impl fmt::Debug for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailureKind({})", self)
    }
}

/// Exposes the failure kind of an error value
pub trait Classify {
    /// The kind used by rollback policies
    fn failure_kind(&self) -> FailureKind;
}

/// A tagged application failure
///
/// Convenience error type for transactional operations that have no error
/// type of their own: a kind plus a message.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
}

impl Failure {
    /// Create a failure of `kind`
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Failure message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Classify for Failure {
    fn failure_kind(&self) -> FailureKind {
        self.kind
    }
}

impl From<crate::Error> for Failure {
    fn from(e: crate::Error) -> Self {
        Failure::new(e.failure_kind(), e.to_string())
    }
}
