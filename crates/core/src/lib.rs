//! Core types for graphtx
//!
//! This crate defines the foundational types used throughout the system:
//! - NodeId, RelationshipId, EntityRef, EntityKind, Label, TxnId
//! - Value: scalar property values
//! - FailureKind / Classify: the failure taxonomy rollback policies match on
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod failure;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use failure::{Classify, Failure, FailureKind, Lineage};
pub use types::{EntityKind, EntityRef, Label, NodeId, RelationshipId, TxnId};
pub use value::Value;
