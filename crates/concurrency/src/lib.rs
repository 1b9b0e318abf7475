//! Transaction scoping for graphtx
//!
//! This crate lets call chains share one underlying transaction across
//! nested operation boundaries:
//! - `ScopeStack`: per-thread stack of active transaction scopes with a
//!   sticky failure flag
//! - `RollbackPolicy`: commit-or-rollback decision from declared failure kinds
//! - `TransactionInterceptor`: decorator that opens, joins, commits and
//!   rolls back around an operation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod interceptor;
pub mod policy;
pub mod scope;

pub use interceptor::{TransactionInterceptor, TransactionSource};
pub use policy::{RollbackDecision, RollbackPolicy, RollbackSpec, Transactional};
pub use scope::{ScopeGuard, ScopeStack};
