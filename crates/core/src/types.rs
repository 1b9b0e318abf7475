//! Identifier types for graph entities
//!
//! This module defines:
//! - NodeId / RelationshipId: store-assigned entity identifiers
//! - EntityKind: discriminates nodes from relationships (indexes are per kind)
//! - EntityRef: a reference to either kind of entity
//! - Label: node label
//! - TxnId: transaction identifier

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identifier of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

/// Identifier of a transaction, unique per store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Kind of graph entity
///
/// Named indexes are registered per kind: a node index never holds
/// relationships and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// A node
    Node,
    /// A relationship
    Relationship,
}

impl EntityKind {
    /// Lowercase name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Relationship => "relationship",
        }
    }
}

/// Reference to a node or a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    /// A node reference
    Node(NodeId),
    /// A relationship reference
    Relationship(RelationshipId),
}

impl EntityRef {
    /// The kind of the referenced entity
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityRef::Node(_) => EntityKind::Node,
            EntityRef::Relationship(_) => EntityKind::Relationship,
        }
    }

    /// Raw numeric id, meaningful only together with `kind()`
    pub fn raw(&self) -> u64 {
        match self {
            EntityRef::Node(id) => id.0,
            EntityRef::Relationship(id) => id.0,
        }
    }
}

impl From<NodeId> for EntityRef {
    fn from(id: NodeId) -> Self {
        EntityRef::Node(id)
    }
}

impl From<RelationshipId> for EntityRef {
    fn from(id: RelationshipId) -> Self {
        EntityRef::Relationship(id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Node(id) => id.fmt(f),
            EntityRef::Relationship(id) => id.fmt(f),
        }
    }
}

/// Node label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(String);

impl Label {
    /// Create a label from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Label name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Label {
    fn from(name: &str) -> Self {
        Label::new(name)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}
