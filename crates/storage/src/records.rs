//! Node and relationship records

use graphtx_core::{Label, NodeId, RelationshipId, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A node with its labels and properties
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    /// Node id
    pub id: NodeId,
    /// Labels carried by the node
    pub labels: BTreeSet<Label>,
    /// Property map
    pub properties: BTreeMap<String, Value>,
}

impl NodeRecord {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            labels: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    /// True if the node carries `label`
    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Property value, if set
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A typed, directed relationship between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRecord {
    /// Relationship id
    pub id: RelationshipId,
    /// Start node
    pub start: NodeId,
    /// End node
    pub end: NodeId,
    /// Relationship type name
    pub rel_type: String,
    /// Property map
    pub properties: BTreeMap<String, Value>,
}

impl RelationshipRecord {
    /// True if `node` is either endpoint
    pub fn touches(&self, node: NodeId) -> bool {
        self.start == node || self.end == node
    }

    /// Property value, if set
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
