//! Named secondary indexes
//!
//! A `NamedIndex` maps `(key, value)` pairs to the entities registered under
//! them, and keeps the reverse mapping so that removing an entity does not
//! scan the whole index. Values are stored in their display form, so
//! `Value::Int(1)` and `Value::String("1")` land on the same entry.
//!
//! Indexes are registered per [`EntityKind`]; `IndexSet` holds all indexes of
//! one kind by name.

use graphtx_core::{EntityKind, EntityRef, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

type Entry = (String, String);

/// One named index: (key, value) → entities
#[derive(Debug, Default, Clone)]
pub struct NamedIndex {
    entries: HashMap<Entry, HashSet<EntityRef>>,
    by_entity: HashMap<EntityRef, HashSet<Entry>>,
}

impl NamedIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under `(key, value)`
    pub fn insert(&mut self, entity: EntityRef, key: &str, value: &Value) {
        let entry = (key.to_string(), value.to_string());
        self.entries.entry(entry.clone()).or_default().insert(entity);
        self.by_entity.entry(entity).or_default().insert(entry);
    }

    /// Remove every entry of `entity`
    ///
    /// Empty entry sets are dropped so the index does not accumulate them.
    /// Returns true if the entity was present.
    pub fn remove_entity(&mut self, entity: &EntityRef) -> bool {
        let Some(entries) = self.by_entity.remove(entity) else {
            return false;
        };
        for entry in entries {
            if let Some(entities) = self.entries.get_mut(&entry) {
                entities.remove(entity);
                if entities.is_empty() {
                    self.entries.remove(&entry);
                }
            }
        }
        true
    }

    /// Entities registered under `(key, value)`, in id order
    pub fn get(&self, key: &str, value: &Value) -> Vec<EntityRef> {
        let entry = (key.to_string(), value.to_string());
        let mut hits: Vec<EntityRef> = self
            .entries
            .get(&entry)
            .map(|entities| entities.iter().copied().collect())
            .unwrap_or_default();
        hits.sort();
        hits
    }

    /// True if `entity` has at least one entry
    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.by_entity.contains_key(entity)
    }

    /// Number of distinct indexed entities
    pub fn entity_count(&self) -> usize {
        self.by_entity.len()
    }

    /// True if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

/// A staged index mutation
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOp {
    /// Create the index if it does not exist
    Create {
        /// Entity kind of the index
        kind: EntityKind,
        /// Index name
        name: String,
    },
    /// Add one entry
    Add {
        /// Index name (kind is the entity's kind)
        name: String,
        /// Indexed entity
        entity: EntityRef,
        /// Entry key
        key: String,
        /// Entry value
        value: Value,
    },
    /// Remove all entries of an entity
    Remove {
        /// Index name (kind is the entity's kind)
        name: String,
        /// Entity to remove
        entity: EntityRef,
    },
}

impl IndexOp {
    /// Kind of index this op targets
    pub fn kind(&self) -> EntityKind {
        match self {
            IndexOp::Create { kind, .. } => *kind,
            IndexOp::Add { entity, .. } | IndexOp::Remove { entity, .. } => entity.kind(),
        }
    }

    /// Index name this op targets
    pub fn name(&self) -> &str {
        match self {
            IndexOp::Create { name, .. }
            | IndexOp::Add { name, .. }
            | IndexOp::Remove { name, .. } => name,
        }
    }
}

/// All indexes of one entity kind, by name
#[derive(Debug, Default, Clone)]
pub struct IndexSet {
    indexes: BTreeMap<String, NamedIndex>,
}

impl IndexSet {
    /// Apply a staged op. Adding creates the index on first use; removing
    /// from a missing index is a no-op.
    pub fn apply(&mut self, op: &IndexOp) {
        match op {
            IndexOp::Create { name, .. } => {
                self.indexes.entry(name.clone()).or_default();
            }
            IndexOp::Add {
                name,
                entity,
                key,
                value,
            } => {
                self.indexes
                    .entry(name.clone())
                    .or_default()
                    .insert(*entity, key, value);
            }
            IndexOp::Remove { name, entity } => {
                if let Some(index) = self.indexes.get_mut(name) {
                    index.remove_entity(entity);
                }
            }
        }
    }

    /// Registered index names, sorted
    pub fn names(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Index by name
    pub fn get(&self, name: &str) -> Option<&NamedIndex> {
        self.indexes.get(name)
    }
}
