// index/ordered.rs
// Ordered secondary index
//
// One B-tree from scalar key to document ids. The declared key tuple is a
// list of JSON pointers; inserting a document files the value of every
// non-null key field under that value. Point and range lookups follow the
// compare semantics of the match expressions.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::document::{DocumentId, DocumentPtr};
use crate::expr::{field_to_pointer, CompareKind};
use crate::statement::{IndexCompare, IndexKind};
use crate::value::ScalarValue;

pub struct OrderedIndex {
    name: String,
    /// JSON pointers of the indexed fields, in declaration order
    keys: Vec<String>,
    kind: IndexKind,
    compare: IndexCompare,
    store: BTreeMap<ScalarValue, Vec<DocumentId>>,
    dropped: bool,
}

impl OrderedIndex {
    pub fn new(
        name: impl Into<String>,
        keys: Vec<String>,
        kind: IndexKind,
        compare: IndexCompare,
    ) -> Self {
        OrderedIndex {
            name: name.into(),
            keys: keys.iter().map(|k| field_to_pointer(k)).collect(),
            kind,
            compare,
            store: BTreeMap::new(),
            dropped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn compare(&self) -> IndexCompare {
        self.compare
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }

    pub fn mark_dropped(&mut self) {
        self.dropped = true;
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// File the document under every declared key it has a non-null scalar
    /// for.
    pub fn insert_document(&mut self, document: &DocumentPtr) {
        let id = match crate::document::document_id(document) {
            Some(id) => id,
            None => return,
        };
        for key in &self.keys {
            let value = match document.get_value(key) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let ids = self.store.entry(value).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }
    }

    pub fn remove_document(&mut self, document: &DocumentPtr) {
        let id = match crate::document::document_id(document) {
            Some(id) => id,
            None => return,
        };
        for key in &self.keys {
            let value = match document.get_value(key) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            if let Some(ids) = self.store.get_mut(&value) {
                ids.retain(|existing| existing != &id);
                if ids.is_empty() {
                    self.store.remove(&value);
                }
            }
        }
    }

    pub fn find_exact(&self, value: &ScalarValue) -> Vec<DocumentId> {
        self.store.get(value).cloned().unwrap_or_default()
    }

    /// Ids strictly below `value` (`lower_bound` walk).
    fn below(&self, value: &ScalarValue) -> impl Iterator<Item = &DocumentId> {
        self.store
            .range((Bound::Unbounded, Bound::Excluded(value.clone())))
            .flat_map(|(_, ids)| ids.iter())
    }

    /// Ids strictly above `value` (`upper_bound` walk).
    fn above(&self, value: &ScalarValue) -> impl Iterator<Item = &DocumentId> {
        self.store
            .range((Bound::Excluded(value.clone()), Bound::Unbounded))
            .flat_map(|(_, ids)| ids.iter())
    }

    /// Point / range lookup with the compare semantics of the match layer.
    pub fn find_range(&self, kind: CompareKind, value: &ScalarValue) -> Vec<DocumentId> {
        match kind {
            CompareKind::Eq => self.find_exact(value),
            CompareKind::Ne => self.below(value).chain(self.above(value)).cloned().collect(),
            CompareKind::Gt => self.above(value).cloned().collect(),
            CompareKind::Lt => self.below(value).cloned().collect(),
            CompareKind::Gte => {
                let mut ids = self.find_exact(value);
                ids.extend(self.above(value).cloned());
                ids
            }
            CompareKind::Lte => {
                let mut ids: Vec<_> = self.below(value).cloned().collect();
                ids.extend(self.find_exact(value));
                ids
            }
            CompareKind::Regex => Vec::new(),
        }
    }

    /// Persisted form. An in-memory index keeps only its definition; the
    /// entries rebuild from the documents at load.
    pub fn snapshot(&self) -> IndexSnapshot {
        let entries = match self.kind {
            IndexKind::Disk => self
                .store
                .iter()
                .map(|(value, ids)| (value.clone(), ids.clone()))
                .collect(),
            IndexKind::Memory => Vec::new(),
        };
        IndexSnapshot {
            name: self.name.clone(),
            keys: self.keys.clone(),
            kind: self.kind,
            compare: self.compare,
            entries,
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        OrderedIndex {
            name: snapshot.name,
            keys: snapshot.keys,
            kind: snapshot.kind,
            compare: snapshot.compare,
            store: snapshot.entries.into_iter().collect(),
            dropped: false,
        }
    }
}

/// Persisted form of an index (bincode on disk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub keys: Vec<String>,
    pub kind: IndexKind,
    pub compare: IndexCompare,
    pub entries: Vec<(ScalarValue, Vec<DocumentId>)>,
}
