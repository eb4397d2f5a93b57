// index/mod.rs
// Per-collection index registry
//
// Two parallel maps over one slab of indexes: key-tuple -> index for
// query-time lookup by predicate shape, and id -> index for maintenance.
// Dropped indexes leave the maps immediately; their persisted files are
// removed by the disk manager on the next flush (the engine queues the
// names).

mod ordered;

pub use ordered::{IndexSnapshot, OrderedIndex};

use std::collections::{BTreeMap, HashMap};

use crate::document::DocumentPtr;
use crate::expr::field_to_pointer;

pub type IndexId = u32;

pub struct IndexEngine {
    mapper: BTreeMap<Vec<String>, IndexId>,
    by_name: HashMap<String, IndexId>,
    storage: HashMap<IndexId, OrderedIndex>,
    next_id: IndexId,
    pending_cleanup: Vec<String>,
}

impl IndexEngine {
    pub fn new() -> Self {
        IndexEngine {
            mapper: BTreeMap::new(),
            by_name: HashMap::new(),
            storage: HashMap::new(),
            next_id: 0,
            pending_cleanup: Vec::new(),
        }
    }

    /// Register a built index; returns its fresh id.
    pub fn emplace(&mut self, index: OrderedIndex) -> IndexId {
        let id = self.next_id;
        self.next_id += 1;
        self.mapper.insert(index.keys().to_vec(), id);
        self.by_name.insert(index.name().to_string(), id);
        self.storage.insert(id, index);
        id
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn find(&self, id: IndexId) -> Option<&OrderedIndex> {
        self.storage.get(&id)
    }

    pub fn find_by_keys(&self, keys: &[String]) -> Option<&OrderedIndex> {
        let normalized: Vec<String> = keys.iter().map(|k| field_to_pointer(k)).collect();
        self.mapper.get(&normalized).and_then(|id| self.storage.get(id))
    }

    /// Single-field lookup used by the translator to route a compare leaf.
    pub fn find_by_field(&self, field: &str) -> Option<&OrderedIndex> {
        self.find_by_keys(std::slice::from_ref(&field_to_pointer(field)))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&OrderedIndex> {
        self.by_name.get(name).and_then(|id| self.storage.get(id))
    }

    /// Maintain every index for a newly stored document.
    pub fn insert_document(&mut self, document: &DocumentPtr) {
        for index in self.storage.values_mut() {
            index.insert_document(document);
        }
    }

    pub fn insert_batch<'a>(&mut self, documents: impl IntoIterator<Item = &'a DocumentPtr>) {
        for document in documents {
            self.insert_document(document);
        }
    }

    pub fn remove_document(&mut self, document: &DocumentPtr) {
        for index in self.storage.values_mut() {
            index.remove_document(document);
        }
    }

    /// File a document into one index only.
    pub fn insert(&mut self, id: IndexId, document: &DocumentPtr) {
        if let Some(index) = self.storage.get_mut(&id) {
            index.insert_document(document);
        }
    }

    pub fn insert_batch_into<'a>(
        &mut self,
        id: IndexId,
        documents: impl IntoIterator<Item = &'a DocumentPtr>,
    ) {
        for document in documents {
            self.insert(id, document);
        }
    }

    pub fn remove(&mut self, id: IndexId, document: &DocumentPtr) {
        if let Some(index) = self.storage.get_mut(&id) {
            index.remove_document(document);
        }
    }

    /// Refill in-memory indexes from the document set. Disk-backed ones
    /// come back with their entries; these persist only their definition.
    pub fn rebuild_in_memory<'a>(&mut self, documents: impl IntoIterator<Item = &'a DocumentPtr>) {
        let mut rebuilt: Vec<&mut OrderedIndex> = self
            .storage
            .values_mut()
            .filter(|index| index.kind() == crate::statement::IndexKind::Memory)
            .collect();
        if rebuilt.is_empty() {
            return;
        }
        for document in documents {
            for index in rebuilt.iter_mut() {
                index.insert_document(document);
            }
        }
    }

    /// Mark dropped, unlink from both maps and queue persistence cleanup.
    pub fn drop_index(&mut self, name: &str) -> bool {
        let id = match self.by_name.remove(name) {
            Some(id) => id,
            None => return false,
        };
        if let Some(mut index) = self.storage.remove(&id) {
            index.mark_dropped();
            self.mapper.remove(&index.keys().to_vec());
        }
        self.pending_cleanup.push(name.to_string());
        true
    }

    /// Dropped index names awaiting file removal; drained by the disk
    /// manager.
    pub fn take_cleanup(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_cleanup)
    }

    pub fn snapshots(&self) -> Vec<IndexSnapshot> {
        self.storage.values().map(|index| index.snapshot()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderedIndex> {
        self.storage.values()
    }
}

impl Default for IndexEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::expr::CompareKind;
    use crate::statement::{IndexCompare, IndexKind};
    use crate::value::ScalarValue;

    fn doc(id: &str, count: i64) -> DocumentPtr {
        Document::from_json(&format!(r#"{{"_id": "{}", "count": {}}}"#, id, count)).unwrap()
    }

    #[test]
    fn test_emplace_and_lookup_by_keys() {
        let mut engine = IndexEngine::new();
        let id = engine.emplace(OrderedIndex::new(
            "count_idx",
            vec!["count".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        assert!(engine.find(id).is_some());
        assert!(engine.find_by_field("count").is_some());
        assert!(engine.find_by_field("/count").is_some());
        assert!(engine.find_by_field("other").is_none());
        assert!(engine.find_by_name("count_idx").is_some());
    }

    #[test]
    fn test_document_maintenance_updates_all_indexes() {
        let mut engine = IndexEngine::new();
        engine.emplace(OrderedIndex::new("a", vec!["count".into()], IndexKind::Memory, IndexCompare::Eq));
        engine.emplace(OrderedIndex::new("b", vec!["count".into(), "x".into()], IndexKind::Memory, IndexCompare::Eq));
        let d = doc("k", 3);
        engine.insert_document(&d);
        assert_eq!(
            engine.find_by_name("a").unwrap().find_exact(&ScalarValue::Int(3)).len(),
            1
        );
        engine.remove_document(&d);
        assert!(engine.find_by_name("a").unwrap().is_empty());
    }

    #[test]
    fn test_drop_index_unlinks_and_queues_cleanup() {
        let mut engine = IndexEngine::new();
        engine.emplace(OrderedIndex::new("gone", vec!["count".into()], IndexKind::Memory, IndexCompare::Eq));
        assert!(engine.drop_index("gone"));
        assert!(!engine.drop_index("gone"));
        assert!(engine.find_by_field("count").is_none());
        assert_eq!(engine.take_cleanup(), vec!["gone".to_string()]);
        assert!(engine.take_cleanup().is_empty());
    }

    #[test]
    fn test_per_index_insert_and_remove() {
        let mut engine = IndexEngine::new();
        let a = engine.emplace(OrderedIndex::new(
            "a",
            vec!["count".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        let b = engine.emplace(OrderedIndex::new(
            "b",
            vec!["count".into(), "x".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        let d = doc("k", 3);
        engine.insert(a, &d);
        assert_eq!(engine.find(a).unwrap().len(), 1);
        assert!(engine.find(b).unwrap().is_empty());
        engine.remove(a, &d);
        assert!(engine.find(a).unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_in_memory() {
        let mut engine = IndexEngine::new();
        engine.emplace(OrderedIndex::new(
            "mem",
            vec!["count".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        let documents = vec![doc("a", 1), doc("b", 2)];
        engine.rebuild_in_memory(documents.iter());
        assert_eq!(engine.find_by_name("mem").unwrap().len(), 2);
    }

    #[test]
    fn test_range_through_engine() {
        let mut engine = IndexEngine::new();
        engine.emplace(OrderedIndex::new("c", vec!["count".into()], IndexKind::Memory, IndexCompare::Gte));
        for i in 0..100 {
            engine.insert_document(&doc(&format!("d{}", i), i));
        }
        let index = engine.find_by_field("count").unwrap();
        let ids = index.find_range(CompareKind::Gte, &ScalarValue::Int(90));
        assert_eq!(ids.len(), 10);
    }
}
