// collection.rs
// Per-collection state
//
// A collection owns its document storage (insertion-ordered), the index
// engine, and the open-cursor table keyed by session. All mutation is
// linearized by the executor actor; the locks here exist so read paths
// (size, disk snapshots) can run against a consistent view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::cursor::SubCursor;
use crate::document::{document_id, DocumentId, DocumentPtr};
use crate::index::IndexEngine;
use crate::services::message::SessionId;
use crate::statement::CollectionName;

/// Insertion-ordered document set keyed by `/_id`.
pub struct DocumentStorage {
    order: Vec<DocumentId>,
    documents: AHashMap<DocumentId, DocumentPtr>,
}

impl DocumentStorage {
    pub fn new() -> Self {
        DocumentStorage {
            order: Vec::new(),
            documents: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    pub fn get(&self, id: &DocumentId) -> Option<DocumentPtr> {
        self.documents.get(id).cloned()
    }

    /// Insert under the document's `/_id`. A duplicate id is refused and
    /// leaves the stored document in place.
    pub fn insert(&mut self, document: DocumentPtr) -> Option<DocumentId> {
        let id = document_id(&document)?;
        if self.documents.contains_key(&id) {
            return None;
        }
        self.order.push(id.clone());
        self.documents.insert(id.clone(), document);
        Some(id)
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<DocumentPtr> {
        let removed = self.documents.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    /// Documents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DocumentPtr> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }
}

impl Default for DocumentStorage {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CollectionContext {
    name: CollectionName,
    storage: RwLock<DocumentStorage>,
    indexes: RwLock<IndexEngine>,
    cursors: DashMap<SessionId, Arc<SubCursor>>,
    dropped: AtomicBool,
}

impl CollectionContext {
    pub fn new(name: CollectionName) -> Arc<Self> {
        Arc::new(CollectionContext {
            name,
            storage: RwLock::new(DocumentStorage::new()),
            indexes: RwLock::new(IndexEngine::new()),
            cursors: DashMap::new(),
            dropped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &CollectionName {
        &self.name
    }

    pub fn storage(&self) -> &RwLock<DocumentStorage> {
        &self.storage
    }

    pub fn indexes(&self) -> &RwLock<IndexEngine> {
        &self.indexes
    }

    pub fn size(&self) -> usize {
        self.storage.read().len()
    }

    /// A dropped collection refuses further operations.
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub fn drop_collection(&self) {
        self.dropped.store(true, Ordering::Release);
        self.cursors.clear();
    }

    pub fn register_cursor(&self, session: SessionId, cursor: Arc<SubCursor>) {
        self.cursors.insert(session, cursor);
    }

    pub fn close_cursor(&self, session: &SessionId) -> bool {
        self.cursors.remove(session).is_some()
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    /// Snapshot of every document as JSON text, insertion order preserved.
    /// This is what the disk manager writes.
    pub fn documents_snapshot(&self) -> Vec<String> {
        self.storage.read().iter().map(|doc| doc.to_json()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn doc(id: &str) -> DocumentPtr {
        Document::from_json(&format!(r#"{{"_id": "{}", "v": 1}}"#, id)).unwrap()
    }

    #[test]
    fn test_insert_preserves_order_and_rejects_duplicates() {
        let mut storage = DocumentStorage::new();
        assert!(storage.insert(doc("b")).is_some());
        assert!(storage.insert(doc("a")).is_some());
        assert!(storage.insert(doc("b")).is_none());
        assert_eq!(storage.len(), 2);
        let ids: Vec<_> = storage
            .iter()
            .map(|d| d.get_string("/_id").unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_insert_requires_id() {
        let mut storage = DocumentStorage::new();
        assert!(storage.insert(Document::from_json(r#"{"v": 1}"#).unwrap()).is_none());
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut storage = DocumentStorage::new();
        for id in ["a", "b", "c"] {
            storage.insert(doc(id));
        }
        assert!(storage.remove(&DocumentId::new("b")).is_some());
        assert!(storage.remove(&DocumentId::new("b")).is_none());
        let ids: Vec<_> = storage
            .iter()
            .map(|d| d.get_string("/_id").unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_context_drop_flag_and_cursors() {
        let context = CollectionContext::new(CollectionName::new("db", "coll"));
        let session = SessionId::new();
        context.register_cursor(
            session.clone(),
            Arc::new(SubCursor::new(context.name().clone())),
        );
        assert_eq!(context.open_cursors(), 1);
        assert!(context.close_cursor(&session));
        assert!(!context.close_cursor(&session));
        assert!(!context.is_dropped());
        context.drop_collection();
        assert!(context.is_dropped());
    }
}
