// cursor.rs
// Result cursors
//
// Errors are values: a failed operation yields a cursor carrying the error
// code, never a panic or an early return across actor boundaries.

use std::sync::Arc;

use crate::document::{document_id, DocumentId, DocumentPtr};
use crate::error::ErrorCode;
use crate::statement::CollectionName;

/// Documents one collection contributed to a result.
pub struct SubCursor {
    pub collection: CollectionName,
    documents: Vec<DocumentPtr>,
}

impl SubCursor {
    pub fn new(collection: CollectionName) -> Self {
        SubCursor {
            collection,
            documents: Vec::new(),
        }
    }

    pub fn with_documents(collection: CollectionName, documents: Vec<DocumentPtr>) -> Self {
        SubCursor {
            collection,
            documents,
        }
    }

    pub fn append(&mut self, document: DocumentPtr) {
        self.documents.push(document);
    }

    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn documents(&self) -> &[DocumentPtr] {
        &self.documents
    }
}

/// Aggregated result of one statement.
pub struct Cursor {
    sub_cursors: Vec<Arc<SubCursor>>,
    error: Option<(ErrorCode, String)>,
    /// Names of the physical operators that produced this result, root last
    plan_trace: Vec<String>,
}

impl Cursor {
    pub fn success() -> Self {
        Cursor {
            sub_cursors: Vec::new(),
            error: None,
            plan_trace: Vec::new(),
        }
    }

    pub fn with_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Cursor {
            sub_cursors: Vec::new(),
            error: Some((code, message.into())),
            plan_trace: Vec::new(),
        }
    }

    pub fn push(&mut self, sub_cursor: Arc<SubCursor>) {
        self.sub_cursors.push(sub_cursor);
    }

    pub fn set_plan_trace(&mut self, trace: Vec<String>) {
        self.plan_trace = trace;
    }

    pub fn plan_trace(&self) -> &[String] {
        &self.plan_trace
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error
            .as_ref()
            .map(|(code, _)| *code)
            .unwrap_or(ErrorCode::Success)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(_, message)| message.as_str())
    }

    /// Total documents across sub-cursors.
    pub fn size(&self) -> usize {
        self.sub_cursors.iter().map(|s| s.size()).sum()
    }

    pub fn documents(&self) -> impl Iterator<Item = &DocumentPtr> {
        self.sub_cursors.iter().flat_map(|s| s.documents().iter())
    }

    /// First document, if any (find_one result).
    pub fn first(&self) -> Option<&DocumentPtr> {
        self.documents().next()
    }

    /// Ids of every document in the cursor.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.documents().filter_map(document_id).collect()
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::success()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("size", &self.size())
            .field("error", &self.error)
            .finish()
    }
}
