// operators/mutate.rs
// insert / update / delete
//
// Mutating operators keep the index engine in step with document storage:
// updates re-file a document around the in-place write, deletes unfile it.

use std::sync::Arc;

use crate::document::{self, DocumentId, DocumentPtr};
use crate::error::ErrorCode;

use super::{Operator, OperatorContext, OperatorData};

/// Appends documents to the collection and maintains every index. A
/// document without `/_id` gets a generated one; a duplicate id is
/// silently skipped (the stored document wins).
pub struct InsertOperator {
    documents: Vec<DocumentPtr>,
    output: OperatorData,
}

impl InsertOperator {
    pub fn new(documents: Vec<DocumentPtr>) -> Self {
        InsertOperator {
            documents,
            output: OperatorData::new(),
        }
    }
}

impl Operator for InsertOperator {
    fn name(&self) -> &'static str {
        "insert"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let mut storage = ctx.collection.storage().write();
        let mut indexes = ctx.collection.indexes().write();
        for document in self.documents.drain(..) {
            if !document.is_exists("/_id") {
                document.set("/_id", DocumentId::generate().as_str());
            }
            if storage.insert(Arc::clone(&document)).is_some() {
                indexes.insert_document(&document);
                self.output.append(document);
            }
        }
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        out.push(self.name().to_string());
    }
}

/// Applies a `$set`/`$inc` update document to each input document and
/// emits the ones whose state changed. With `upsert`, an empty input
/// stream constructs a fresh document from the update and inserts it.
pub struct UpdateOperator {
    child: Box<dyn Operator>,
    update: DocumentPtr,
    upsert: bool,
    output: OperatorData,
    upserted: Option<DocumentId>,
}

impl UpdateOperator {
    pub fn new(child: Box<dyn Operator>, update: DocumentPtr, upsert: bool) -> Self {
        UpdateOperator {
            child,
            update,
            upsert,
            output: OperatorData::new(),
            upserted: None,
        }
    }

    /// Id of the document an upsert inserted, if one was.
    pub fn upserted_id(&self) -> Option<&DocumentId> {
        self.upserted.as_ref()
    }
}

impl Operator for UpdateOperator {
    fn name(&self) -> &'static str {
        "update"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let code = self.child.execute(ctx);
        if !code.is_success() {
            return code;
        }
        let input: Vec<DocumentPtr> = self
            .child
            .output()
            .map(|data| data.documents().to_vec())
            .unwrap_or_default();

        if input.is_empty() {
            if self.upsert {
                let fresh = document::make_upsert_document(&self.update);
                let mut storage = ctx.collection.storage().write();
                let mut indexes = ctx.collection.indexes().write();
                if let Some(id) = storage.insert(Arc::clone(&fresh)) {
                    indexes.insert_document(&fresh);
                    self.upserted = Some(id);
                    self.output.append(fresh);
                }
            }
            return ErrorCode::Success;
        }

        let mut indexes = ctx.collection.indexes().write();
        for document in input {
            indexes.remove_document(&document);
            let changed = document.update(&self.update);
            indexes.insert_document(&document);
            if changed {
                self.output.append(document);
            }
        }
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        self.child.trace(out);
        out.push(self.name().to_string());
    }
}

/// Removes each input document from storage and from every index.
pub struct DeleteOperator {
    child: Box<dyn Operator>,
    output: OperatorData,
}

impl DeleteOperator {
    pub fn new(child: Box<dyn Operator>) -> Self {
        DeleteOperator {
            child,
            output: OperatorData::new(),
        }
    }
}

impl Operator for DeleteOperator {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let code = self.child.execute(ctx);
        if !code.is_success() {
            return code;
        }
        let input: Vec<DocumentPtr> = self
            .child
            .output()
            .map(|data| data.documents().to_vec())
            .unwrap_or_default();
        let mut storage = ctx.collection.storage().write();
        let mut indexes = ctx.collection.indexes().write();
        for document in input {
            let id = match document::document_id(&document) {
                Some(id) => id,
                None => continue,
            };
            if storage.remove(&id).is_some() {
                indexes.remove_document(&document);
                self.output.append(document);
            }
        }
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        self.child.trace(out);
        out.push(self.name().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionContext;
    use crate::document::Document;
    use crate::expr::{CompareKind, Expr};
    use crate::operators::{Limit, ScanOperator};
    use crate::statement::{CollectionName, Parameters};
    use crate::value::ScalarValue;

    fn empty_ctx() -> OperatorContext {
        OperatorContext {
            collection: CollectionContext::new(CollectionName::new("db", "coll")),
            parameters: Parameters::default(),
        }
    }

    fn doc(id: &str, count: i64) -> DocumentPtr {
        Document::from_json(&format!(r#"{{"_id": "{}", "count": {}}}"#, id, count)).unwrap()
    }

    #[test]
    fn test_insert_emits_inserted_documents() {
        let ctx = empty_ctx();
        let mut insert = InsertOperator::new(vec![doc("a", 1), doc("b", 2)]);
        assert_eq!(insert.execute(&ctx), ErrorCode::Success);
        assert_eq!(insert.output().unwrap().len(), 2);
        assert_eq!(ctx.collection.size(), 2);
    }

    #[test]
    fn test_insert_skips_duplicate_ids() {
        let ctx = empty_ctx();
        InsertOperator::new(vec![doc("a", 1)]).execute(&ctx);
        let mut second = InsertOperator::new(vec![doc("a", 99), doc("b", 2)]);
        second.execute(&ctx);
        assert_eq!(second.output().unwrap().len(), 1);
        assert_eq!(ctx.collection.size(), 2);
        // stored document wins
        let stored = ctx
            .collection
            .storage()
            .read()
            .get(&DocumentId::new("a"))
            .unwrap();
        assert_eq!(stored.get_long("/count"), Some(1));
    }

    #[test]
    fn test_insert_generates_missing_id() {
        let ctx = empty_ctx();
        let no_id = Document::from_json(r#"{"count": 5}"#).unwrap();
        let mut insert = InsertOperator::new(vec![no_id]);
        insert.execute(&ctx);
        let out = insert.output().unwrap();
        assert_eq!(out.len(), 1);
        assert!(out.documents()[0].is_exists("/_id"));
    }

    fn filtered_scan(param: u16) -> Box<dyn Operator> {
        Box::new(ScanOperator::new(
            Some(Expr::compare(CompareKind::Eq, "count", param)),
            Limit::unlimited(),
        ))
    }

    #[test]
    fn test_update_emits_only_changed() {
        let ctx = empty_ctx();
        InsertOperator::new(vec![doc("a", 1)]).execute(&ctx);
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(1));
        let ctx = OperatorContext {
            collection: ctx.collection,
            parameters,
        };

        let same = Document::from_json(r#"{"$set": {"count": 1}}"#).unwrap();
        let mut update = UpdateOperator::new(filtered_scan(1), same, false);
        update.execute(&ctx);
        assert_eq!(update.output().unwrap().len(), 0);

        let changed = Document::from_json(r#"{"$set": {"count": 2}}"#).unwrap();
        let mut update = UpdateOperator::new(filtered_scan(1), changed, false);
        update.execute(&ctx);
        assert_eq!(update.output().unwrap().len(), 1);
    }

    #[test]
    fn test_update_refiles_indexes() {
        use crate::index::OrderedIndex;
        use crate::statement::{IndexCompare, IndexKind};

        let ctx = empty_ctx();
        ctx.collection.indexes().write().emplace(OrderedIndex::new(
            "count_idx",
            vec!["count".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        InsertOperator::new(vec![doc("a", 1)]).execute(&ctx);
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(1));
        let ctx = OperatorContext {
            collection: ctx.collection,
            parameters,
        };
        let bump = Document::from_json(r#"{"$set": {"count": 5}}"#).unwrap();
        UpdateOperator::new(filtered_scan(1), bump, false).execute(&ctx);

        let indexes = ctx.collection.indexes().read();
        let index = indexes.find_by_field("count").unwrap();
        assert!(index.find_exact(&ScalarValue::Int(1)).is_empty());
        assert_eq!(index.find_exact(&ScalarValue::Int(5)).len(), 1);
    }

    #[test]
    fn test_upsert_on_empty_input() {
        let ctx = empty_ctx();
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(42));
        let ctx = OperatorContext {
            collection: ctx.collection,
            parameters,
        };
        let update = Document::from_json(r#"{"$set": {"count": 42}}"#).unwrap();
        let mut op = UpdateOperator::new(filtered_scan(1), update, true);
        op.execute(&ctx);
        assert_eq!(op.output().unwrap().len(), 1);
        assert!(op.upserted_id().is_some());
        assert_eq!(ctx.collection.size(), 1);
    }

    #[test]
    fn test_delete_removes_from_storage_and_indexes() {
        use crate::index::OrderedIndex;
        use crate::statement::{IndexCompare, IndexKind};

        let ctx = empty_ctx();
        ctx.collection.indexes().write().emplace(OrderedIndex::new(
            "count_idx",
            vec!["count".into()],
            IndexKind::Memory,
            IndexCompare::Eq,
        ));
        InsertOperator::new(vec![doc("a", 1), doc("b", 2)]).execute(&ctx);
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(1));
        let ctx = OperatorContext {
            collection: ctx.collection,
            parameters,
        };
        let mut delete = DeleteOperator::new(filtered_scan(1));
        delete.execute(&ctx);
        assert_eq!(delete.output().unwrap().len(), 1);
        assert_eq!(ctx.collection.size(), 1);
        let indexes = ctx.collection.indexes().read();
        assert!(indexes
            .find_by_field("count")
            .unwrap()
            .find_exact(&ScalarValue::Int(1))
            .is_empty());
    }
}
