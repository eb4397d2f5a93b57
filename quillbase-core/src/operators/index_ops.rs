// operators/index_ops.rs
// create-index / drop-index
//
// A build scans every stored document into the fresh index before the
// index is swapped into the registry, so concurrent readers either see no
// index or the complete one.

use crate::error::ErrorCode;
use crate::index::OrderedIndex;
use crate::statement::{IndexCompare, IndexKind};

use super::{Operator, OperatorContext, OperatorData};

pub struct CreateIndexOperator {
    index_name: String,
    keys: Vec<String>,
    kind: IndexKind,
    compare: IndexCompare,
    output: OperatorData,
}

impl CreateIndexOperator {
    pub fn new(
        index_name: impl Into<String>,
        keys: Vec<String>,
        kind: IndexKind,
        compare: IndexCompare,
    ) -> Self {
        CreateIndexOperator {
            index_name: index_name.into(),
            keys,
            kind,
            compare,
            output: OperatorData::new(),
        }
    }
}

impl Operator for CreateIndexOperator {
    fn name(&self) -> &'static str {
        "create_index"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        {
            let indexes = ctx.collection.indexes().read();
            if indexes.find_by_name(&self.index_name).is_some() {
                return ErrorCode::OtherError;
            }
        }
        let mut index =
            OrderedIndex::new(self.index_name.clone(), self.keys.clone(), self.kind, self.compare);
        let storage = ctx.collection.storage().read();
        for document in storage.iter() {
            index.insert_document(document);
        }
        ctx.collection.indexes().write().emplace(index);
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        out.push(self.name().to_string());
    }
}

pub struct DropIndexOperator {
    index_name: String,
    output: OperatorData,
}

impl DropIndexOperator {
    pub fn new(index_name: impl Into<String>) -> Self {
        DropIndexOperator {
            index_name: index_name.into(),
            output: OperatorData::new(),
        }
    }
}

impl Operator for DropIndexOperator {
    fn name(&self) -> &'static str {
        "drop_index"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        if ctx.collection.indexes().write().drop_index(&self.index_name) {
            ErrorCode::Success
        } else {
            ErrorCode::OtherError
        }
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        out.push(self.name().to_string());
    }
}
