// operators/index_scan.rs
// Range scan through the index engine

use crate::error::ErrorCode;
use crate::expr::CompareKind;
use crate::statement::ParamId;

use super::{Limit, Operator, OperatorContext, OperatorData};

/// Resolves a single compare leaf against an ordered index instead of
/// scanning. The translator only emits this when the collection has an
/// index whose key tuple matches the field.
pub struct IndexScanOperator {
    field: String,
    kind: CompareKind,
    param: ParamId,
    limit: Limit,
    output: OperatorData,
}

impl IndexScanOperator {
    pub fn new(field: impl Into<String>, kind: CompareKind, param: ParamId, limit: Limit) -> Self {
        IndexScanOperator {
            field: field.into(),
            kind,
            param,
            limit,
            output: OperatorData::new(),
        }
    }
}

impl Operator for IndexScanOperator {
    fn name(&self) -> &'static str {
        "index_scan"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let value = match ctx.parameters.get(self.param) {
            Some(value) => value.clone(),
            None => return ErrorCode::OtherError,
        };
        let ids = {
            let indexes = ctx.collection.indexes().read();
            match indexes.find_by_field(&self.field) {
                Some(index) => index.find_range(self.kind, &value),
                None => return ErrorCode::OtherError,
            }
        };
        let storage = ctx.collection.storage().read();
        for id in ids {
            if !self.limit.check(self.output.len()) {
                break;
            }
            if let Some(document) = storage.get(&id) {
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
