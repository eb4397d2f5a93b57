// operators/merge.rs
// Combine two child outputs: intersection, union, complement
//
// Intersection walks the smaller side and probes the larger by document
// id; the limit budget is consulted before every probe so a satisfied
// query stops early.

use ahash::AHashSet;

use crate::document::{document_id, DocumentId};
use crate::error::ErrorCode;

use super::{Limit, Operator, OperatorContext, OperatorData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    And,
    Or,
    Not,
}

pub struct MergeOperator {
    kind: MergeKind,
    left: Box<dyn Operator>,
    right: Box<dyn Operator>,
    limit: Limit,
    output: OperatorData,
}

impl MergeOperator {
    pub fn new(
        kind: MergeKind,
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        limit: Limit,
    ) -> Self {
        MergeOperator {
            kind,
            left,
            right,
            limit,
            output: OperatorData::new(),
        }
    }

    fn ids(data: &OperatorData) -> AHashSet<DocumentId> {
        data.documents().iter().filter_map(document_id).collect()
    }

    fn merge_and(&mut self) {
        let (left, right) = match (self.left.output(), self.right.output()) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };
        // walk the smaller side, probe the larger
        let (walk, probe) = if left.len() <= right.len() {
            (left, right)
        } else {
            (right, left)
        };
        let probe_ids = Self::ids(probe);
        for document in walk.documents() {
            if !self.limit.check(self.output.len()) {
                return;
            }
            match document_id(document) {
                Some(id) if probe_ids.contains(&id) => self.output.append(document.clone()),
                _ => {}
            }
        }
    }

    fn merge_or(&mut self) {
        let mut seen = AHashSet::new();
        let sides = [self.left.output(), self.right.output()];
        for side in sides.into_iter().flatten() {
            for document in side.documents() {
                if !self.limit.check(self.output.len()) {
                    return;
                }
                if let Some(id) = document_id(document) {
                    if seen.insert(id) {
                        self.output.append(document.clone());
                    }
                }
            }
        }
    }

    /// Complement: left is the full scan, right the set to subtract.
    fn merge_not(&mut self) {
        let (left, right) = match (self.left.output(), self.right.output()) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };
        let excluded = Self::ids(right);
        for document in left.documents() {
            if !self.limit.check(self.output.len()) {
                return;
            }
            match document_id(document) {
                Some(id) if !excluded.contains(&id) => self.output.append(document.clone()),
                _ => {}
            }
        }
    }
}

impl Operator for MergeOperator {
    fn name(&self) -> &'static str {
        match self.kind {
            MergeKind::And => "merge_and",
            MergeKind::Or => "merge_or",
            MergeKind::Not => "merge_not",
        }
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        if !self.limit.check(0) {
            return ErrorCode::Success; // budget already spent
        }
        let code = self.left.execute(ctx);
        if !code.is_success() {
            return code;
        }
        let code = self.right.execute(ctx);
        if !code.is_success() {
            return code;
        }
        match self.kind {
            MergeKind::And => self.merge_and(),
            MergeKind::Or => self.merge_or(),
            MergeKind::Not => self.merge_not(),
        }
        ErrorCode::Success
    }

    fn output(&self) -> Option<&OperatorData> {
        Some(&self.output)
    }

    fn trace(&self, out: &mut Vec<String>) {
        self.left.trace(out);
        self.right.trace(out);
        out.push(self.name().to_string());
    }
}
