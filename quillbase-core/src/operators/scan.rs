// operators/scan.rs
// Full collection scan with predicate pushdown

use crate::error::ErrorCode;
use crate::expr::Expr;

use super::{Limit, Operator, OperatorContext, OperatorData};

/// Emits every document in insertion order. A pushed-down predicate
/// filters inline so a collapsed `match -> scan` pays no extra pass.
pub struct ScanOperator {
    predicate: Option<Expr>,
    limit: Limit,
    output: OperatorData,
}

impl ScanOperator {
    pub fn new(predicate: Option<Expr>, limit: Limit) -> Self {
        ScanOperator {
            predicate,
            limit,
            output: OperatorData::new(),
        }
    }
}

impl Operator for ScanOperator {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let storage = ctx.collection.storage().read();
        for document in storage.iter() {
            if !self.limit.check(self.output.len()) {
                break;
            }
            let keep = match &self.predicate {
                Some(expr) => expr.matches(document, &ctx.parameters),
                None => true,
            };
            if keep {
                self.output.append(document.clone());
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
