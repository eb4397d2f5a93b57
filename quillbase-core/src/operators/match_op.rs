// operators/match_op.rs
// Filter a child's output by an expression tree

use crate::error::ErrorCode;
use crate::expr::Expr;

use super::{Limit, Operator, OperatorContext, OperatorData};

pub struct MatchOperator {
    child: Box<dyn Operator>,
    expr: Expr,
    limit: Limit,
    output: OperatorData,
}

impl MatchOperator {
    pub fn new(child: Box<dyn Operator>, expr: Expr, limit: Limit) -> Self {
        MatchOperator {
            child,
            expr,
            limit,
            output: OperatorData::new(),
        }
    }
}

impl Operator for MatchOperator {
    fn name(&self) -> &'static str {
        "match"
    }

    fn execute(&mut self, ctx: &OperatorContext) -> ErrorCode {
        let code = self.child.execute(ctx);
        if !code.is_success() {
            return code;
        }
        if let Some(input) = self.child.output() {
            for document in input.documents() {
                if !self.limit.check(self.output.len()) {
                    break;
                }
                if self.expr.matches(document, &ctx.parameters) {
                    self.output.append(document.clone());
                }
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
    use crate::expr::CompareKind;
    use crate::operators::ScanOperator;
    use crate::statement::{CollectionName, Parameters};
    use crate::value::ScalarValue;

    #[test]
    fn test_match_filters_child_output() {
        let collection = CollectionContext::new(CollectionName::new("db", "coll"));
        {
            let mut storage = collection.storage().write();
            for i in 0..20 {
                storage.insert(
                    Document::from_json(&format!(r#"{{"_id": "{:024}", "count": {}}}"#, i, i))
                        .unwrap(),
                );
            }
        }
        let mut parameters = Parameters::default();
        parameters.add(1, ScalarValue::Int(15));
        let ctx = OperatorContext {
            collection,
            parameters,
        };
        let scan = Box::new(ScanOperator::new(None, Limit::unlimited()));
        let mut match_op = MatchOperator::new(
            scan,
            Expr::compare(CompareKind::Gte, "count", 1),
            Limit::unlimited(),
        );
        assert_eq!(match_op.execute(&ctx), ErrorCode::Success);
        assert_eq!(match_op.output().unwrap().len(), 5);

        let mut trace = Vec::new();
        match_op.trace(&mut trace);
        assert_eq!(trace, vec!["scan".to_string(), "match".to_string()]);
    }
}
