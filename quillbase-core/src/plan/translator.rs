// plan/translator.rs
// Logical -> physical translation
//
// Purely structural, with two courtesies: a match over a scan collapses
// into a predicated scan (or an index scan when the collection has an
// index on the compared field), and the user limit rides down through
// match and merge nodes. Sort is recorded for the executor to apply to
// the final buffer.

use std::sync::Arc;

use crate::collection::CollectionContext;
use crate::error::ErrorCode;
use crate::expr::{CompareKind, Expr, UnionKind};
use crate::operators::{
    AggregateOperator, CreateIndexOperator, DeleteOperator, DropIndexOperator, IndexScanOperator,
    InsertOperator, Limit, MatchOperator, MergeKind, MergeOperator, Operator, ScanOperator,
    UpdateOperator,
};

use super::logical::{LogicalPlan, PlanStep, SortStep};

pub struct PhysicalPlan {
    pub root: Box<dyn Operator>,
    /// Applied by the executor to the root's output buffer
    pub sort: Option<SortStep>,
}

impl PhysicalPlan {
    pub fn trace(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.trace(&mut out);
        out
    }
}

/// Materialize the operator tree for a DML plan. DDL and `size` never
/// reach the translator.
pub fn create_physical_plan(
    collection: &Arc<CollectionContext>,
    plan: &LogicalPlan,
) -> Result<PhysicalPlan, ErrorCode> {
    match plan {
        LogicalPlan::Insert { documents, .. } => Ok(PhysicalPlan {
            root: Box::new(InsertOperator::new(documents.clone())),
            sort: None,
        }),
        LogicalPlan::Delete { steps, limit, .. } => {
            let (input, sort) = build_read_pipeline(collection, steps, *limit);
            Ok(PhysicalPlan {
                root: Box::new(DeleteOperator::new(input)),
                sort,
            })
        }
        LogicalPlan::Update {
            steps,
            update,
            upsert,
            limit,
            ..
        } => {
            let (input, sort) = build_read_pipeline(collection, steps, *limit);
            Ok(PhysicalPlan {
                root: Box::new(UpdateOperator::new(input, Arc::clone(update), *upsert)),
                sort,
            })
        }
        LogicalPlan::Aggregate { steps, limit, .. } => {
            let (root, sort) = build_read_pipeline(collection, steps, *limit);
            Ok(PhysicalPlan { root, sort })
        }
        LogicalPlan::CreateIndex {
            index_name,
            keys,
            kind,
            compare,
            ..
        } => Ok(PhysicalPlan {
            root: Box::new(CreateIndexOperator::new(
                index_name.clone(),
                keys.clone(),
                *kind,
                *compare,
            )),
            sort: None,
        }),
        LogicalPlan::DropIndex { index_name, .. } => Ok(PhysicalPlan {
            root: Box::new(DropIndexOperator::new(index_name.clone())),
            sort: None,
        }),
        LogicalPlan::CreateDatabase { .. }
        | LogicalPlan::DropDatabase { .. }
        | LogicalPlan::CreateCollection { .. }
        | LogicalPlan::DropCollection { .. }
        | LogicalPlan::Size { .. } => Err(ErrorCode::OtherError),
    }
}

fn build_read_pipeline(
    collection: &Arc<CollectionContext>,
    steps: &[PlanStep],
    limit: Limit,
) -> (Box<dyn Operator>, Option<SortStep>) {
    let mut source: Option<Box<dyn Operator>> = None;
    let mut sort = None;
    for step in steps {
        match step {
            PlanStep::Match { expr: None } => {}
            PlanStep::Match { expr: Some(expr) } => {
                source = Some(match source.take() {
                    // first match collapses into the access path
                    None => translate_expr(collection, expr, limit),
                    Some(child) => Box::new(MatchOperator::new(child, expr.clone(), limit)),
                });
            }
            PlanStep::Group(group) => {
                let child = source.take().unwrap_or_else(|| {
                    Box::new(ScanOperator::new(None, Limit::unlimited()))
                });
                source = Some(Box::new(AggregateOperator::new(
                    group.aggregate,
                    group.key.clone(),
                    child,
                )));
            }
            PlanStep::Sort(step) => sort = Some(step.clone()),
        }
    }
    let root = source.unwrap_or_else(|| Box::new(ScanOperator::new(None, limit)));
    (root, sort)
}

/// Access path for one expression tree. A lone compare goes through an
/// index when one is declared on the field; unions become merge nodes
/// whose children scan independently (the merge holds the budget).
fn translate_expr(
    collection: &Arc<CollectionContext>,
    expr: &Expr,
    limit: Limit,
) -> Box<dyn Operator> {
    match expr {
        Expr::Compare { field, kind, param } => {
            let indexed = *kind != CompareKind::Regex
                && collection.indexes().read().find_by_field(field).is_some();
            if indexed {
                Box::new(IndexScanOperator::new(field.clone(), *kind, *param, limit))
            } else {
                Box::new(ScanOperator::new(Some(expr.clone()), limit))
            }
        }
        Expr::Union { kind, children } => {
            if children.is_empty() {
                return Box::new(ScanOperator::new(None, limit));
            }
            match kind {
                UnionKind::And if children.len() > 1 => {
                    fold_merge(collection, children, MergeKind::And, limit)
                }
                UnionKind::Or if children.len() > 1 => {
                    fold_merge(collection, children, MergeKind::Or, limit)
                }
                // a one-child conjunction or disjunction is just the child
                UnionKind::And | UnionKind::Or => {
                    translate_expr(collection, &children[0], limit)
                }
                UnionKind::Not => {
                    let everything = Box::new(ScanOperator::new(None, Limit::unlimited()));
                    let excluded = if children.len() == 1 {
                        translate_expr(collection, &children[0], Limit::unlimited())
                    } else {
                        fold_merge(collection, children, MergeKind::Or, Limit::unlimited())
                    };
                    Box::new(MergeOperator::new(MergeKind::Not, everything, excluded, limit))
                }
            }
        }
    }
}

/// Left-fold children into a merge chain; only the outermost merge
/// carries the caller's budget. Callers guarantee at least two children.
fn fold_merge(
    collection: &Arc<CollectionContext>,
    children: &[Expr],
    kind: MergeKind,
    limit: Limit,
) -> Box<dyn Operator> {
    let mut merged = translate_expr(collection, &children[0], Limit::unlimited());
    for (i, child) in children.iter().enumerate().skip(1) {
        let merge_limit = if i == children.len() - 1 {
            limit
        } else {
            Limit::unlimited()
        };
        let right = translate_expr(collection, child, Limit::unlimited());
        merged = Box::new(MergeOperator::new(kind, merged, right, merge_limit));
    }
    merged
}
