// plan/logical.rs
// Logical plan trees
//
// The dispatcher translates statements into these before anything touches
// a collection. DDL nodes are executed inline by the memory storage
// service; everything else becomes a physical operator tree.

use std::sync::Arc;

use crate::document::DocumentPtr;
use crate::expr::Expr;
use crate::operators::Limit;
use crate::statement::{
    CollectionName, DatabaseName, IndexCompare, IndexKind, Parameters, Statement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateKind {
    /// Output key of the one-row aggregate document.
    pub fn key(&self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::Avg => "avg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupStep {
    pub aggregate: AggregateKind,
    /// Field the aggregate reads; unused by `count`
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct SortStep {
    pub key: String,
    pub ascending: bool,
}

/// One stage of a read pipeline.
#[derive(Debug, Clone)]
pub enum PlanStep {
    Match { expr: Option<Expr> },
    Group(GroupStep),
    Sort(SortStep),
}

#[derive(Debug, Clone)]
pub enum LogicalPlan {
    CreateDatabase {
        database: DatabaseName,
    },
    DropDatabase {
        database: DatabaseName,
    },
    CreateCollection {
        name: CollectionName,
    },
    DropCollection {
        name: CollectionName,
    },
    Insert {
        name: CollectionName,
        documents: Vec<DocumentPtr>,
    },
    Delete {
        name: CollectionName,
        steps: Vec<PlanStep>,
        limit: Limit,
    },
    Update {
        name: CollectionName,
        steps: Vec<PlanStep>,
        update: DocumentPtr,
        upsert: bool,
        limit: Limit,
    },
    Aggregate {
        name: CollectionName,
        steps: Vec<PlanStep>,
        limit: Limit,
    },
    CreateIndex {
        name: CollectionName,
        index_name: String,
        keys: Vec<String>,
        kind: IndexKind,
        compare: IndexCompare,
    },
    DropIndex {
        name: CollectionName,
        index_name: String,
    },
    Size {
        name: CollectionName,
    },
}

impl LogicalPlan {
    /// DDL executes inline in memory storage; it never reaches the
    /// executor.
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            LogicalPlan::CreateDatabase { .. }
                | LogicalPlan::DropDatabase { .. }
                | LogicalPlan::CreateCollection { .. }
                | LogicalPlan::DropCollection { .. }
        )
    }

    pub fn collection(&self) -> Option<&CollectionName> {
        match self {
            LogicalPlan::CreateDatabase { .. } | LogicalPlan::DropDatabase { .. } => None,
            LogicalPlan::CreateCollection { name }
            | LogicalPlan::DropCollection { name }
            | LogicalPlan::Insert { name, .. }
            | LogicalPlan::Delete { name, .. }
            | LogicalPlan::Update { name, .. }
            | LogicalPlan::Aggregate { name, .. }
            | LogicalPlan::CreateIndex { name, .. }
            | LogicalPlan::DropIndex { name, .. }
            | LogicalPlan::Size { name } => Some(name),
        }
    }
}

/// Statement -> logical plan. Purely structural; parameters travel on the
/// side so the produced tree is cacheable.
pub fn from_statement(statement: &Statement) -> (LogicalPlan, Parameters) {
    match statement {
        Statement::CreateDatabase { database } => (
            LogicalPlan::CreateDatabase {
                database: database.clone(),
            },
            Parameters::default(),
        ),
        Statement::DropDatabase { database } => (
            LogicalPlan::DropDatabase {
                database: database.clone(),
            },
            Parameters::default(),
        ),
        Statement::CreateCollection { name } => (
            LogicalPlan::CreateCollection { name: name.clone() },
            Parameters::default(),
        ),
        Statement::DropCollection { name } => (
            LogicalPlan::DropCollection { name: name.clone() },
            Parameters::default(),
        ),
        Statement::InsertOne { name, document } => (
            LogicalPlan::Insert {
                name: name.clone(),
                documents: vec![Arc::clone(&document.0)],
            },
            Parameters::default(),
        ),
        Statement::InsertMany { name, documents } => (
            LogicalPlan::Insert {
                name: name.clone(),
                documents: documents.iter().map(|d| Arc::clone(&d.0)).collect(),
            },
            Parameters::default(),
        ),
        Statement::DeleteOne {
            name,
            condition,
            parameters,
        } => (
            LogicalPlan::Delete {
                name: name.clone(),
                steps: match_steps(condition),
                limit: Limit::one(),
            },
            parameters.clone(),
        ),
        Statement::DeleteMany {
            name,
            condition,
            parameters,
        } => (
            LogicalPlan::Delete {
                name: name.clone(),
                steps: match_steps(condition),
                limit: Limit::unlimited(),
            },
            parameters.clone(),
        ),
        Statement::UpdateOne {
            name,
            condition,
            parameters,
            update,
            upsert,
        } => (
            LogicalPlan::Update {
                name: name.clone(),
                steps: match_steps(condition),
                update: Arc::clone(&update.0),
                upsert: *upsert,
                limit: Limit::one(),
            },
            parameters.clone(),
        ),
        Statement::UpdateMany {
            name,
            condition,
            parameters,
            update,
            upsert,
        } => (
            LogicalPlan::Update {
                name: name.clone(),
                steps: match_steps(condition),
                update: Arc::clone(&update.0),
                upsert: *upsert,
                limit: Limit::unlimited(),
            },
            parameters.clone(),
        ),
        Statement::CreateIndex {
            name,
            index_name,
            keys,
            kind,
            compare,
        } => (
            LogicalPlan::CreateIndex {
                name: name.clone(),
                index_name: index_name.clone(),
                keys: keys.clone(),
                kind: *kind,
                compare: *compare,
            },
            Parameters::default(),
        ),
        Statement::DropIndex { name, index_name } => (
            LogicalPlan::DropIndex {
                name: name.clone(),
                index_name: index_name.clone(),
            },
            Parameters::default(),
        ),
        Statement::Find {
            name,
            condition,
            parameters,
            limit,
        } => (
            LogicalPlan::Aggregate {
                name: name.clone(),
                steps: match_steps(condition),
                limit: Limit::new(*limit),
            },
            parameters.clone(),
        ),
        Statement::FindOne {
            name,
            condition,
            parameters,
        } => (
            LogicalPlan::Aggregate {
                name: name.clone(),
                steps: match_steps(condition),
                limit: Limit::one(),
            },
            parameters.clone(),
        ),
        Statement::Size { name } => (
            LogicalPlan::Size { name: name.clone() },
            Parameters::default(),
        ),
    }
}

fn match_steps(condition: &Option<Expr>) -> Vec<PlanStep> {
    match condition {
        Some(expr) => vec![PlanStep::Match {
            expr: Some(expr.clone()),
        }],
        None => Vec::new(),
    }
}
