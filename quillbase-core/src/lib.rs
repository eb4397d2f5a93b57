// quillbase-core/src/lib.rs
// Embeddable document database engine

#![allow(clippy::too_many_arguments)]
#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]
#![allow(clippy::result_large_err)]
#![cfg_attr(test, allow(dead_code))]

pub mod collection;
pub mod config;
pub mod cursor;
pub mod document;
pub mod engine;
pub mod error;
pub mod expr;
pub mod index;
pub mod logging;
pub mod operators;
pub mod plan;
pub mod services;
pub mod statement;
pub mod types;
pub mod value;

// Public exports
pub use collection::{CollectionContext, DocumentStorage};
pub use config::{Config, Durability};
pub use cursor::{Cursor, SubCursor};
pub use document::{document_id, make_upsert_document, Document, DocumentId, DocumentPtr};
pub use engine::Engine;
pub use error::{ErrorCode, QuillBaseError, Result};
pub use expr::{CompareKind, Expr, UnionKind};
pub use index::{IndexEngine, IndexSnapshot, OrderedIndex};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use operators::Limit;
pub use plan::{AggregateKind, LogicalPlan};
pub use services::{SessionId, WalId, WalManager};
pub use statement::{
    CollectionName, DocumentPayload, IndexCompare, IndexKind, Parameters, Statement, StatementKind,
};
pub use types::{LogicalType, PhysicalType};
pub use value::ScalarValue;
