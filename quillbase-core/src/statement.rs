// statement.rs
// Wire / WAL statement values
//
// Statements are what clients submit and what the WAL persists. They are
// plain serde values; embedded documents serialize as their JSON text so a
// WAL payload is self-describing.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::document::{Document, DocumentPtr};
use crate::expr::Expr;
use crate::value::ScalarValue;

pub type DatabaseName = String;

/// Fully qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionName {
    pub database: String,
    pub collection: String,
}

impl CollectionName {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        CollectionName {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.database, self.collection)
    }
}

pub type ParamId = u16;

/// Side-band parameter store keeping plan trees literal-free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    params: HashMap<ParamId, ScalarValue>,
}

impl Parameters {
    pub fn add(&mut self, id: ParamId, value: impl Into<ScalarValue>) {
        self.params.insert(id, value.into());
    }

    pub fn get(&self, id: ParamId) -> Option<&ScalarValue> {
        self.params.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A document embedded in a statement; serializes as JSON text.
#[derive(Clone)]
pub struct DocumentPayload(pub DocumentPtr);

impl std::fmt::Debug for DocumentPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.to_json())
    }
}

impl Serialize for DocumentPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_json())
    }
}

impl<'de> Deserialize<'de> for DocumentPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Document::from_json(&text)
            .map(DocumentPayload)
            .map_err(|e| D::Error::custom(e.to_string()))
    }
}

/// Statement kinds as stored in WAL record headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatementKind {
    CreateDatabase = 0x01,
    DropDatabase = 0x02,
    CreateCollection = 0x03,
    DropCollection = 0x04,
    InsertOne = 0x05,
    InsertMany = 0x06,
    DeleteOne = 0x07,
    DeleteMany = 0x08,
    UpdateOne = 0x09,
    UpdateMany = 0x0A,
    CreateIndex = 0x0B,
    DropIndex = 0x0C,
    // read-only kinds never reach the WAL
    Find = 0x20,
    FindOne = 0x21,
    Size = 0x22,
}

impl StatementKind {
    pub fn from_u8(value: u8) -> Option<StatementKind> {
        match value {
            0x01 => Some(StatementKind::CreateDatabase),
            0x02 => Some(StatementKind::DropDatabase),
            0x03 => Some(StatementKind::CreateCollection),
            0x04 => Some(StatementKind::DropCollection),
            0x05 => Some(StatementKind::InsertOne),
            0x06 => Some(StatementKind::InsertMany),
            0x07 => Some(StatementKind::DeleteOne),
            0x08 => Some(StatementKind::DeleteMany),
            0x09 => Some(StatementKind::UpdateOne),
            0x0A => Some(StatementKind::UpdateMany),
            0x0B => Some(StatementKind::CreateIndex),
            0x0C => Some(StatementKind::DropIndex),
            0x20 => Some(StatementKind::Find),
            0x21 => Some(StatementKind::FindOne),
            0x22 => Some(StatementKind::Size),
            _ => None,
        }
    }
}

/// Kind of compare an index is declared to accelerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexCompare {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// Backing store of an index. A disk-backed index is persisted with its
/// entries on flush; an in-memory one keeps only its definition on disk
/// and rebuilds from the documents at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Memory,
    Disk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
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
    InsertOne {
        name: CollectionName,
        document: DocumentPayload,
    },
    InsertMany {
        name: CollectionName,
        documents: Vec<DocumentPayload>,
    },
    DeleteOne {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
    },
    DeleteMany {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
    },
    UpdateOne {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
        update: DocumentPayload,
        upsert: bool,
    },
    UpdateMany {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
        update: DocumentPayload,
        upsert: bool,
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
    Find {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
        limit: i64,
    },
    FindOne {
        name: CollectionName,
        condition: Option<Expr>,
        parameters: Parameters,
    },
    Size {
        name: CollectionName,
    },
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateDatabase { .. } => StatementKind::CreateDatabase,
            Statement::DropDatabase { .. } => StatementKind::DropDatabase,
            Statement::CreateCollection { .. } => StatementKind::CreateCollection,
            Statement::DropCollection { .. } => StatementKind::DropCollection,
            Statement::InsertOne { .. } => StatementKind::InsertOne,
            Statement::InsertMany { .. } => StatementKind::InsertMany,
            Statement::DeleteOne { .. } => StatementKind::DeleteOne,
            Statement::DeleteMany { .. } => StatementKind::DeleteMany,
            Statement::UpdateOne { .. } => StatementKind::UpdateOne,
            Statement::UpdateMany { .. } => StatementKind::UpdateMany,
            Statement::CreateIndex { .. } => StatementKind::CreateIndex,
            Statement::DropIndex { .. } => StatementKind::DropIndex,
            Statement::Find { .. } => StatementKind::Find,
            Statement::FindOne { .. } => StatementKind::FindOne,
            Statement::Size { .. } => StatementKind::Size,
        }
    }

    /// Whether this statement changes state and therefore reaches the WAL.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Statement::Find { .. } | Statement::FindOne { .. } | Statement::Size { .. }
        )
    }

    pub fn database(&self) -> &str {
        match self {
            Statement::CreateDatabase { database } | Statement::DropDatabase { database } => database,
            other => &other.collection_name().database,
        }
    }

    fn collection_name(&self) -> &CollectionName {
        match self {
            Statement::CreateCollection { name }
            | Statement::DropCollection { name }
            | Statement::InsertOne { name, .. }
            | Statement::InsertMany { name, .. }
            | Statement::DeleteOne { name, .. }
            | Statement::DeleteMany { name, .. }
            | Statement::UpdateOne { name, .. }
            | Statement::UpdateMany { name, .. }
            | Statement::CreateIndex { name, .. }
            | Statement::DropIndex { name, .. }
            | Statement::Find { name, .. }
            | Statement::FindOne { name, .. }
            | Statement::Size { name, .. } => name,
            Statement::CreateDatabase { .. } | Statement::DropDatabase { .. } => {
                unreachable!("database statements carry no collection")
            }
        }
    }

    /// The side-band parameter store the statement travels with.
    pub fn parameters(&self) -> Parameters {
        match self {
            Statement::DeleteOne { parameters, .. }
            | Statement::DeleteMany { parameters, .. }
            | Statement::UpdateOne { parameters, .. }
            | Statement::UpdateMany { parameters, .. }
            | Statement::Find { parameters, .. }
            | Statement::FindOne { parameters, .. } => parameters.clone(),
            _ => Parameters::default(),
        }
    }

    /// Collection a statement addresses; database-level DDL has none.
    pub fn collection(&self) -> Option<&CollectionName> {
        match self {
            Statement::CreateDatabase { .. } | Statement::DropDatabase { .. } => None,
            other => Some(other.collection_name()),
        }
    }
}
