// services/message.rs
// Actor mailbox messages
//
// Every top-level subsystem is a thread draining one crossbeam channel;
// an `Address<M>` is the sending half. Cross-actor interaction is only by
// message send, with replies routed by session id.

use std::sync::Arc;

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collection::CollectionContext;
use crate::cursor::Cursor;
use crate::index::IndexSnapshot;
use crate::plan::LogicalPlan;
use crate::statement::{CollectionName, Parameters, Statement};

pub type Address<M> = Sender<M>;

pub type WalId = u64;

/// Opaque caller-chosen id correlating an async request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// What a client ultimately receives.
pub enum ClientReply {
    Cursor(Cursor),
    LoadFinish,
}

/// One record streamed back from the WAL manager at recovery.
#[derive(Debug, Clone)]
pub struct WalRecord {
    pub id: WalId,
    pub statement: Statement,
}

/// Documents and indexes of one collection as loaded from disk.
pub struct CollectionLoad {
    pub name: CollectionName,
    pub documents: Vec<String>,
    pub indexes: Vec<IndexSnapshot>,
}

/// Everything the disk manager found at boot.
pub struct DiskLoadResult {
    pub databases: Vec<String>,
    pub collections: Vec<CollectionLoad>,
    /// Highest WAL id the snapshot covers; replay starts after it
    pub wal_id: WalId,
}

pub enum DispatcherMsg {
    /// Client entry points
    Load {
        session: SessionId,
        reply: Address<ClientReply>,
    },
    Execute {
        session: SessionId,
        statement: Statement,
        reply: Address<ClientReply>,
    },
    CloseCursor {
        session: SessionId,
        reply: Address<ClientReply>,
    },
    /// Completion callbacks
    ExecuteFinish {
        session: SessionId,
        cursor: Cursor,
    },
    DiskLoadResult {
        session: SessionId,
        result: DiskLoadResult,
    },
    MemoryLoadFinish {
        session: SessionId,
    },
    WalAppended {
        session: SessionId,
        wal_id: WalId,
    },
    WalLoadResult {
        session: SessionId,
        records: Vec<WalRecord>,
    },
    Shutdown,
}

pub enum MemoryStorageMsg {
    ExecutePlan {
        session: SessionId,
        plan: LogicalPlan,
        parameters: Parameters,
        sender: Address<DispatcherMsg>,
    },
    Load {
        session: SessionId,
        result: DiskLoadResult,
        sender: Address<DispatcherMsg>,
    },
    CloseCursor {
        session: SessionId,
    },
    /// Executor completion
    ExecutePlanFinish {
        session: SessionId,
        cursor: Cursor,
    },
    Shutdown,
}

pub enum ExecutorMsg {
    ExecutePlan {
        session: SessionId,
        plan: LogicalPlan,
        parameters: Parameters,
        context: Arc<CollectionContext>,
        sender: Address<MemoryStorageMsg>,
    },
    Shutdown,
}

pub enum WalMsg {
    Append {
        session: SessionId,
        statement: Statement,
        sender: Address<DispatcherMsg>,
    },
    Load {
        session: SessionId,
        after_id: WalId,
        sender: Address<DispatcherMsg>,
    },
    Shutdown,
}

pub enum DiskMsg {
    Load {
        session: SessionId,
        sender: Address<DispatcherMsg>,
    },
    AppendDatabase {
        database: String,
    },
    RemoveDatabase {
        database: String,
    },
    /// Hands the disk manager the live context it snapshots on flush
    RegisterCollection {
        name: CollectionName,
        context: Arc<CollectionContext>,
    },
    RemoveCollection {
        name: CollectionName,
    },
    /// Idempotent: flushing an already-covered id is a no-op
    Flush {
        wal_id: WalId,
    },
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_session_display_is_hex() {
        let s = SessionId::new().to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
