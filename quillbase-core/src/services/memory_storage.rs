// services/memory_storage.rs
// Memory storage service
//
// Sole owner of the database set and the collection map. DDL executes
// inline against the local maps; DML is handed to the executor together
// with the addressed collection context. Completion flows back through
// this actor so its session bookkeeping stays consistent.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;

use ahash::AHashMap;
use crossbeam::channel::{unbounded, Receiver};

use crate::collection::CollectionContext;
use crate::cursor::{Cursor, SubCursor};
use crate::document::Document;
use crate::error::ErrorCode;
use crate::index::{IndexEngine, OrderedIndex};
use crate::plan::LogicalPlan;
use crate::statement::{CollectionName, Parameters};
use crate::{log_debug, log_trace, log_warn};

use super::message::{
    Address, DiskLoadResult, DiskMsg, DispatcherMsg, ExecutorMsg, MemoryStorageMsg, SessionId,
};

struct MemorySession {
    sender: Address<DispatcherMsg>,
}

struct MemoryStorageService {
    databases: HashSet<String>,
    collections: AHashMap<CollectionName, Arc<CollectionContext>>,
    executor: Address<ExecutorMsg>,
    disk: Address<DiskMsg>,
    self_address: Address<MemoryStorageMsg>,
    sessions: AHashMap<SessionId, MemorySession>,
}

impl MemoryStorageService {
    fn reply(
        &self,
        sender: &Address<DispatcherMsg>,
        session: SessionId,
        cursor: Cursor,
    ) {
        let _ = sender.send(DispatcherMsg::ExecuteFinish { session, cursor });
    }

    fn check_database(&self, database: &str) -> Option<Cursor> {
        if self.databases.contains(database) {
            None
        } else {
            Some(Cursor::with_error(
                ErrorCode::DatabaseNotExists,
                "database not exists",
            ))
        }
    }

    fn check_collection(&self, name: &CollectionName) -> Option<Cursor> {
        if let Some(cursor) = self.check_database(&name.database) {
            return Some(cursor);
        }
        if !self.collections.contains_key(name) {
            return Some(Cursor::with_error(
                ErrorCode::CollectionNotExists,
                "collection not exists",
            ));
        }
        None
    }

    fn create_database(&mut self, database: &str) -> Cursor {
        log_trace!("memory_storage: create_database {}", database);
        if self.databases.contains(database) {
            return Cursor::with_error(ErrorCode::DatabaseAlreadyExists, "database already exists");
        }
        self.databases.insert(database.to_string());
        Cursor::success()
    }

    fn drop_database(&mut self, database: &str) -> Cursor {
        log_trace!("memory_storage: drop_database {}", database);
        if let Some(cursor) = self.check_database(database) {
            return cursor;
        }
        self.databases.remove(database);
        let doomed: Vec<CollectionName> = self
            .collections
            .keys()
            .filter(|name| name.database == database)
            .cloned()
            .collect();
        for name in doomed {
            if let Some(context) = self.collections.remove(&name) {
                context.drop_collection();
            }
        }
        Cursor::success()
    }

    fn create_collection(&mut self, name: &CollectionName) -> Cursor {
        log_trace!("memory_storage: create_collection {}", name);
        if let Some(cursor) = self.check_database(&name.database) {
            return cursor;
        }
        if self.collections.contains_key(name) {
            return Cursor::with_error(
                ErrorCode::CollectionAlreadyExists,
                "collection already exists",
            );
        }
        let context = CollectionContext::new(name.clone());
        self.collections.insert(name.clone(), Arc::clone(&context));
        let _ = self.disk.send(DiskMsg::RegisterCollection {
            name: name.clone(),
            context,
        });
        Cursor::success()
    }

    fn drop_collection(&mut self, name: &CollectionName) -> Cursor {
        log_trace!("memory_storage: drop_collection {}", name);
        if let Some(cursor) = self.check_collection(name) {
            return cursor;
        }
        if let Some(context) = self.collections.remove(name) {
            context.drop_collection();
        }
        Cursor::success()
    }

    fn size(&self, name: &CollectionName) -> Cursor {
        if let Some(cursor) = self.check_collection(name) {
            return cursor;
        }
        let context = &self.collections[name];
        if context.is_dropped() {
            return Cursor::with_error(ErrorCode::CollectionDropped, "collection dropped");
        }
        let documents = context.storage().read().iter().cloned().collect();
        let mut cursor = Cursor::success();
        cursor.push(Arc::new(SubCursor::with_documents(name.clone(), documents)));
        cursor
    }

    fn execute_plan(
        &mut self,
        session: SessionId,
        plan: LogicalPlan,
        parameters: Parameters,
        sender: Address<DispatcherMsg>,
    ) {
        match &plan {
            LogicalPlan::CreateDatabase { database } => {
                let cursor = self.create_database(database);
                self.reply(&sender, session, cursor);
            }
            LogicalPlan::DropDatabase { database } => {
                let cursor = self.drop_database(database);
                self.reply(&sender, session, cursor);
            }
            LogicalPlan::CreateCollection { name } => {
                let cursor = self.create_collection(name);
                self.reply(&sender, session, cursor);
            }
            LogicalPlan::DropCollection { name } => {
                let cursor = self.drop_collection(name);
                self.reply(&sender, session, cursor);
            }
            LogicalPlan::Size { name } => {
                let cursor = self.size(name);
                self.reply(&sender, session, cursor);
            }
            _ => {
                let name = match plan.collection() {
                    Some(name) => name.clone(),
                    None => {
                        self.reply(
                            &sender,
                            session,
                            Cursor::with_error(ErrorCode::OtherError, "plan without collection"),
                        );
                        return;
                    }
                };
                if let Some(cursor) = self.check_collection(&name) {
                    log_debug!("memory_storage: collection not found {}", name);
                    self.reply(&sender, session, cursor);
                    return;
                }
                let context = Arc::clone(&self.collections[&name]);
                self.sessions.insert(session.clone(), MemorySession { sender });
                let _ = self.executor.send(ExecutorMsg::ExecutePlan {
                    session,
                    plan,
                    parameters,
                    context,
                    sender: self.self_address.clone(),
                });
            }
        }
    }

    fn execute_plan_finish(&mut self, session: SessionId, cursor: Cursor) {
        match self.sessions.remove(&session) {
            Some(entry) => {
                log_debug!(
                    "memory_storage: execute_plan_finish session {}, success {}",
                    session,
                    cursor.is_success()
                );
                self.reply(&entry.sender, session, cursor);
            }
            None => log_warn!("memory_storage: unknown session {}", session),
        }
    }

    /// Rehydrate databases and collections from the disk snapshot.
    fn load(&mut self, session: SessionId, result: DiskLoadResult, sender: Address<DispatcherMsg>) {
        log_debug!(
            "memory_storage: load {} databases, {} collections",
            result.databases.len(),
            result.collections.len()
        );
        for database in result.databases {
            self.databases.insert(database);
        }
        for load in result.collections {
            self.databases.insert(load.name.database.clone());
            let context = CollectionContext::new(load.name.clone());
            {
                let mut storage = context.storage().write();
                for text in &load.documents {
                    match Document::from_json(text) {
                        Ok(document) => {
                            storage.insert(document);
                        }
                        Err(e) => log_warn!("unreadable document skipped at load: {}", e),
                    }
                }
            }
            {
                let mut engine = context.indexes().write();
                restore_indexes(&mut engine, load.indexes);
            }
            {
                let documents: Vec<_> = context.storage().read().iter().cloned().collect();
                context.indexes().write().rebuild_in_memory(documents.iter());
            }
            self.collections
                .insert(load.name.clone(), Arc::clone(&context));
            let _ = self.disk.send(DiskMsg::RegisterCollection {
                name: load.name,
                context,
            });
        }
        let _ = sender.send(DispatcherMsg::MemoryLoadFinish { session });
    }

    fn close_cursor(&self, session: &SessionId) {
        for context in self.collections.values() {
            context.close_cursor(session);
        }
    }
}

fn restore_indexes(engine: &mut IndexEngine, snapshots: Vec<crate::index::IndexSnapshot>) {
    for snapshot in snapshots {
        engine.emplace(OrderedIndex::from_snapshot(snapshot));
    }
}

pub fn spawn(
    executor: Address<ExecutorMsg>,
    disk: Address<DiskMsg>,
) -> (Address<MemoryStorageMsg>, JoinHandle<()>) {
    let (sender, receiver): (Address<MemoryStorageMsg>, Receiver<MemoryStorageMsg>) = unbounded();
    let self_address = sender.clone();
    let handle = std::thread::Builder::new()
        .name("quill-memory-storage".to_string())
        .spawn(move || {
            let mut service = MemoryStorageService {
                databases: HashSet::new(),
                collections: AHashMap::new(),
                executor,
                disk,
                self_address,
                sessions: AHashMap::new(),
            };
            while let Ok(message) = receiver.recv() {
                match message {
                    MemoryStorageMsg::ExecutePlan {
                        session,
                        plan,
                        parameters,
                        sender,
                    } => service.execute_plan(session, plan, parameters, sender),
                    MemoryStorageMsg::ExecutePlanFinish { session, cursor } => {
                        service.execute_plan_finish(session, cursor)
                    }
                    MemoryStorageMsg::Load {
                        session,
                        result,
                        sender,
                    } => service.load(session, result, sender),
                    MemoryStorageMsg::CloseCursor { session } => service.close_cursor(&session),
                    MemoryStorageMsg::Shutdown => {
                        let _ = service.executor.send(ExecutorMsg::Shutdown);
                        break;
                    }
                }
            }
        })
        .expect("spawn memory storage thread");
    (sender, handle)
}
