// engine.rs
// Embeddable engine facade
//
// Starts the actor services, wires their addresses and exposes the client
// protocol as blocking calls. Each call sends one statement under the
// given session and waits for the dispatcher's single reply.

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;

use crate::config::Config;
use crate::cursor::Cursor;
use crate::document::DocumentPtr;
use crate::error::{QuillBaseError, Result};
use crate::expr::Expr;
use crate::logging::set_log_level;
use crate::services::message::{
    Address, ClientReply, DispatcherMsg, SessionId,
};
use crate::services::{disk, dispatcher, executor, memory_storage, wal};
use crate::statement::{
    CollectionName, DocumentPayload, IndexCompare, IndexKind, Parameters, Statement,
};
use crate::log_info;

const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Engine {
    dispatcher: Address<DispatcherMsg>,
    handles: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Spawn every service and wire the addresses. The engine is empty
    /// until [`Engine::load`] replays persisted state.
    pub fn start(config: Config) -> Result<Engine> {
        set_log_level(config.log_level);
        std::fs::create_dir_all(&config.base_dir)?;
        log_info!("engine starting in {:?}", config.base_dir);

        let (disk_address, disk_handle) = disk::spawn(disk::DiskManager::new(config.clone())?);
        let (wal_address, wal_handle) = wal::spawn(wal::WalManager::open(&config)?);
        let (executor_address, executor_handle) = executor::spawn();
        let (memory_address, memory_handle) =
            memory_storage::spawn(executor_address, disk_address.clone());
        let (dispatcher_address, dispatcher_handle) = dispatcher::spawn(
            memory_address,
            wal_address,
            disk_address,
            config.plan_cache_capacity,
        );

        Ok(Engine {
            dispatcher: dispatcher_address,
            handles: vec![
                disk_handle,
                wal_handle,
                executor_handle,
                memory_handle,
                dispatcher_handle,
            ],
        })
    }

    fn recv_reply(
        &self,
        receiver: &crossbeam::channel::Receiver<ClientReply>,
    ) -> Result<ClientReply> {
        receiver
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| QuillBaseError::MailboxClosed("dispatcher"))
    }

    /// Reload the disk snapshot and replay WAL records past its
    /// checkpoint.
    pub fn load(&self) -> Result<()> {
        let (reply, receiver) = bounded(1);
        self.dispatcher
            .send(DispatcherMsg::Load {
                session: SessionId::new(),
                reply,
            })
            .map_err(|_| QuillBaseError::MailboxClosed("dispatcher"))?;
        match self.recv_reply(&receiver)? {
            ClientReply::LoadFinish => Ok(()),
            ClientReply::Cursor(_) => Err(QuillBaseError::NotLoaded),
        }
    }

    /// Submit one statement under a session and wait for its reply.
    pub fn execute(&self, session: &SessionId, statement: Statement) -> Result<Cursor> {
        let (reply, receiver) = bounded(1);
        self.dispatcher
            .send(DispatcherMsg::Execute {
                session: session.clone(),
                statement,
                reply,
            })
            .map_err(|_| QuillBaseError::MailboxClosed("dispatcher"))?;
        match self.recv_reply(&receiver)? {
            ClientReply::Cursor(cursor) => Ok(cursor),
            ClientReply::LoadFinish => Err(QuillBaseError::NotLoaded),
        }
    }

    pub fn create_database(&self, session: &SessionId, database: &str) -> Result<Cursor> {
        self.execute(
            session,
            Statement::CreateDatabase {
                database: database.to_string(),
            },
        )
    }

    pub fn drop_database(&self, session: &SessionId, database: &str) -> Result<Cursor> {
        self.execute(
            session,
            Statement::DropDatabase {
                database: database.to_string(),
            },
        )
    }

    pub fn create_collection(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::CreateCollection {
                name: CollectionName::new(database, collection),
            },
        )
    }

    pub fn drop_collection(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::DropCollection {
                name: CollectionName::new(database, collection),
            },
        )
    }

    pub fn insert_one(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        document: DocumentPtr,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::InsertOne {
                name: CollectionName::new(database, collection),
                document: DocumentPayload(document),
            },
        )
    }

    pub fn insert_many(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        documents: Vec<DocumentPtr>,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::InsertMany {
                name: CollectionName::new(database, collection),
                documents: documents.into_iter().map(DocumentPayload).collect(),
            },
        )
    }

    pub fn find(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::Find {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
                limit: -1,
            },
        )
    }

    pub fn find_one(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::FindOne {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
            },
        )
    }

    pub fn delete_one(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::DeleteOne {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
            },
        )
    }

    pub fn delete_many(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::DeleteMany {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_one(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
        update: DocumentPtr,
        upsert: bool,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::UpdateOne {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
                update: DocumentPayload(update),
                upsert,
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_many(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        condition: Option<Expr>,
        parameters: Parameters,
        update: DocumentPtr,
        upsert: bool,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::UpdateMany {
                name: CollectionName::new(database, collection),
                condition,
                parameters,
                update: DocumentPayload(update),
                upsert,
            },
        )
    }

    pub fn size(&self, session: &SessionId, database: &str, collection: &str) -> Result<u64> {
        let cursor = self.execute(
            session,
            Statement::Size {
                name: CollectionName::new(database, collection),
            },
        )?;
        Ok(cursor.size() as u64)
    }

    pub fn create_index(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        index_name: &str,
        keys: Vec<String>,
        kind: IndexKind,
        compare: IndexCompare,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::CreateIndex {
                name: CollectionName::new(database, collection),
                index_name: index_name.to_string(),
                keys,
                kind,
                compare,
            },
        )
    }

    pub fn drop_index(
        &self,
        session: &SessionId,
        database: &str,
        collection: &str,
        index_name: &str,
    ) -> Result<Cursor> {
        self.execute(
            session,
            Statement::DropIndex {
                name: CollectionName::new(database, collection),
                index_name: index_name.to_string(),
            },
        )
    }

    pub fn close_cursor(&self, session: &SessionId) -> Result<()> {
        let (reply, receiver) = bounded(1);
        self.dispatcher
            .send(DispatcherMsg::CloseCursor {
                session: session.clone(),
                reply,
            })
            .map_err(|_| QuillBaseError::MailboxClosed("dispatcher"))?;
        self.recv_reply(&receiver)?;
        Ok(())
    }

    /// Orderly shutdown: every actor drains its mailbox and exits.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    /// Abandon the services without an orderly shutdown; they exit when
    /// their channels disconnect. Used by tests to simulate a crash.
    pub fn kill(mut self) {
        self.handles.clear();
    }

    fn shutdown_inner(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let _ = self.dispatcher.send(DispatcherMsg::Shutdown);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
