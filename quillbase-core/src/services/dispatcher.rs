// services/dispatcher.rs
// Per-session state machine
//
// Entry points mirror the client protocol. Every call records its session
// in the table (at most one in-flight entry per session), executes through
// memory storage, persists mutations to the WAL on success and asks the
// disk manager to flush up to the acknowledged WAL id before replying.
//
// Recovery: `load` pulls the disk snapshot, lets memory storage rehydrate,
// then streams WAL records past the checkpoint back through the normal
// execute path. Replay sessions are marked, which short-circuits the WAL
// append on completion.

use std::num::NonZeroUsize;
use std::thread::JoinHandle;

use ahash::AHashMap;
use crossbeam::channel::{unbounded, Receiver};
use lru::LruCache;

use crate::cursor::Cursor;
use crate::error::ErrorCode;
use crate::plan::{from_statement, LogicalPlan};
use crate::statement::{Parameters, Statement};
use crate::{log_debug, log_trace, log_warn};

use super::message::{
    Address, ClientReply, DiskLoadResult, DiskMsg, DispatcherMsg, MemoryStorageMsg, SessionId,
    WalId, WalMsg, WalRecord,
};

struct SessionEntry {
    reply: Option<Address<ClientReply>>,
    statement: Option<Statement>,
    /// Replayed from the WAL: skip the append on completion
    from_wal: bool,
    /// Result parked while the WAL append is in flight
    pending: Option<Cursor>,
}

struct DispatcherService {
    memory: Address<MemoryStorageMsg>,
    wal: Address<WalMsg>,
    disk: Address<DiskMsg>,
    self_address: Address<DispatcherMsg>,
    sessions: AHashMap<SessionId, SessionEntry>,
    plan_cache: LruCache<u64, LogicalPlan>,
    load_session: Option<SessionId>,
    /// Checkpoint id the disk snapshot covered at boot
    disk_wal_id: WalId,
    replay_remaining: usize,
    /// High-water mark of the records being replayed
    last_wal_id: WalId,
}

impl DispatcherService {
    fn reply_client(&self, reply: Option<Address<ClientReply>>, message: ClientReply) {
        if let Some(reply) = reply {
            let _ = reply.send(message);
        }
    }

    /// Translate with a digest-keyed LRU in front, so repeated statement
    /// shapes skip re-translation.
    fn create_plan(&mut self, statement: &Statement) -> (LogicalPlan, Parameters) {
        let digest = statement_digest(statement);
        if let Some(digest) = digest {
            if let Some(plan) = self.plan_cache.get(&digest) {
                return (plan.clone(), statement.parameters());
            }
        }
        let (plan, parameters) = from_statement(statement);
        if let Some(digest) = digest {
            self.plan_cache.put(digest, plan.clone());
        }
        (plan, parameters)
    }

    fn execute(&mut self, session: SessionId, statement: Statement, reply: Address<ClientReply>) {
        log_trace!("dispatcher: execute {:?}, session {}", statement.kind(), session);
        if self.sessions.contains_key(&session) {
            // at most one in-flight statement per session
            let _ = reply.send(ClientReply::Cursor(Cursor::with_error(
                ErrorCode::OtherError,
                "session already has a statement in flight",
            )));
            return;
        }
        let (plan, parameters) = self.create_plan(&statement);
        self.sessions.insert(
            session.clone(),
            SessionEntry {
                reply: Some(reply),
                statement: Some(statement),
                from_wal: false,
                pending: None,
            },
        );
        let _ = self.memory.send(MemoryStorageMsg::ExecutePlan {
            session,
            plan,
            parameters,
            sender: self.self_address.clone(),
        });
    }

    /// Catalog fan-out after successful DDL. Collection creation is
    /// registered by memory storage itself (it owns the context).
    fn ddl_fanout(&self, statement: &Statement) {
        match statement {
            Statement::CreateDatabase { database } => {
                let _ = self.disk.send(DiskMsg::AppendDatabase {
                    database: database.clone(),
                });
            }
            Statement::DropDatabase { database } => {
                let _ = self.disk.send(DiskMsg::RemoveDatabase {
                    database: database.clone(),
                });
            }
            Statement::DropCollection { name } => {
                let _ = self.disk.send(DiskMsg::RemoveCollection { name: name.clone() });
            }
            _ => {}
        }
    }

    fn execute_finish(&mut self, session: SessionId, cursor: Cursor) {
        let (from_wal, statement) = match self.sessions.get(&session) {
            Some(entry) => (entry.from_wal, entry.statement.clone()),
            None => {
                log_warn!("dispatcher: completion for unknown session {}", session);
                return;
            }
        };
        log_debug!(
            "dispatcher: execute_finish session {}, success {}",
            session,
            cursor.is_success()
        );

        if from_wal {
            self.sessions.remove(&session);
            if cursor.is_success() {
                if let Some(statement) = &statement {
                    self.ddl_fanout(statement);
                }
            }
            self.finish_replay_one();
            return;
        }

        let is_persistent = cursor.is_success()
            && statement.as_ref().map(Statement::is_mutation).unwrap_or(false);
        if is_persistent {
            let statement = statement.unwrap();
            self.ddl_fanout(&statement);
            if let Some(entry) = self.sessions.get_mut(&session) {
                entry.pending = Some(cursor);
            }
            let _ = self.wal.send(WalMsg::Append {
                session,
                statement,
                sender: self.self_address.clone(),
            });
        } else if let Some(entry) = self.sessions.remove(&session) {
            self.reply_client(entry.reply, ClientReply::Cursor(cursor));
        }
    }

    fn wal_appended(&mut self, session: SessionId, wal_id: WalId) {
        log_trace!("dispatcher: wal id {} for session {}", wal_id, session);
        let entry = match self.sessions.remove(&session) {
            Some(entry) => entry,
            None => return,
        };
        let _ = self.disk.send(DiskMsg::Flush { wal_id });
        let cursor = entry.pending.unwrap_or_default();
        self.reply_client(entry.reply, ClientReply::Cursor(cursor));
    }

    fn load(&mut self, session: SessionId, reply: Address<ClientReply>) {
        log_debug!("dispatcher: load, session {}", session);
        self.sessions.insert(
            session.clone(),
            SessionEntry {
                reply: Some(reply),
                statement: None,
                from_wal: false,
                pending: None,
            },
        );
        self.load_session = Some(session.clone());
        let _ = self.disk.send(DiskMsg::Load {
            session,
            sender: self.self_address.clone(),
        });
    }

    fn disk_load_result(&mut self, session: SessionId, result: DiskLoadResult) {
        log_debug!(
            "dispatcher: disk load, wal id {}, session {}",
            result.wal_id,
            session
        );
        self.disk_wal_id = result.wal_id;
        let _ = self.memory.send(MemoryStorageMsg::Load {
            session,
            result,
            sender: self.self_address.clone(),
        });
    }

    fn memory_load_finish(&mut self, session: SessionId) {
        let _ = self.wal.send(WalMsg::Load {
            session,
            after_id: self.disk_wal_id,
            sender: self.self_address.clone(),
        });
    }

    fn wal_load_result(&mut self, session: SessionId, records: Vec<WalRecord>) {
        log_debug!(
            "dispatcher: replaying {} wal records, session {}",
            records.len(),
            session
        );
        if records.is_empty() {
            if let Some(entry) = self.sessions.remove(&session) {
                self.reply_client(entry.reply, ClientReply::LoadFinish);
            }
            self.load_session = None;
            return;
        }
        self.replay_remaining = records.len();
        self.last_wal_id = records.last().map(|r| r.id).unwrap_or(0);
        for record in records {
            let replay_session = SessionId::new();
            let (plan, parameters) = self.create_plan(&record.statement);
            self.sessions.insert(
                replay_session.clone(),
                SessionEntry {
                    reply: None,
                    statement: Some(record.statement),
                    from_wal: true,
                    pending: None,
                },
            );
            let _ = self.memory.send(MemoryStorageMsg::ExecutePlan {
                session: replay_session,
                plan,
                parameters,
                sender: self.self_address.clone(),
            });
        }
    }

    /// One flush once every record has re-executed: a per-record flush
    /// could checkpoint a snapshot that is still missing later records.
    fn finish_replay_one(&mut self) {
        self.replay_remaining = self.replay_remaining.saturating_sub(1);
        if self.replay_remaining == 0 {
            let _ = self.disk.send(DiskMsg::Flush {
                wal_id: self.last_wal_id,
            });
            if let Some(load_session) = self.load_session.take() {
                if let Some(entry) = self.sessions.remove(&load_session) {
                    self.reply_client(entry.reply, ClientReply::LoadFinish);
                }
            }
        }
    }

    fn close_cursor(&mut self, session: SessionId, reply: Address<ClientReply>) {
        log_trace!("dispatcher: close_cursor, session {}", session);
        let _ = self.memory.send(MemoryStorageMsg::CloseCursor { session });
        let _ = reply.send(ClientReply::Cursor(Cursor::success()));
    }
}

fn statement_digest(statement: &Statement) -> Option<u64> {
    use std::hash::Hasher;
    let bytes = bincode::serialize(statement).ok()?;
    let mut hasher = ahash::AHasher::default();
    hasher.write(&bytes);
    Some(hasher.finish())
}

pub fn spawn(
    memory: Address<MemoryStorageMsg>,
    wal: Address<WalMsg>,
    disk: Address<DiskMsg>,
    plan_cache_capacity: usize,
) -> (Address<DispatcherMsg>, JoinHandle<()>) {
    let (sender, receiver): (Address<DispatcherMsg>, Receiver<DispatcherMsg>) = unbounded();
    let self_address = sender.clone();
    let capacity = NonZeroUsize::new(plan_cache_capacity.max(1)).unwrap();
    let handle = std::thread::Builder::new()
        .name("quill-dispatcher".to_string())
        .spawn(move || {
            let mut service = DispatcherService {
                memory,
                wal,
                disk,
                self_address,
                sessions: AHashMap::new(),
                plan_cache: LruCache::new(capacity),
                load_session: None,
                disk_wal_id: 0,
                replay_remaining: 0,
                last_wal_id: 0,
            };
            while let Ok(message) = receiver.recv() {
                match message {
                    DispatcherMsg::Load { session, reply } => service.load(session, reply),
                    DispatcherMsg::Execute {
                        session,
                        statement,
                        reply,
                    } => service.execute(session, statement, reply),
                    DispatcherMsg::CloseCursor { session, reply } => {
                        service.close_cursor(session, reply)
                    }
                    DispatcherMsg::ExecuteFinish { session, cursor } => {
                        service.execute_finish(session, cursor)
                    }
                    DispatcherMsg::DiskLoadResult { session, result } => {
                        service.disk_load_result(session, result)
                    }
                    DispatcherMsg::MemoryLoadFinish { session } => {
                        service.memory_load_finish(session)
                    }
                    DispatcherMsg::WalAppended { session, wal_id } => {
                        service.wal_appended(session, wal_id)
                    }
                    DispatcherMsg::WalLoadResult { session, records } => {
                        service.wal_load_result(session, records)
                    }
                    DispatcherMsg::Shutdown => {
                        let _ = service.memory.send(MemoryStorageMsg::Shutdown);
                        let _ = service.wal.send(WalMsg::Shutdown);
                        let _ = service.disk.send(DiskMsg::Shutdown);
                        break;
                    }
                }
            }
        })
        .expect("spawn dispatcher thread");
    (sender, handle)
}
