// services/disk.rs
// Disk manager
//
// Durable snapshot of the engine: a JSON catalog (databases, collections,
// creation times, WAL checkpoint), one documents file per collection and
// one file per index. `flush(wal_id)` is idempotent; catalog changes are
// persisted immediately so recovery can find the collections the WAL
// records address.
//
// Layout under `base_dir`:
//   catalog.json
//   quill.checkpoint                      (8-byte LE WAL id)
//   <db>/<collection>/documents.qbs       (bincode Vec<String> of JSON docs)
//   <db>/indexes/<collection>/<name>.qbs  (bincode IndexSnapshot)

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use crossbeam::channel::{unbounded, Receiver};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::collection::CollectionContext;
use crate::config::Config;
use crate::error::{QuillBaseError, Result};
use crate::index::IndexSnapshot;
use crate::statement::CollectionName;
use crate::{log_debug, log_error, log_warn};

use super::message::{Address, CollectionLoad, DiskLoadResult, DiskMsg, WalId};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    database: String,
    collection: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    databases: Vec<String>,
    collections: Vec<CatalogEntry>,
}

pub struct DiskManager {
    config: Config,
    catalog: Catalog,
    contexts: HashMap<CollectionName, Arc<CollectionContext>>,
    checkpoint: WalId,
}

impl DiskManager {
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let catalog = match std::fs::read(config.catalog_path()) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => Catalog::default(),
        };
        let checkpoint = match std::fs::read(config.checkpoint_path()) {
            Ok(bytes) if bytes.len() == 8 => WalId::from_le_bytes(bytes.try_into().unwrap()),
            _ => 0,
        };
        Ok(DiskManager {
            config,
            catalog,
            contexts: HashMap::new(),
            checkpoint,
        })
    }

    pub fn checkpoint(&self) -> WalId {
        self.checkpoint
    }

    fn documents_path(&self, name: &CollectionName) -> PathBuf {
        self.config
            .base_dir
            .join(&name.database)
            .join(&name.collection)
            .join("documents.qbs")
    }

    fn index_dir(&self, name: &CollectionName) -> PathBuf {
        self.config
            .base_dir
            .join(&name.database)
            .join("indexes")
            .join(&name.collection)
    }

    fn save_catalog(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.catalog)?;
        write_atomic(&self.config.catalog_path(), &bytes)
    }

    fn write_checkpoint(&self, wal_id: WalId) -> Result<()> {
        write_atomic(&self.config.checkpoint_path(), &wal_id.to_le_bytes())
    }

    /// Rehydrate everything the last flush covered.
    pub fn load(&self) -> Result<DiskLoadResult> {
        let mut collections = Vec::new();
        for entry in &self.catalog.collections {
            let name = CollectionName::new(entry.database.clone(), entry.collection.clone());
            let documents = self.read_documents(&name)?;
            let indexes = self.read_indexes(&name);
            collections.push(CollectionLoad {
                name,
                documents,
                indexes,
            });
        }
        Ok(DiskLoadResult {
            databases: self.catalog.databases.clone(),
            collections,
            wal_id: self.checkpoint,
        })
    }

    fn read_documents(&self, name: &CollectionName) -> Result<Vec<String>> {
        let path = self.documents_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Vec::new());
        }
        let map = unsafe { Mmap::map(&file)? };
        let documents = bincode::deserialize(&map[..])?;
        Ok(documents)
    }

    fn read_indexes(&self, name: &CollectionName) -> Vec<IndexSnapshot> {
        let dir = self.index_dir(name);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        let mut snapshots = Vec::new();
        for entry in entries.flatten() {
            match std::fs::read(entry.path())
                .ok()
                .and_then(|bytes| bincode::deserialize(&bytes).ok())
            {
                Some(snapshot) => snapshots.push(snapshot),
                None => log_warn!("unreadable index file {:?}, skipping", entry.path()),
            }
        }
        snapshots
    }

    pub fn append_database(&mut self, database: &str) -> Result<()> {
        if !self.catalog.databases.iter().any(|d| d == database) {
            self.catalog.databases.push(database.to_string());
            self.save_catalog()?;
        }
        Ok(())
    }

    pub fn remove_database(&mut self, database: &str) -> Result<()> {
        self.catalog.databases.retain(|d| d != database);
        self.catalog.collections.retain(|e| e.database != database);
        self.contexts.retain(|name, _| name.database != database);
        self.save_catalog()?;
        let dir = self.config.base_dir.join(database);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn register_collection(
        &mut self,
        name: CollectionName,
        context: Arc<CollectionContext>,
    ) -> Result<()> {
        let known = self
            .catalog
            .collections
            .iter()
            .any(|e| e.database == name.database && e.collection == name.collection);
        if !known {
            self.catalog.collections.push(CatalogEntry {
                database: name.database.clone(),
                collection: name.collection.clone(),
                created_at: Utc::now(),
            });
            self.save_catalog()?;
        }
        std::fs::create_dir_all(self.documents_path(&name).parent().unwrap())?;
        std::fs::create_dir_all(self.index_dir(&name))?;
        self.contexts.insert(name, context);
        Ok(())
    }

    pub fn remove_collection(&mut self, name: &CollectionName) -> Result<()> {
        self.contexts.remove(name);
        self.catalog
            .collections
            .retain(|e| !(e.database == name.database && e.collection == name.collection));
        self.save_catalog()?;
        let dir = self.config.base_dir.join(&name.database).join(&name.collection);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        let index_dir = self.index_dir(name);
        if index_dir.exists() {
            std::fs::remove_dir_all(index_dir)?;
        }
        Ok(())
    }

    /// Persist every registered collection and advance the checkpoint.
    /// Flushing to an already-covered id is a no-op.
    pub fn flush(&mut self, wal_id: WalId) -> Result<()> {
        if wal_id <= self.checkpoint {
            return Ok(());
        }
        log_debug!("disk flush to wal id {}", wal_id);
        let contexts: Vec<(CollectionName, Arc<CollectionContext>)> = self
            .contexts
            .iter()
            .map(|(name, context)| (name.clone(), Arc::clone(context)))
            .collect();
        for (name, context) in contexts {
            let documents = context.documents_snapshot();
            let bytes = bincode::serialize(&documents)?;
            write_atomic(&self.documents_path(&name), &bytes)?;

            let (snapshots, cleanup) = {
                let mut indexes = context.indexes().write();
                (indexes.snapshots(), indexes.take_cleanup())
            };
            let index_dir = self.index_dir(&name);
            for dropped in cleanup {
                let path = index_dir.join(format!("{}.qbs", dropped));
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
            }
            for snapshot in snapshots {
                let bytes = bincode::serialize(&snapshot)?;
                write_atomic(&index_dir.join(format!("{}.qbs", snapshot.name)), &bytes)?;
            }
        }
        self.write_checkpoint(wal_id)?;
        self.checkpoint = wal_id;
        Ok(())
    }
}

fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Spawn the disk actor. A flush failure is fatal by design.
pub fn spawn(mut manager: DiskManager) -> (Address<DiskMsg>, JoinHandle<()>) {
    let (sender, receiver): (Address<DiskMsg>, Receiver<DiskMsg>) = unbounded();
    let handle = std::thread::Builder::new()
        .name("quill-disk".to_string())
        .spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    DiskMsg::Load { session, sender } => {
                        let result = match manager.load() {
                            Ok(result) => result,
                            Err(e) => {
                                log_error!("disk load failed: {}", e);
                                DiskLoadResult {
                                    databases: Vec::new(),
                                    collections: Vec::new(),
                                    wal_id: manager.checkpoint(),
                                }
                            }
                        };
                        let _ = sender.send(super::message::DispatcherMsg::DiskLoadResult {
                            session,
                            result,
                        });
                    }
                    DiskMsg::AppendDatabase { database } => {
                        if let Err(e) = manager.append_database(&database) {
                            log_error!("catalog append failed for {}: {}", database, e);
                        }
                    }
                    DiskMsg::RemoveDatabase { database } => {
                        if let Err(e) = manager.remove_database(&database) {
                            log_error!("catalog remove failed for {}: {}", database, e);
                        }
                    }
                    DiskMsg::RegisterCollection { name, context } => {
                        if let Err(e) = manager.register_collection(name.clone(), context) {
                            log_error!("collection register failed for {}: {}", name, e);
                        }
                    }
                    DiskMsg::RemoveCollection { name } => {
                        if let Err(e) = manager.remove_collection(&name) {
                            log_error!("collection remove failed for {}: {}", name, e);
                        }
                    }
                    DiskMsg::Flush { wal_id } => {
                        if let Err(e) = manager.flush(wal_id) {
                            panic!("disk flush failed: {}", QuillBaseError::DiskFlush(e.to_string()));
                        }
                    }
                    DiskMsg::Shutdown => break,
                }
            }
        })
        .expect("spawn disk thread");
    (sender, handle)
}
