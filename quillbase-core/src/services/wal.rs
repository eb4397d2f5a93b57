// services/wal.rs
// Write-ahead log manager
//
// One append-only file of length-prefixed records:
//
//   id: 8 bytes (u64 LE)
//   kind: 1 byte (statement kind)
//   len: 4 bytes (u32 LE)
//   payload: bincode of the statement
//   checksum: 4 bytes (CRC32 over everything above)
//
// Ids are contiguous and handed out only inside this actor, so no external
// synchronization is needed. A malformed tail is truncated at the last
// valid record when the file is opened.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Receiver};

use crate::config::{Config, Durability};
use crate::error::{QuillBaseError, Result};
use crate::statement::Statement;
use crate::{log_debug, log_trace, log_warn};

use super::message::{Address, WalId, WalMsg, WalRecord};

/// id + kind + len
pub const WAL_HEADER_SIZE: usize = 13;
/// Guard against OOM on a corrupt length field
pub const MAX_WAL_RECORD_SIZE: usize = 64 * 1024 * 1024;

pub struct WalManager {
    file: File,
    path: PathBuf,
    next_id: WalId,
    durability: Durability,
}

impl WalManager {
    /// Open or create the WAL. Scans existing records to restore the id
    /// counter and truncates any malformed tail.
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        let path = config.wal_path();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut buffer = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut buffer)?;

        let mut offset = 0usize;
        let mut last_id: WalId = 0;
        loop {
            match decode_record(&buffer, offset) {
                DecodeResult::Record { record, next } => {
                    last_id = record.id;
                    offset = next;
                }
                DecodeResult::Eof => break,
                DecodeResult::Corrupt => {
                    log_warn!(
                        "WAL tail malformed at offset {}, truncating {} bytes",
                        offset,
                        buffer.len() - offset
                    );
                    file.set_len(offset as u64)?;
                    file.sync_all()?;
                    break;
                }
            }
        }
        log_debug!("WAL opened, last id {}", last_id);

        Ok(WalManager {
            file,
            path,
            next_id: last_id + 1,
            durability: config.durability,
        })
    }

    pub fn last_id(&self) -> WalId {
        self.next_id - 1
    }

    /// Append one statement; returns its gap-free id.
    pub fn append(&mut self, statement: &Statement) -> Result<WalId> {
        let id = self.next_id;
        let record = encode_record(id, statement)?;
        self.file.write_all(&record)?;
        match self.durability {
            Durability::Always | Durability::OnCommit => self.file.sync_all()?,
            Durability::Never => {}
        }
        self.next_id += 1;
        Ok(id)
    }

    /// Records with `id > after`, in order. Reading stops at the first
    /// malformed record (the open-time scan already truncated the tail).
    pub fn load_after(&self, after: WalId) -> Result<Vec<WalRecord>> {
        let mut file = File::open(&self.path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        loop {
            match decode_record(&buffer, offset) {
                DecodeResult::Record { record, next } => {
                    if record.id > after {
                        records.push(record);
                    }
                    offset = next;
                }
                DecodeResult::Eof => break,
                DecodeResult::Corrupt => break,
            }
        }
        Ok(records)
    }
}

fn encode_record(id: WalId, statement: &Statement) -> Result<Vec<u8>> {
    let payload = bincode::serialize(statement)?;
    if payload.len() > MAX_WAL_RECORD_SIZE {
        return Err(QuillBaseError::WalAppend(format!(
            "record of {} bytes exceeds the size limit",
            payload.len()
        )));
    }
    let mut buf = Vec::with_capacity(WAL_HEADER_SIZE + payload.len() + 4);
    buf.extend_from_slice(&id.to_le_bytes());
    buf.push(statement.kind() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(buf)
}

enum DecodeResult {
    Record { record: WalRecord, next: usize },
    Eof,
    Corrupt,
}

fn decode_record(buffer: &[u8], offset: usize) -> DecodeResult {
    if offset == buffer.len() {
        return DecodeResult::Eof;
    }
    if buffer.len() < offset + WAL_HEADER_SIZE + 4 {
        return DecodeResult::Corrupt;
    }
    let id = u64::from_le_bytes(buffer[offset..offset + 8].try_into().unwrap());
    let len =
        u32::from_le_bytes(buffer[offset + 9..offset + 13].try_into().unwrap()) as usize;
    if len > MAX_WAL_RECORD_SIZE {
        return DecodeResult::Corrupt;
    }
    let payload_start = offset + WAL_HEADER_SIZE;
    let checksum_start = payload_start + len;
    if buffer.len() < checksum_start + 4 {
        return DecodeResult::Corrupt;
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buffer[offset..checksum_start]);
    let stored =
        u32::from_le_bytes(buffer[checksum_start..checksum_start + 4].try_into().unwrap());
    if hasher.finalize() != stored {
        return DecodeResult::Corrupt;
    }
    let statement: Statement = match bincode::deserialize(&buffer[payload_start..checksum_start]) {
        Ok(statement) => statement,
        Err(_) => return DecodeResult::Corrupt,
    };
    DecodeResult::Record {
        record: WalRecord { id, statement },
        next: checksum_start + 4,
    }
}

/// Spawn the WAL actor. An append failure is fatal by design: the thread
/// panics and recovery happens by replay on restart.
pub fn spawn(mut manager: WalManager) -> (Address<WalMsg>, JoinHandle<()>) {
    let (sender, receiver): (Address<WalMsg>, Receiver<WalMsg>) = unbounded();
    let handle = std::thread::Builder::new()
        .name("quill-wal".to_string())
        .spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    WalMsg::Append {
                        session,
                        statement,
                        sender,
                    } => {
                        log_trace!("wal append, session {}", session);
                        match manager.append(&statement) {
                            Ok(wal_id) => {
                                let _ = sender.send(super::message::DispatcherMsg::WalAppended {
                                    session,
                                    wal_id,
                                });
                            }
                            Err(e) => panic!("WAL append failed: {}", e),
                        }
                    }
                    WalMsg::Load {
                        session,
                        after_id,
                        sender,
                    } => {
                        let records = manager.load_after(after_id).unwrap_or_default();
                        log_debug!(
                            "wal load after {}: {} records, session {}",
                            after_id,
                            records.len(),
                            session
                        );
                        let _ = sender.send(super::message::DispatcherMsg::WalLoadResult {
                            session,
                            records,
                        });
                    }
                    WalMsg::Shutdown => break,
                }
            }
        })
        .expect("spawn wal thread");
    (sender, handle)
}
