// services/mod.rs
// Actor services
//
// Dispatcher, memory storage, executor, WAL manager and disk manager each
// run on their own thread with a single mailbox. Wiring happens in
// `engine::Engine::start`.

pub mod disk;
pub mod dispatcher;
pub mod executor;
pub mod memory_storage;
pub mod message;
pub mod wal;

pub use disk::DiskManager;
pub use message::{Address, ClientReply, SessionId, WalId, WalRecord};
pub use wal::WalManager;
