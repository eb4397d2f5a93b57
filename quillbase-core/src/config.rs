// config.rs
// Engine configuration

use std::path::{Path, PathBuf};

use crate::logging::LogLevel;

/// When the WAL file is fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
    /// fsync after every appended record
    Always,
    /// fsync once per commit (default)
    OnCommit,
    /// never fsync explicitly; the OS decides
    Never,
}

/// Engine configuration.
///
/// `base_dir` owns everything the engine persists: the catalog, per-collection
/// document files, index files, the WAL and its checkpoint.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub durability: Durability,
    pub log_level: LogLevel,
    /// Capacity of the dispatcher's translated-plan cache
    pub plan_cache_capacity: usize,
}

impl Config {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Config {
            base_dir: base_dir.as_ref().to_path_buf(),
            durability: Durability::OnCommit,
            log_level: LogLevel::Warn,
            plan_cache_capacity: 256,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.base_dir.join("quill.wal")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.base_dir.join("quill.checkpoint")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.base_dir.join("catalog.json")
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        let config = Config::new("/tmp/quill_test");
        assert_eq!(config.wal_path(), PathBuf::from("/tmp/quill_test/quill.wal"));
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/quill_test/catalog.json"));
        assert_eq!(config.durability, Durability::OnCommit);
    }
}
