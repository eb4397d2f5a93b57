// error.rs
// Engine errors and the cursor-level error codes

use thiserror::Error;

/// Outcome code carried inside cursors.
///
/// These are values, not control flow: an operator that fails reports the
/// code in its result cursor and the dispatcher forwards it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    Success,
    NoSuchElement,
    NoSuchContainer,
    InvalidJsonPointer,
    InvalidIndex,
    InvalidType,
    DatabaseNotExists,
    DatabaseAlreadyExists,
    CollectionNotExists,
    CollectionAlreadyExists,
    CollectionDropped,
    OtherError,
}

impl ErrorCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::NoSuchElement => "no such element",
            ErrorCode::NoSuchContainer => "no such container",
            ErrorCode::InvalidJsonPointer => "invalid json pointer",
            ErrorCode::InvalidIndex => "invalid index",
            ErrorCode::InvalidType => "invalid type",
            ErrorCode::DatabaseNotExists => "database not exists",
            ErrorCode::DatabaseAlreadyExists => "database already exists",
            ErrorCode::CollectionNotExists => "collection not exists",
            ErrorCode::CollectionAlreadyExists => "collection already exists",
            ErrorCode::CollectionDropped => "collection dropped",
            ErrorCode::OtherError => "other error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal / infrastructure errors.
///
/// WAL and disk failures are fatal for the engine (recovery happens by
/// replay on restart); everything else surfaces as an [`ErrorCode`] in a
/// cursor instead.
#[derive(Error, Debug)]
pub enum QuillBaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAL corruption detected")]
    WalCorruption,

    #[error("WAL append failed: {0}")]
    WalAppend(String),

    #[error("disk flush failed: {0}")]
    DiskFlush(String),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("actor mailbox closed: {0}")]
    MailboxClosed(&'static str),

    #[error("engine not loaded")]
    NotLoaded,
}

impl From<bincode::Error> for QuillBaseError {
    fn from(e: bincode::Error) -> Self {
        QuillBaseError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QuillBaseError>;
