use serde::Serialize;

use crate::engine::types::{SymbolId, Timestamp};
use crate::market_data::combined_book::CombinedBook;

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Serialization(String),
    FormatMismatch(String),
    Other(String),
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "I/O failure: {}", e),
            PersistError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            PersistError::FormatMismatch(msg) => write!(f, "Format mismatch: {}", msg),
            PersistError::Other(msg) => write!(f, "Other error: {}", msg),
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Serialization(e.to_string())
    }
}

pub type PersistResult<T> = Result<T, PersistError>;

/// One combined book as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct BookRecord<'a> {
    pub cycle: u64,
    pub recorded_at: Timestamp,
    pub symbol: &'a SymbolId,
    pub book: &'a CombinedBook,
}
