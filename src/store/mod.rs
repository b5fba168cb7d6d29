//! Local materialized store and durable mutation log.

mod crud_log;
mod local;
mod schema;

use std::path::PathBuf;

use thiserror::Error;

use crate::core::CardId;
use crate::error::Transience;

pub use local::{CardMutation, LocalStore};

pub(crate) use crud_log::{CrudEntry, CrudTransaction, MutationLog, OpKind};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config invalid at {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },

    #[error("card not found: {0}")]
    CardNotFound(CardId),

    #[error("crud log row decode failed: {0}")]
    LogRowDecode(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Local store failures are fatal to the current operation; retrying
    /// without changing state will not help.
    pub fn transience(&self) -> Transience {
        match self {
            StoreError::Sqlite(_) => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }
}
