#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
mod paths;
pub mod query;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working set at crate root for convenience
pub use crate::core::{
    ActorId, CARDS_TABLE, Card, CardFields, CardId, CardPatch, DecodeError, Patch, Theme,
};
pub use crate::query::{ChangeKind, ChangeOrigin, RowChange, WatchError};
pub use crate::store::{CardMutation, LocalStore, StoreError};
pub use crate::sync::{
    AuthProvider, RemoteError, RemoteStore, Session, SyncRuntime, UploadError, fetch_card,
};
