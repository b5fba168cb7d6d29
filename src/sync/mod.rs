//! Upload/download reconciliation between the local store and the remote.
//!
//! Provides:
//! - Injected collaborator seams (`AuthProvider`, `RemoteStore`)
//! - `Uploader` - sequential drain of the mutation log
//! - `Downloader` - pull-replace reconciliation of remote snapshots
//! - `SyncRuntime` - worker thread wiring and shutdown
//! - `fetch_card` - the public share-view read

mod auth;
mod downloader;
mod public_card;
mod remote;
mod runtime;
mod uploader;

pub use auth::{AuthProvider, Session};
pub use downloader::{Downloader, PullSummary};
pub use public_card::fetch_card;
pub use remote::{RemoteError, RemoteRow, RemoteStore};
pub use runtime::SyncRuntime;
pub use uploader::UploadError;
