//! Worker wiring and lifecycle.
//!
//! All collaborators are constructed explicitly and injected here; the
//! process entry point owns this object, not ambient global state.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::Sender;
use tracing::warn;

use super::auth::AuthProvider;
use super::downloader::Downloader;
use super::remote::RemoteStore;
use super::uploader::Uploader;
use crate::config::Config;
use crate::store::LocalStore;

/// Owns the uploader and downloader threads.
///
/// Dropping the runtime (or calling [`SyncRuntime::shutdown`]) signals
/// both workers and joins them. There is no mid-transaction cancel: an
/// in-flight upload batch either completes or is retried whole after the
/// next start.
pub struct SyncRuntime {
    uploader_shutdown: Sender<()>,
    downloader_shutdown: Sender<()>,
    uploader: Option<JoinHandle<()>>,
    downloader: Option<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Wire the injected collaborators and start both worker threads.
    ///
    /// The uploader immediately drains whatever the mutation log held
    /// across the last shutdown; the downloader pulls its first snapshot
    /// right away.
    pub fn start(
        config: &Config,
        store: &LocalStore,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> SyncRuntime {
        // Capacity 1: a queued wake-up is already pending, further nudges
        // coalesce into it.
        let (signal_tx, signal_rx) = crossbeam::channel::bounded(1);
        store.set_upload_signal(signal_tx);

        let (uploader_shutdown, uploader_shutdown_rx) = crossbeam::channel::unbounded();
        let uploader = Uploader::new(
            store.mutation_log(),
            Arc::clone(&remote),
            auth,
            signal_rx,
            uploader_shutdown_rx,
            &config.upload,
        );
        let uploader = std::thread::spawn(move || uploader.run());

        let (downloader_shutdown, downloader_shutdown_rx) = crossbeam::channel::unbounded();
        let downloader = Downloader::new(store.clone(), remote);
        let poll_interval = Duration::from_millis(config.download.poll_interval_ms);
        let downloader =
            std::thread::spawn(move || downloader.run(downloader_shutdown_rx, poll_interval));

        SyncRuntime {
            uploader_shutdown,
            downloader_shutdown,
            uploader: Some(uploader),
            downloader: Some(downloader),
        }
    }

    /// Stop both workers and wait for them.
    pub fn shutdown(self) {
        // Drop does the work.
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        let _ = self.uploader_shutdown.send(());
        let _ = self.downloader_shutdown.send(());
        for handle in [self.uploader.take(), self.downloader.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("sync worker panicked during shutdown");
            }
        }
    }
}
