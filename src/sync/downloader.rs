//! Pull-replace reconciliation of authoritative remote state.
//!
//! Remote rows win outright - except for ids with operations still
//! pending in the mutation log, whose optimistic local state must not
//! revert under the user's cursor. Those rows converge on a later pull,
//! once the uploader has confirmed the pending batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use tracing::{debug, warn};

use super::remote::{RemoteRow, RemoteStore, card_from_remote};
use crate::core::CARDS_TABLE;
use crate::store::{LocalStore, StoreError};

/// What one snapshot application did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Rows written because remote state differed.
    pub applied: usize,
    /// Rows skipped because local mutations are still pending.
    pub skipped_pending: usize,
    /// Local rows removed because the remote no longer has them.
    pub removed: usize,
}

pub struct Downloader {
    store: LocalStore,
    remote: Arc<dyn RemoteStore>,
}

impl Downloader {
    pub fn new(store: LocalStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self { store, remote }
    }

    /// Pull one full snapshot and reconcile it.
    pub fn pull_once(&self) -> crate::Result<PullSummary> {
        let rows = self.remote.pull(CARDS_TABLE)?;
        Ok(self.apply_snapshot(&rows)?)
    }

    /// Reconcile a remote snapshot into the local store.
    ///
    /// Also the entry point for push-based remote clients that already
    /// hold the rows.
    pub fn apply_snapshot(&self, rows: &[RemoteRow]) -> Result<PullSummary, StoreError> {
        let pending = self.store.mutation_log().pending_row_ids(CARDS_TABLE)?;

        let mut summary = PullSummary::default();
        let mut remote_ids = HashSet::new();
        for row in rows {
            let Some(card) = card_from_remote(row) else {
                warn!("skipping remote row without an id");
                continue;
            };
            remote_ids.insert(card.id.as_str().to_string());
            if pending.contains(card.id.as_str()) {
                debug!(id = %card.id, "pending local mutations win; keeping optimistic state");
                summary.skipped_pending += 1;
                continue;
            }
            if self.store.apply_remote_card(&card)? {
                summary.applied += 1;
            }
        }

        summary.removed = self.store.remove_rows_absent_remote(&remote_ids)?.len();
        Ok(summary)
    }

    /// Poll loop. Pulls immediately, then on every interval tick.
    pub(crate) fn run(self, shutdown: Receiver<()>, poll_interval: Duration) {
        debug!("downloader started");
        loop {
            match self.pull_once() {
                Ok(summary) if summary != PullSummary::default() => {
                    debug!(
                        applied = summary.applied,
                        skipped_pending = summary.skipped_pending,
                        removed = summary.removed,
                        "reconciled remote snapshot"
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "remote pull failed"),
            }
            crossbeam::select! {
                recv(shutdown) -> _ => break,
                default(poll_interval) => {}
            }
        }
        debug!("downloader stopped");
    }
}
