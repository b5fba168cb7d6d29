//! Sequential upload drain.
//!
//! One transaction in flight at most, strictly in mutation-log order, so
//! the remote store never observes operations out of the order the user
//! performed them. Delivery is at-least-once: a batch is completed only
//! after every operation in it succeeded, and PUT/DELETE are idempotent
//! under replay.

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::auth::{AuthProvider, Session};
use super::remote::{RemoteError, RemoteStore, local_fields_to_remote};
use crate::config::UploadConfig;
use crate::error::Transience;
use crate::store::{CrudEntry, CrudTransaction, MutationLog, OpKind, StoreError};

#[derive(Debug, Error)]
pub enum UploadError {
    /// No authenticated actor at upload time. The transaction stays
    /// queued and is retried once an actor is present; a PUT must never
    /// reach the remote store without an owner reference.
    #[error("no authenticated actor; upload deferred")]
    AuthRequired,

    /// The remote store rejected one operation; the whole batch is left
    /// intact for retry.
    #[error("remote rejected {op} on {table} for {row_id}: {source}")]
    Rejected {
        op: &'static str,
        table: String,
        row_id: String,
        #[source]
        source: RemoteError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UploadError {
    pub fn transience(&self) -> Transience {
        match self {
            UploadError::AuthRequired => Transience::Retryable,
            UploadError::Rejected { source, .. } => source.transience(),
            UploadError::Store(e) => e.transience(),
        }
    }
}

/// Exponential retry backoff, reset on success.
struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: None,
        }
    }

    fn reset(&mut self) {
        self.current = None;
    }

    fn bump(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(current) => (current * 2).min(self.max),
        };
        self.current = Some(next);
        next
    }
}

enum DrainOutcome {
    /// Log fully drained; sleep until the next nudge.
    Idle,
    /// A batch is stuck; retry after the delay.
    Retry(Duration),
}

#[derive(PartialEq, Eq)]
enum Wake {
    Nudge,
    Timer,
    Shutdown,
}

pub(crate) struct Uploader {
    log: MutationLog,
    remote: Arc<dyn RemoteStore>,
    auth: Arc<dyn AuthProvider>,
    signal: Receiver<()>,
    shutdown: Receiver<()>,
    debounce: Duration,
    backoff: Backoff,
}

impl Uploader {
    pub(crate) fn new(
        log: MutationLog,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
        signal: Receiver<()>,
        shutdown: Receiver<()>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            log,
            remote,
            auth,
            signal,
            shutdown,
            debounce: Duration::from_millis(config.debounce_ms),
            backoff: Backoff::new(
                Duration::from_millis(config.backoff_base_ms),
                Duration::from_millis(config.backoff_max_ms),
            ),
        }
    }

    /// Drain loop. Runs until shutdown; an initial pass picks up whatever
    /// survived a restart.
    pub(crate) fn run(mut self) {
        debug!("uploader started");
        loop {
            let wake = match self.drain() {
                DrainOutcome::Idle => self.wait(None),
                DrainOutcome::Retry(delay) => self.wait(Some(delay)),
            };
            if wake == Wake::Shutdown {
                break;
            }
        }
        debug!("uploader stopped");
    }

    fn wait(&self, timeout: Option<Duration>) -> Wake {
        let nudged = match timeout {
            None => {
                crossbeam::select! {
                    recv(self.shutdown) -> _ => return Wake::Shutdown,
                    recv(self.signal) -> msg => msg.is_ok(),
                }
            }
            Some(delay) => {
                crossbeam::select! {
                    recv(self.shutdown) -> _ => return Wake::Shutdown,
                    recv(self.signal) -> msg => msg.is_ok(),
                    default(delay) => return Wake::Timer,
                }
            }
        };
        if !nudged {
            // Signal sender gone means the store itself is gone.
            return Wake::Shutdown;
        }
        // Debounce: let rapid edits settle into a single drain pass.
        std::thread::sleep(self.debounce);
        while self.signal.try_recv().is_ok() {}
        Wake::Nudge
    }

    /// Upload queued transactions oldest-first until the log is empty or
    /// a batch fails.
    fn drain(&mut self) -> DrainOutcome {
        loop {
            let txn = match self.log.next_transaction() {
                Ok(Some(txn)) => txn,
                Ok(None) => {
                    self.backoff.reset();
                    return DrainOutcome::Idle;
                }
                Err(err) => {
                    error!(%err, "failed to read next upload transaction");
                    return DrainOutcome::Retry(self.backoff.bump());
                }
            };

            match self.upload_transaction(&txn) {
                Ok(()) => {
                    if let Err(err) = self.log.complete(&txn) {
                        error!(%err, tx_id = txn.tx_id, "failed to complete uploaded transaction");
                        return DrainOutcome::Retry(self.backoff.bump());
                    }
                    self.backoff.reset();
                    debug!(tx_id = txn.tx_id, ops = txn.ops.len(), "upload transaction confirmed");
                }
                Err(UploadError::AuthRequired) => {
                    debug!(tx_id = txn.tx_id, "upload deferred: no authenticated actor");
                    return DrainOutcome::Retry(self.backoff.bump());
                }
                Err(err) => {
                    warn!(%err, tx_id = txn.tx_id, "upload transaction failed; batch kept for retry");
                    return DrainOutcome::Retry(self.backoff.bump());
                }
            }
        }
    }

    fn upload_transaction(&self, txn: &CrudTransaction) -> Result<(), UploadError> {
        // Resolve the actor once for the entire transaction.
        let session = self.auth.session().ok_or(UploadError::AuthRequired)?;
        for entry in &txn.ops {
            self.upload_op(&session, entry)?;
        }
        Ok(())
    }

    fn upload_op(&self, session: &Session, entry: &CrudEntry) -> Result<(), UploadError> {
        let data = entry.data.clone().unwrap_or_default();
        let mut record = local_fields_to_remote(&data);

        let result = match entry.op {
            OpKind::Put => {
                record.insert("id".to_string(), Value::String(entry.row_id.clone()));
                // Stamp the owner so row-level security accepts the row.
                record.insert(
                    "user_id".to_string(),
                    Value::String(session.actor.as_str().to_string()),
                );
                self.remote.upsert(&entry.table, &record)
            }
            OpKind::Patch => self.remote.update(&entry.table, &entry.row_id, &record),
            OpKind::Delete => self.remote.delete(&entry.table, &entry.row_id),
        };

        result.map_err(|source| {
            let payload = Value::Object(record.clone());
            error!(
                seq = entry.seq,
                op = entry.op.as_str(),
                table = %entry.table,
                row_id = %entry.row_id,
                payload = %payload,
                %source,
                "remote rejected operation"
            );
            UploadError::Rejected {
                op: entry.op.as_str(),
                table: entry.table.clone(),
                row_id: entry.row_id.clone(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_max_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(250), Duration::from_millis(1000));
        assert_eq!(backoff.bump(), Duration::from_millis(250));
        assert_eq!(backoff.bump(), Duration::from_millis(500));
        assert_eq!(backoff.bump(), Duration::from_millis(1000));
        assert_eq!(backoff.bump(), Duration::from_millis(1000));

        backoff.reset();
        assert_eq!(backoff.bump(), Duration::from_millis(250));
    }
}
