//! Live queries: a result set that re-emits when underlying rows change.

use std::time::{Duration, Instant};

use thiserror::Error;

use super::broadcast::{ChangeSubscription, RowChange};
use crate::core::{CARDS_TABLE, Card, CardId};
use crate::store::{LocalStore, StoreError};

#[derive(Debug, Error)]
pub enum WatchError {
    /// The store (and its broadcaster) went away.
    #[error("change stream closed")]
    Closed,

    /// This watch stopped draining and was dropped by the broadcaster;
    /// re-subscribe and re-read to recover.
    #[error("watch lagged behind the change stream")]
    Lagged,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A live result set over the card table.
///
/// `recv` blocks until a relevant row changes, then re-reads the store and
/// returns the fresh result. The result is the full ordered card list, or
/// a zero-or-one element list for a single-card watch.
pub struct CardWatch {
    store: LocalStore,
    filter: Option<CardId>,
    subscription: ChangeSubscription,
}

impl CardWatch {
    pub(crate) fn new(
        store: LocalStore,
        filter: Option<CardId>,
        subscription: ChangeSubscription,
    ) -> Self {
        Self {
            store,
            filter,
            subscription,
        }
    }

    /// Read the current result without waiting for a change.
    pub fn current(&self) -> Result<Vec<Card>, StoreError> {
        match &self.filter {
            None => self.store.list_cards(),
            Some(id) => Ok(self.store.get_card(id)?.into_iter().collect()),
        }
    }

    /// Block until a relevant change lands, then return the fresh result.
    pub fn recv(&self) -> Result<Vec<Card>, WatchError> {
        loop {
            match self.subscription.recv() {
                Ok(change) if self.relevant(&change) => return Ok(self.current()?),
                Ok(_) => continue,
                Err(_) => return Err(self.closed_reason()),
            }
        }
    }

    /// Like `recv`, returning `None` if no relevant change lands in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<Card>>, WatchError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.subscription.recv_timeout(remaining) {
                Ok(change) if self.relevant(&change) => return Ok(Some(self.current()?)),
                Ok(_) => continue,
                Err(crossbeam::channel::RecvTimeoutError::Timeout) => return Ok(None),
                Err(crossbeam::channel::RecvTimeoutError::Disconnected) => {
                    return Err(self.closed_reason());
                }
            }
        }
    }

    fn relevant(&self, change: &RowChange) -> bool {
        change.table == CARDS_TABLE
            && self
                .filter
                .as_ref()
                .is_none_or(|id| id.as_str() == change.row_id)
    }

    fn closed_reason(&self) -> WatchError {
        if self.subscription.drop_reason().is_some() {
            WatchError::Lagged
        } else {
            WatchError::Closed
        }
    }
}
