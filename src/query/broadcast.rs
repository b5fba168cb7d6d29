//! Row-change broadcaster feeding live queries.
//!
//! Every committed write (optimistic local mutation or downloader
//! reconciliation) publishes one event here. Subscribers get bounded
//! queues; a subscriber that stops draining is dropped with a recorded
//! reason rather than ever blocking the write path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::config::Limits;

/// What happened to a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row inserted or replaced whole.
    Put,
    /// Subset of columns updated.
    Patch,
    /// Row removed.
    Delete,
}

/// Which write path produced a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Direct UI mutation (optimistic write).
    Local,
    /// Downloader reconciliation.
    Remote,
}

/// One committed row-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowChange {
    pub table: String,
    pub row_id: String,
    pub kind: ChangeKind,
    pub origin: ChangeOrigin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchLimits {
    pub max_subscribers: usize,
    pub queue_events: usize,
}

impl WatchLimits {
    pub fn from_limits(limits: &Limits) -> Self {
        Self {
            max_subscribers: limits.max_watch_subscribers,
            queue_events: limits.watch_queue_events,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    SubscriberLagged,
}

/// Receiving half handed to a live query.
pub struct ChangeSubscription {
    receiver: Receiver<RowChange>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl ChangeSubscription {
    pub fn recv(&self) -> Result<RowChange, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<RowChange, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<RowChange, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.lock().ok().and_then(|guard| *guard)
    }
}

#[derive(Clone)]
pub(crate) struct ChangeBroadcaster {
    inner: Arc<Mutex<BroadcasterState>>,
}

impl ChangeBroadcaster {
    pub(crate) fn new(limits: WatchLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BroadcasterState::new(limits))),
        }
    }

    pub(crate) fn subscribe(&self) -> Result<ChangeSubscription, BroadcastError> {
        let mut state = self.lock_state()?;
        if state.subscribers.len() >= state.limits.max_subscribers {
            return Err(BroadcastError::SubscriberLimitReached {
                max_subscribers: state.limits.max_subscribers,
            });
        }

        let (sender, receiver) = crossbeam::channel::bounded(state.limits.queue_events);
        let drop_reason = Arc::new(Mutex::new(None));
        let id = state.next_subscriber_id;
        state.next_subscriber_id = state.next_subscriber_id.saturating_add(1);
        state.subscribers.insert(
            id,
            SubscriberState {
                sender,
                drop_reason: Arc::clone(&drop_reason),
            },
        );

        Ok(ChangeSubscription {
            receiver,
            drop_reason,
        })
    }

    pub(crate) fn publish(&self, change: RowChange) -> Result<(), BroadcastError> {
        let mut state = self.lock_state()?;

        let mut dropped = Vec::new();
        for (id, subscriber) in &state.subscribers {
            match subscriber.sender.try_send(change.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    subscriber.set_drop_reason(DropReason::SubscriberLagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => {
                    dropped.push(*id);
                }
            }
        }

        for id in dropped {
            state.subscribers.remove(&id);
        }

        Ok(())
    }

    pub(crate) fn subscriber_count(&self) -> Result<usize, BroadcastError> {
        let state = self.lock_state()?;
        Ok(state.subscribers.len())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, BroadcasterState>, BroadcastError> {
        self.inner.lock().map_err(|_| BroadcastError::LockPoisoned)
    }
}

struct BroadcasterState {
    limits: WatchLimits,
    next_subscriber_id: u64,
    subscribers: BTreeMap<u64, SubscriberState>,
}

impl BroadcasterState {
    fn new(limits: WatchLimits) -> Self {
        Self {
            limits,
            next_subscriber_id: 1,
            subscribers: BTreeMap::new(),
        }
    }
}

struct SubscriberState {
    sender: Sender<RowChange>,
    drop_reason: Arc<Mutex<Option<DropReason>>>,
}

impl SubscriberState {
    fn set_drop_reason(&self, reason: DropReason) {
        if let Ok(mut guard) = self.drop_reason.lock()
            && guard.is_none()
        {
            *guard = Some(reason);
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("watch subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("broadcaster lock poisoned")]
    LockPoisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::CARDS_TABLE;

    fn change(row: &str) -> RowChange {
        RowChange {
            table: CARDS_TABLE.to_string(),
            row_id: row.to_string(),
            kind: ChangeKind::Put,
            origin: ChangeOrigin::Local,
        }
    }

    fn limits(max_subscribers: usize, queue_events: usize) -> WatchLimits {
        WatchLimits {
            max_subscribers,
            queue_events,
        }
    }

    #[test]
    fn delivers_changes_in_order() {
        let broadcaster = ChangeBroadcaster::new(limits(4, 8));
        let sub = broadcaster.subscribe().unwrap();

        broadcaster.publish(change("a")).unwrap();
        broadcaster.publish(change("b")).unwrap();

        assert_eq!(sub.recv().unwrap().row_id, "a");
        assert_eq!(sub.recv().unwrap().row_id, "b");
    }

    #[test]
    fn subscriber_limit_is_enforced() {
        let broadcaster = ChangeBroadcaster::new(limits(1, 8));
        let _first = broadcaster.subscribe().unwrap();
        assert!(matches!(
            broadcaster.subscribe(),
            Err(BroadcastError::SubscriberLimitReached { max_subscribers: 1 })
        ));
    }

    #[test]
    fn lagging_subscriber_is_dropped_not_blocked() {
        let broadcaster = ChangeBroadcaster::new(limits(4, 1));
        let sub = broadcaster.subscribe().unwrap();

        broadcaster.publish(change("a")).unwrap();
        broadcaster.publish(change("b")).unwrap();

        assert_eq!(sub.drop_reason(), Some(DropReason::SubscriberLagged));
        assert_eq!(broadcaster.subscriber_count().unwrap(), 0);
        // The queued event is still deliverable after the drop.
        assert_eq!(sub.recv().unwrap().row_id, "a");
        assert!(sub.recv().is_err());
    }

    #[test]
    fn disconnected_subscriber_is_pruned() {
        let broadcaster = ChangeBroadcaster::new(limits(4, 8));
        drop(broadcaster.subscribe().unwrap());

        broadcaster.publish(change("a")).unwrap();
        assert_eq!(broadcaster.subscriber_count().unwrap(), 0);
    }
}
