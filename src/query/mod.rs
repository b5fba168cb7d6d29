//! Live, reactive read queries over the local materialized store.

mod broadcast;
mod live;

pub use broadcast::{
    BroadcastError, ChangeKind, ChangeOrigin, ChangeSubscription, DropReason, RowChange,
    WatchLimits,
};
pub use live::{CardWatch, WatchError};

pub(crate) use broadcast::ChangeBroadcaster;
