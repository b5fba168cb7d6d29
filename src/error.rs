use thiserror::Error;

use crate::core::DecodeError;
use crate::query::BroadcastError;
use crate::store::StoreError;
use crate::sync::{RemoteError, UploadError};

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Crate-level convenience error.
///
/// A thin wrapper over the canonical capability errors; callers who care
/// about one capability should match on that capability's own error type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Store(e) => e.transience(),
            Error::Upload(e) => e.transience(),
            Error::Remote(e) => e.transience(),
            Error::Decode(_) => Transience::Permanent,
            Error::Broadcast(_) => Transience::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_classification() {
        let deferred = Error::from(UploadError::AuthRequired);
        assert!(deferred.transience().is_retryable());

        let outage = Error::from(RemoteError::Unavailable {
            message: "down".into(),
        });
        assert!(outage.transience().is_retryable());

        let poisoned = Error::from(StoreError::LockPoisoned);
        assert_eq!(poisoned.transience(), Transience::Permanent);
    }
}
