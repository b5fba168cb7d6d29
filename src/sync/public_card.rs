//! Public share-view fetch.

use tracing::warn;

use super::remote::{RemoteError, RemoteStore, card_from_remote};
use crate::core::{CARDS_TABLE, Card, CardId};

/// Fetch one public-or-owned card straight from the remote store.
///
/// Visitors have no local copy of someone else's card, so this read
/// bypasses the local cache. Row-level security on the remote side
/// already filters what the caller may see: an unknown, private, or
/// deleted id comes back as `None` - a not-found state, not an error.
pub fn fetch_card(remote: &dyn RemoteStore, id: &CardId) -> Result<Option<Card>, RemoteError> {
    let Some(row) = remote.fetch_one(CARDS_TABLE, id.as_str())? else {
        return Ok(None);
    };
    match card_from_remote(&row) {
        Some(card) => Ok(Some(card)),
        None => {
            warn!(%id, "remote returned a card row without an id");
            Ok(None)
        }
    }
}
