//! Remote store client seam and representation translation.
//!
//! Rows cross this boundary as JSON objects shaped like the remote
//! schema: `is_public` a native boolean, `social_media` a native array.
//! Locally both live in SQLite-friendly encodings (0/1 integer, JSON
//! text blob); the translation in both directions is here.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::{ActorId, Card, CardId, Theme, decode_links_lossy};
use crate::error::Transience;

/// One row in remote representation.
pub type RemoteRow = Map<String, Value>;

/// Structured error from the remote store client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The store rejected the operation (constraint or validation).
    #[error("remote store rejected the operation: {message}")]
    Rejected { message: String },

    /// Transport-level failure reaching the store.
    #[error("remote store unreachable: {message}")]
    Unavailable { message: String },
}

impl RemoteError {
    pub fn transience(&self) -> Transience {
        match self {
            RemoteError::Rejected { .. } => Transience::Unknown,
            RemoteError::Unavailable { .. } => Transience::Retryable,
        }
    }
}

/// Injected remote store client.
///
/// Row-level security is the remote side's concern: reads return only
/// rows the authenticated caller is permitted to see.
pub trait RemoteStore: Send + Sync {
    /// Insert-or-replace by the row's `id`. Idempotent: replaying an
    /// already-applied upsert must not error or duplicate.
    fn upsert(&self, table: &str, row: &RemoteRow) -> Result<(), RemoteError>;

    /// Update the given columns of the row matching `id`.
    fn update(&self, table: &str, id: &str, fields: &RemoteRow) -> Result<(), RemoteError>;

    /// Delete the row matching `id`. Deleting an absent row succeeds.
    fn delete(&self, table: &str, id: &str) -> Result<(), RemoteError>;

    /// Fetch one row by id; `None` for unknown or unauthorized ids.
    fn fetch_one(&self, table: &str, id: &str) -> Result<Option<RemoteRow>, RemoteError>;

    /// Snapshot of all rows visible to this client.
    fn pull(&self, table: &str) -> Result<Vec<RemoteRow>, RemoteError>;
}

/// Translate touched columns from local to remote representation.
pub(crate) fn local_fields_to_remote(fields: &Map<String, Value>) -> RemoteRow {
    let mut out = fields.clone();
    if let Some(value) = out.get_mut("is_public") {
        *value = Value::Bool(is_truthy(value));
    }
    if let Some(value) = out.get_mut("social_media")
        && let Value::String(blob) = &*value
    {
        let links = decode_links_lossy(Some(blob.as_str()));
        *value = Value::Array(links.into_iter().map(Value::String).collect());
    }
    out
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Decode an authoritative remote row into a card.
///
/// Returns `None` when the row carries no usable id. Other malformed
/// fields degrade to their defaults; the remote is authoritative and a
/// cosmetic defect must not block reconciliation.
pub(crate) fn card_from_remote(row: &RemoteRow) -> Option<Card> {
    let id = row.get("id").and_then(Value::as_str)?;
    let text = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .map(|s| s.to_string())
    };
    Some(Card {
        id: CardId::new(id),
        digital_card_name: text("digital_card_name"),
        full_name: text("full_name"),
        first_name: text("first_name"),
        middle_name: text("middle_name"),
        last_name: text("last_name"),
        prefix: text("prefix"),
        suffix: text("suffix"),
        accreditations: text("accreditations"),
        preferred_name: text("preferred_name"),
        title: text("title"),
        department: text("department"),
        company: text("company"),
        headline: text("headline"),
        background_url: text("background_url"),
        avatar_url: text("avatar_url"),
        contact_type: text("contact_type"),
        digital_card_url: text("digital_card_url"),
        notes: text("notes"),
        qr_code: text("qr_code"),
        created_at: text("created_at"),
        is_public: row.get("is_public").map(is_truthy).unwrap_or(false),
        user_id: text("user_id").map(ActorId::new),
        theme: row
            .get("theme")
            .and_then(Value::as_str)
            .and_then(Theme::parse)
            .unwrap_or_default(),
        social_media: social_from_remote(row.get("social_media")),
    })
}

fn social_from_remote(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.to_string())
            .collect(),
        // Some stores hand the blob back un-decoded; accept it.
        Some(Value::String(blob)) => decode_links_lossy(Some(blob.as_str())),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn visibility_integer_becomes_boolean() {
        let fields = map(&[("is_public", Value::from(1))]);
        assert_eq!(local_fields_to_remote(&fields)["is_public"], Value::Bool(true));

        let fields = map(&[("is_public", Value::from(0))]);
        assert_eq!(
            local_fields_to_remote(&fields)["is_public"],
            Value::Bool(false)
        );
    }

    #[test]
    fn untouched_fields_pass_through() {
        let fields = map(&[("title", Value::String("Engineer".into()))]);
        let out = local_fields_to_remote(&fields);
        assert_eq!(out["title"], Value::String("Engineer".into()));
        assert!(!out.contains_key("is_public"));
    }

    #[test]
    fn social_blob_becomes_native_array() {
        let fields = map(&[(
            "social_media",
            Value::String(r#"["https://x.com/ada",""]"#.into()),
        )]);
        let out = local_fields_to_remote(&fields);
        assert_eq!(
            out["social_media"],
            Value::Array(vec![
                Value::String("https://x.com/ada".into()),
                Value::String(String::new()),
            ])
        );
    }

    #[test]
    fn malformed_social_blob_uploads_as_empty_array() {
        let fields = map(&[("social_media", Value::String("not json".into()))]);
        let out = local_fields_to_remote(&fields);
        assert_eq!(out["social_media"], Value::Array(Vec::new()));
    }

    #[test]
    fn remote_row_decodes_to_card() {
        let row = map(&[
            ("id", Value::String("c1".into())),
            ("full_name", Value::String("Ada Lovelace".into())),
            ("is_public", Value::Bool(true)),
            ("theme", Value::String("neon".into())),
            (
                "social_media",
                Value::Array(vec![Value::String("https://x.com/ada".into())]),
            ),
        ]);
        let card = card_from_remote(&row).unwrap();
        assert_eq!(card.id.as_str(), "c1");
        assert!(card.is_public);
        assert_eq!(card.theme, Theme::Neon);
        assert_eq!(card.social_media, vec!["https://x.com/ada".to_string()]);
    }

    #[test]
    fn remote_row_without_id_is_rejected() {
        let row = map(&[("full_name", Value::String("nobody".into()))]);
        assert!(card_from_remote(&row).is_none());
    }
}
