//! Three-way patches for partial card updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::card::Theme;
use super::social::encode_links;

/// Three-way patch for updating a field.
///
/// This is the clean solution to the "Option<Option<T>>" problem for nullable fields:
/// - `Keep` - Don't change the field
/// - `Clear` - Set the field to None
/// - `Set(T)` - Set the field to Some(T)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    /// Don't change the field.
    #[default]
    Keep,
    /// Clear the field (set to None).
    Clear,
    /// Set the field to a new value.
    Set(T),
}

impl<T> Patch<T> {
    /// Check if this patch would change the value.
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    /// Apply the patch to a current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Keep => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }
}

// Custom serde for Patch: absent = Keep, null = Clear, value = Set
impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Patch::Keep => serializer.serialize_none(),
            Patch::Clear => serializer.serialize_none(),
            Patch::Set(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // If present and null -> Clear
        // If present and value -> Set
        // If absent -> Keep (handled by #[serde(default)])
        let opt: Option<T> = Option::deserialize(deserializer)?;
        match opt {
            None => Ok(Patch::Clear),
            Some(v) => Ok(Patch::Set(v)),
        }
    }
}

/// Partial update for card fields.
///
/// All fields default to `Keep`, meaning no change. The identity fields
/// (id, user_id, created_at) are not patchable: id and created_at are
/// immutable and user_id is owned by the uploader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub digital_card_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub full_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub first_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub middle_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub last_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub prefix: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub suffix: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub accreditations: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub preferred_name: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub title: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub department: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub company: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub headline: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub background_url: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub avatar_url: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub contact_type: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub digital_card_url: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub notes: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub qr_code: Patch<String>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub is_public: Patch<bool>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub theme: Patch<Theme>,

    #[serde(default, skip_serializing_if = "Patch::is_keep")]
    pub social_media: Patch<Vec<String>>,
}

impl CardPatch {
    /// Patch that only flips the visibility flag.
    pub fn visibility(public: bool) -> Self {
        Self {
            is_public: Patch::Set(public),
            ..Self::default()
        }
    }

    /// True if no field would change.
    pub fn is_empty(&self) -> bool {
        self.touched_columns().is_empty()
    }

    /// Render the touched columns in their local (SQLite) representation:
    /// booleans as 0/1 integers, the social list as a JSON text blob.
    ///
    /// This map is what the mutation log persists and what the SQL UPDATE
    /// binds; untouched columns are absent.
    pub fn touched_columns(&self) -> Map<String, Value> {
        let mut map = Map::new();

        let mut text = |name: &str, patch: &Patch<String>| match patch {
            Patch::Keep => {}
            Patch::Clear => {
                map.insert(name.to_string(), Value::Null);
            }
            Patch::Set(v) => {
                map.insert(name.to_string(), Value::String(v.clone()));
            }
        };

        text("digital_card_name", &self.digital_card_name);
        text("full_name", &self.full_name);
        text("first_name", &self.first_name);
        text("middle_name", &self.middle_name);
        text("last_name", &self.last_name);
        text("prefix", &self.prefix);
        text("suffix", &self.suffix);
        text("accreditations", &self.accreditations);
        text("preferred_name", &self.preferred_name);
        text("title", &self.title);
        text("department", &self.department);
        text("company", &self.company);
        text("headline", &self.headline);
        text("background_url", &self.background_url);
        text("avatar_url", &self.avatar_url);
        text("contact_type", &self.contact_type);
        text("digital_card_url", &self.digital_card_url);
        text("notes", &self.notes);
        text("qr_code", &self.qr_code);

        match &self.is_public {
            Patch::Keep => {}
            Patch::Clear => {
                map.insert("is_public".to_string(), Value::Null);
            }
            Patch::Set(v) => {
                map.insert("is_public".to_string(), Value::from(i64::from(*v)));
            }
        }

        match &self.theme {
            Patch::Keep => {}
            Patch::Clear => {
                map.insert("theme".to_string(), Value::Null);
            }
            Patch::Set(v) => {
                map.insert("theme".to_string(), Value::String(v.as_str().to_string()));
            }
        }

        match &self.social_media {
            Patch::Keep => {}
            Patch::Clear => {
                map.insert("social_media".to_string(), Value::Null);
            }
            Patch::Set(links) => {
                map.insert(
                    "social_media".to_string(),
                    Value::String(encode_links(links)),
                );
            }
        }

        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_fields_are_absent_from_touched_columns() {
        let patch = CardPatch {
            title: Patch::Set("Engineer".into()),
            notes: Patch::Clear,
            ..CardPatch::default()
        };
        let cols = patch.touched_columns();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols["title"], Value::String("Engineer".into()));
        assert_eq!(cols["notes"], Value::Null);
    }

    #[test]
    fn visibility_renders_as_integer() {
        let cols = CardPatch::visibility(true).touched_columns();
        assert_eq!(cols["is_public"], Value::from(1));
        let cols = CardPatch::visibility(false).touched_columns();
        assert_eq!(cols["is_public"], Value::from(0));
    }

    #[test]
    fn social_media_renders_as_json_blob() {
        let patch = CardPatch {
            social_media: Patch::Set(vec!["https://x.com/ada".into(), String::new()]),
            ..CardPatch::default()
        };
        let cols = patch.touched_columns();
        assert_eq!(
            cols["social_media"],
            Value::String(r#"["https://x.com/ada",""]"#.into())
        );
    }

    #[test]
    fn empty_patch_touches_nothing() {
        assert!(CardPatch::default().is_empty());
        assert!(!CardPatch::visibility(true).is_empty());
    }

    #[test]
    fn patch_serde_distinguishes_clear_from_keep() {
        let patch = CardPatch {
            title: Patch::Clear,
            ..CardPatch::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"title":null}"#);

        let parsed: CardPatch = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.title, Patch::Clear);
        assert_eq!(parsed.company, Patch::Keep);
    }
}
