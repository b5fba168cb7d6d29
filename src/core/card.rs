//! The Card record - the system's only domain entity.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Logical table name shared by the local and remote schemas.
pub const CARDS_TABLE: &str = "digital_cards";

/// Card identifier - a client-generated UUID string.
///
/// Generated at creation time so the sharable URL is known before the
/// first remote write. Immutable once set.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardId({:?})", self.0)
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor identifier - the authenticated user owning a card.
///
/// Assigned by the auth provider; the sync core never invents one.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({:?})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card presentation theme.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Minimalist,
    Glass,
    Neon,
    Corporate,
    Gradient,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Minimalist => "minimalist",
            Theme::Glass => "glass",
            Theme::Neon => "neon",
            Theme::Corporate => "corporate",
            Theme::Gradient => "gradient",
        }
    }

    pub fn parse(s: &str) -> Option<Theme> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "minimalist" => Some(Theme::Minimalist),
            "glass" => Some(Theme::Glass),
            "neon" => Some(Theme::Neon),
            "corporate" => Some(Theme::Corporate),
            "gradient" => Some(Theme::Gradient),
            _ => None,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A digital business card.
///
/// Fixed-shape record mirroring one row of `digital_cards`. Fields are
/// named after their columns so the local and remote schemas stay legible
/// side by side. `is_public` and `social_media` carry decoded values here;
/// the store and sync layers own the 0/1-integer and JSON-blob encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    /// Private internal label shown only to the owner.
    pub digital_card_name: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub accreditations: Option<String>,
    pub preferred_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub company: Option<String>,
    pub headline: Option<String>,
    pub background_url: Option<String>,
    pub avatar_url: Option<String>,
    /// Single free-form contact string (phone or email).
    pub contact_type: Option<String>,
    pub digital_card_url: Option<String>,
    pub notes: Option<String>,
    /// Opaque QR payload; rendered by the presentation layer.
    pub qr_code: Option<String>,
    /// RFC 3339 creation timestamp, set once at local create.
    pub created_at: Option<String>,
    pub is_public: bool,
    pub user_id: Option<ActorId>,
    pub theme: Theme,
    /// Ordered social-media links. Persisted as a JSON text blob locally
    /// and a native array remotely; must round-trip without loss.
    pub social_media: Vec<String>,
}

impl Card {
    /// Derive a create payload from an existing card.
    ///
    /// Drops the unique/system identifiers (id, internal label, creation
    /// timestamp) so the result counts as a new create rather than an edit.
    pub fn prefill(&self) -> CardFields {
        CardFields {
            digital_card_name: None,
            full_name: self.full_name.clone(),
            first_name: self.first_name.clone(),
            middle_name: self.middle_name.clone(),
            last_name: self.last_name.clone(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            accreditations: self.accreditations.clone(),
            preferred_name: self.preferred_name.clone(),
            title: self.title.clone(),
            department: self.department.clone(),
            company: self.company.clone(),
            headline: self.headline.clone(),
            background_url: self.background_url.clone(),
            avatar_url: self.avatar_url.clone(),
            contact_type: self.contact_type.clone(),
            digital_card_url: self.digital_card_url.clone(),
            notes: self.notes.clone(),
            qr_code: self.qr_code.clone(),
            is_public: self.is_public,
            user_id: self.user_id.clone(),
            theme: self.theme,
            social_media: self.social_media.clone(),
        }
    }
}

/// Payload for creating a new card.
///
/// Everything a [`Card`] carries except the identity and creation
/// timestamp, which the store assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardFields {
    pub digital_card_name: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub accreditations: Option<String>,
    pub preferred_name: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub company: Option<String>,
    pub headline: Option<String>,
    pub background_url: Option<String>,
    pub avatar_url: Option<String>,
    pub contact_type: Option<String>,
    pub digital_card_url: Option<String>,
    pub notes: Option<String>,
    pub qr_code: Option<String>,
    pub is_public: bool,
    pub user_id: Option<ActorId>,
    pub theme: Theme,
    pub social_media: Vec<String>,
}

impl Default for CardFields {
    fn default() -> Self {
        Self {
            digital_card_name: None,
            full_name: None,
            first_name: None,
            middle_name: None,
            last_name: None,
            prefix: None,
            suffix: None,
            accreditations: None,
            preferred_name: None,
            title: None,
            department: None,
            company: None,
            headline: None,
            background_url: None,
            avatar_url: None,
            contact_type: None,
            digital_card_url: None,
            notes: None,
            qr_code: None,
            // New cards default to publicly visible, matching the form.
            is_public: true,
            user_id: None,
            theme: Theme::Light,
            social_media: Vec::new(),
        }
    }
}

impl CardFields {
    /// Materialize the payload into a full card.
    pub(crate) fn into_card(self, id: CardId, created_at: String) -> Card {
        Card {
            id,
            digital_card_name: self.digital_card_name,
            full_name: self.full_name,
            first_name: self.first_name,
            middle_name: self.middle_name,
            last_name: self.last_name,
            prefix: self.prefix,
            suffix: self.suffix,
            accreditations: self.accreditations,
            preferred_name: self.preferred_name,
            title: self.title,
            department: self.department,
            company: self.company,
            headline: self.headline,
            background_url: self.background_url,
            avatar_url: self.avatar_url,
            contact_type: self.contact_type,
            digital_card_url: self.digital_card_url,
            notes: self.notes,
            qr_code: self.qr_code,
            created_at: Some(created_at),
            is_public: self.is_public,
            user_id: self.user_id,
            theme: self.theme,
            social_media: self.social_media,
        }
    }
}

/// Current wall time as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
