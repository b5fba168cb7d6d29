//! Domain model: the Card record and its encode/decode boundaries.

mod card;
mod patch;
mod social;

pub use card::{ActorId, CARDS_TABLE, Card, CardFields, CardId, Theme};
pub use patch::{CardPatch, Patch};
pub use social::{DecodeError, decode_links, decode_links_lossy, encode_links};

pub(crate) use card::now_rfc3339;
