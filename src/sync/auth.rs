//! Authentication seam.

use time::OffsetDateTime;

use crate::core::ActorId;

/// An authenticated session as reported by the host's auth provider.
#[derive(Debug, Clone)]
pub struct Session {
    pub actor: ActorId,
    pub access_token: String,
    pub expires_at: Option<OffsetDateTime>,
}

/// Injected auth provider.
///
/// The uploader resolves the actor exactly once per upload transaction;
/// no session means the whole transaction is deferred with `AuthRequired`.
pub trait AuthProvider: Send + Sync {
    fn session(&self) -> Option<Session>;

    fn current_actor(&self) -> Option<ActorId> {
        self.session().map(|session| session.actor)
    }
}
