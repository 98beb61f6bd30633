//! Verified identities and the seam to whatever verifies them.
//!
//! The hub never issues or inspects credentials itself. A transport is
//! authenticated once at handshake time by an [`IdentityVerifier`], and the
//! resulting [`Identity`] stays attached to that transport until it closes.

use chatter_protocol::{PresenceEntry, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A verified `(UserID, Username)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
}

impl Identity {
    /// Create a new identity.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

impl From<Identity> for PresenceEntry {
    fn from(identity: Identity) -> Self {
        PresenceEntry {
            user_id: identity.user_id,
            username: identity.username,
        }
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("Missing credential")]
    MissingCredential,

    /// The credential could not be verified.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The credential has expired.
    #[error("Credential expired")]
    Expired,

    /// The transport never completed authentication.
    #[error("Connection is not authenticated")]
    Unauthenticated,
}

/// Resolves a handshake credential into an identity.
///
/// Implementations must be cheap to call; verification happens once per
/// transport, on the upgrade path.
pub trait IdentityVerifier: Send + Sync {
    /// Verify a credential.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the credential is missing, malformed,
    /// forged or expired.
    fn verify(&self, credential: &str) -> Result<Identity, AuthError>;
}
