//! The session/token integration boundary.
//!
//! The host application owns token signing and session persistence; the
//! core drives it through these traits. Sessions minted here live in
//! their own `oauth2` namespace so bulk operations on the host's other
//! sessions never disturb third-party connections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// Token transport for sessions minted by this core.
pub const TOKEN_TRANSPORT_BEARER: &str = "bearer";

/// The logical session namespace for tokens issued by this core.
pub const SESSION_TYPE_OAUTH2: &str = "oauth2";

/// Arguments for a session upsert / token mint.
///
/// The core sets the transport, session type, and the `cid`/`scope`
/// claim overrides; integrators may add claims through
/// `ProviderOptions::customize_session_upsert_args`, which runs after
/// the core's values are in place and must not replace them.
#[derive(Debug, Clone)]
pub struct SessionUpsertArgs {
    pub user_id: String,
    pub token_transport: String,
    pub session_type: String,
    pub access_claim_overrides: Map<String, Value>,
    pub refresh_claim_overrides: Map<String, Value>,
    /// Flows that must not issue a refresh token clear this.
    pub issue_refresh_token: bool,
}

impl SessionUpsertArgs {
    pub fn oauth2(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token_transport: TOKEN_TRANSPORT_BEARER.to_string(),
            session_type: SESSION_TYPE_OAUTH2.to_string(),
            access_claim_overrides: Map::new(),
            refresh_claim_overrides: Map::new(),
            issue_refresh_token: true,
        }
    }
}

/// The tokens minted for one session upsert.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
#[error("token minting failed: {0}")]
pub struct MintError(pub String);

/// Mints access/refresh tokens, persisting a server-side session record
/// keyed by `(user_id, session_type)`.
#[async_trait]
pub trait TokenMinter: Send + Sync {
    async fn mint(&self, args: SessionUpsertArgs) -> Result<TokenBundle, MintError>;
}

/// Claims of a verified refresh token.
#[derive(Debug, Clone)]
pub struct RefreshClaims {
    /// Resource-owner id.
    pub sub: String,
    /// Client id the token was minted for.
    pub cid: String,
    pub session_id: String,
    pub token_index: i64,
    /// Any further claims the minter attached.
    pub extra: Map<String, Value>,
}

/// Why a refresh token was rejected. Every variant surfaces to the
/// client as `invalid_grant`; the message becomes the
/// `error_description` detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RefreshVerifyError {
    #[error("is malformed")]
    Malformed,
    #[error("signature verification failed")]
    BadSignature,
    #[error("is expired")]
    Expired,
    #[error("is not yet valid")]
    NotYetValid,
    #[error("is not a refresh token")]
    WrongKind,
    #[error("session no longer exists")]
    UnknownSession,
    #[error("was already used")]
    Reused,
}

/// Verifies a raw refresh token.
///
/// The default implementation checks signature, `nbf`, `exp`, the
/// refresh token kind, the `oauth2` session namespace, that the session
/// still exists, and that the token index is within the freshness grace
/// window (tolerating clock skew and retries near a rotation).
#[async_trait]
pub trait RefreshTokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<RefreshClaims, RefreshVerifyError>;
}

/// A server-side session record.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub session_type: String,
    /// Incremented on every mint; refresh tokens carry the index they
    /// were minted at.
    pub token_index: i64,
    pub rotated_at: DateTime<Utc>,
}

/// Persistence for session records, keyed by `(user_id, session_type)`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session or rotate its token index, returning the
    /// post-rotation record.
    async fn upsert(&self, user_id: &str, session_type: &str) -> StoreResult<SessionRecord>;

    async fn get(
        &self,
        user_id: &str,
        session_type: &str,
    ) -> StoreResult<Option<SessionRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth2_args_defaults() {
        let args = SessionUpsertArgs::oauth2("42");
        assert_eq!(args.user_id, "42");
        assert_eq!(args.token_transport, "bearer");
        assert_eq!(args.session_type, "oauth2");
        assert!(args.issue_refresh_token);
        assert!(args.access_claim_overrides.is_empty());
    }

    #[test]
    fn test_refresh_verify_error_messages() {
        assert_eq!(RefreshVerifyError::Expired.to_string(), "is expired");
        assert_eq!(
            RefreshVerifyError::Reused.to_string(),
            "was already used"
        );
        assert_eq!(
            RefreshVerifyError::UnknownSession.to_string(),
            "session no longer exists"
        );
    }
}
