//! Reference JWT session manager.
//!
//! Signs HS256 access/refresh tokens and keeps a server-side session
//! record per `(user_id, session_type)` through a [`SessionStore`].
//! Every mint rotates the session's token index; a refresh token is
//! accepted at the current index, or at the previous one for a short
//! grace window after rotation (clock skew, client retries near the
//! boundary). Older indexes are treated as reuse.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use doorman_core::session::{
    MintError, RefreshClaims, RefreshTokenVerifier, RefreshVerifyError, SessionStore,
    SessionUpsertArgs, TokenBundle, TokenMinter, SESSION_TYPE_OAUTH2,
};

const TOKEN_KIND_ACCESS: &str = "access";
const TOKEN_KIND_REFRESH: &str = "refresh";

#[derive(Debug, Clone)]
pub struct JwtSessionOptions {
    /// Access-token lifetime in seconds.
    pub access_ttl: i64,
    /// Refresh-token lifetime in seconds.
    pub refresh_ttl: i64,
    /// Seconds the previous token index stays valid after a rotation.
    pub reuse_grace: i64,
}

impl Default for JwtSessionOptions {
    fn default() -> Self {
        Self {
            access_ttl: 3_600,
            refresh_ttl: 30 * 24 * 3_600,
            reuse_grace: 10,
        }
    }
}

/// Token minter and refresh-token verifier over a [`SessionStore`].
pub struct JwtSessionManager {
    secret: String,
    sessions: Arc<dyn SessionStore>,
    options: JwtSessionOptions,
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: String,
    sid: String,
    ti: i64,
    typ: String,
    styp: String,
    iat: i64,
    nbf: i64,
    exp: i64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl JwtSessionManager {
    pub fn new(secret: impl Into<String>, sessions: Arc<dyn SessionStore>) -> Self {
        Self::with_options(secret, sessions, JwtSessionOptions::default())
    }

    pub fn with_options(
        secret: impl Into<String>,
        sessions: Arc<dyn SessionStore>,
        options: JwtSessionOptions,
    ) -> Self {
        Self {
            secret: secret.into(),
            sessions,
            options,
        }
    }

    fn sign(&self, claims: &JwtClaims) -> Result<String, MintError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| MintError(format!("JWT signing failed: {e}")))
    }

    fn claims(
        &self,
        args: &SessionUpsertArgs,
        session_id: &str,
        token_index: i64,
        kind: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        extra: &Map<String, Value>,
    ) -> JwtClaims {
        JwtClaims {
            sub: args.user_id.clone(),
            sid: session_id.to_string(),
            ti: token_index,
            typ: kind.to_string(),
            styp: args.session_type.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            extra: extra.clone(),
        }
    }
}

#[async_trait]
impl TokenMinter for JwtSessionManager {
    async fn mint(&self, args: SessionUpsertArgs) -> Result<TokenBundle, MintError> {
        let session = self
            .sessions
            .upsert(&args.user_id, &args.session_type)
            .await
            .map_err(|e| MintError(format!("session upsert failed: {e}")))?;

        let now = Utc::now();
        let access_expires_at = now + Duration::seconds(self.options.access_ttl);
        let access_token = self.sign(&self.claims(
            &args,
            &session.id,
            session.token_index,
            TOKEN_KIND_ACCESS,
            now,
            access_expires_at,
            &args.access_claim_overrides,
        ))?;

        let (refresh_token, refresh_expires_at) = if args.issue_refresh_token {
            let expires_at = now + Duration::seconds(self.options.refresh_ttl);
            let token = self.sign(&self.claims(
                &args,
                &session.id,
                session.token_index,
                TOKEN_KIND_REFRESH,
                now,
                expires_at,
                &args.refresh_claim_overrides,
            ))?;
            (Some(token), Some(expires_at))
        } else {
            (None, None)
        };

        Ok(TokenBundle {
            access_token,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
        })
    }
}

#[async_trait]
impl RefreshTokenVerifier for JwtSessionManager {
    async fn verify(&self, token: &str) -> Result<RefreshClaims, RefreshVerifyError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        let data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => RefreshVerifyError::Expired,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => RefreshVerifyError::NotYetValid,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => RefreshVerifyError::BadSignature,
            _ => RefreshVerifyError::Malformed,
        })?;
        let claims = data.claims;

        if claims.typ != TOKEN_KIND_REFRESH || claims.styp != SESSION_TYPE_OAUTH2 {
            return Err(RefreshVerifyError::WrongKind);
        }

        let session = self
            .sessions
            .get(&claims.sub, &claims.styp)
            .await
            .map_err(|_| RefreshVerifyError::UnknownSession)?
            .ok_or(RefreshVerifyError::UnknownSession)?;

        if session.id != claims.sid {
            return Err(RefreshVerifyError::UnknownSession);
        }

        let within_grace = claims.ti == session.token_index - 1
            && Utc::now() - session.rotated_at <= Duration::seconds(self.options.reuse_grace);
        if claims.ti != session.token_index && !within_grace {
            return Err(RefreshVerifyError::Reused);
        }

        let cid = claims
            .extra
            .get("cid")
            .and_then(Value::as_str)
            .ok_or(RefreshVerifyError::Malformed)?
            .to_string();

        Ok(RefreshClaims {
            sub: claims.sub,
            cid,
            session_id: claims.sid,
            token_index: claims.ti,
            extra: claims.extra,
        })
    }
}
