//! The token endpoint.
//!
//! Exchanges authorization codes and refresh tokens for bearer tokens.
//! Client authentication runs before any grant-specific work; the grant
//! row is deleted before token issuance so a code can be redeemed
//! exactly once even under concurrent exchanges.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use doorman_core::error::{OAuthErrorCode, StoreError};
use doorman_core::model::{Client, ClientType};
use doorman_core::scope::ScopeSet;
use doorman_core::session::{RefreshVerifyError, SessionUpsertArgs};
use doorman_core::store::DeleteOutcome;

use crate::context::ProviderContext;
use crate::crypto::constant_time_equal;
use crate::validate::token::{
    recognize_grant_type, validate_code_exchange, validate_refresh, TokenError, TokenGrantType,
    TokenParams,
};

/// Client credentials as presented by the request. When an
/// `Authorization: Basic` header is present it wins and any body
/// credentials are ignored; authentication failures then answer 401
/// instead of 400.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub from_basic_header: bool,
}

impl ClientCredentials {
    pub fn from_body(params: &TokenParams) -> Self {
        Self {
            client_id: params.client_id.clone(),
            client_secret: params.client_secret.clone(),
            from_basic_header: false,
        }
    }
}

/// RFC 6749 §5.1 success body, plus the refresh expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<i64>,
    pub scope: String,
}

/// What the HTTP layer sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenReply {
    /// 200 JSON.
    Success(TokenResponseBody),
    /// 400 JSON `{"error", "error_description"}`.
    Error {
        error: OAuthErrorCode,
        description: String,
    },
    /// 401 with `WWW-Authenticate: Basic` and a plain-text body.
    BasicAuthFailed,
    /// 500, no body details. The cause is logged.
    ServerError,
}

impl From<TokenError> for TokenReply {
    fn from(e: TokenError) -> Self {
        TokenReply::Error {
            error: e.error,
            description: e.description(),
        }
    }
}

fn protocol_error(error: OAuthErrorCode, field: &str, message: &str) -> TokenReply {
    TokenReply::Error {
        error,
        description: format!("{field}: {message}"),
    }
}

pub async fn handle_token(
    ctx: &ProviderContext,
    credentials: ClientCredentials,
    params: TokenParams,
) -> TokenReply {
    let grant_type = match recognize_grant_type(&params) {
        Ok(grant_type) => grant_type,
        Err(e) => return e.into(),
    };

    let client = match authenticate_client(ctx, &credentials).await {
        Ok(client) => client,
        Err(reply) => return reply,
    };

    match grant_type {
        TokenGrantType::AuthorizationCode => exchange_code(ctx, &client, &params).await,
        TokenGrantType::RefreshToken => exchange_refresh(ctx, &client, &params).await,
    }
}

/// Authenticate the requesting client.
///
/// Confidential clients must present their secret; public clients may
/// omit it, but a supplied secret still has to match (catches
/// misconfigured public clients early). Comparison is constant-time
/// against the decrypted stored value.
async fn authenticate_client(
    ctx: &ProviderContext,
    credentials: &ClientCredentials,
) -> Result<Client, TokenReply> {
    let failure = || {
        if credentials.from_basic_header {
            TokenReply::BasicAuthFailed
        } else {
            TokenReply::Error {
                error: OAuthErrorCode::InvalidClient,
                description: "client authentication failed".into(),
            }
        }
    };

    let Some(id) = credentials
        .client_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        return Err(failure());
    };

    let client = match ctx.store.client(id).await {
        Ok(Some(client)) => client,
        Ok(None) => return Err(failure()),
        Err(e) => return Err(storage_failure(ctx, "client lookup", e)),
    };

    let stored_secret = match ctx.keys.decrypt_client_secret(&client.encrypted_secret) {
        Ok(secret) => secret,
        Err(e) => {
            ctx.logger
                .error(&format!("client secret decryption failed: {e}"));
            return Err(TokenReply::ServerError);
        }
    };

    match credentials.client_secret.as_deref() {
        Some(supplied) => {
            if constant_time_equal(supplied.as_bytes(), stored_secret.as_bytes()) {
                Ok(client)
            } else {
                Err(failure())
            }
        }
        None if client.client_type == ClientType::Confidential => Err(failure()),
        None => Ok(client),
    }
}

async fn exchange_code(ctx: &ProviderContext, client: &Client, params: &TokenParams) -> TokenReply {
    let Some(code) = params.code.as_deref() else {
        return protocol_error(OAuthErrorCode::InvalidRequest, "code", "can't be blank");
    };

    let found = match ctx.store.grant_by_code(&ctx.keys.code_digest(code)).await {
        Ok(Some(found)) => found,
        Ok(None) => return protocol_error(OAuthErrorCode::InvalidGrant, "code", "not found"),
        Err(e) => return storage_failure(ctx, "grant lookup", e),
    };

    let code_challenge = match &found.grant.encrypted_code_challenge {
        Some(encrypted) => match ctx.keys.decrypt_code_challenge(encrypted) {
            Ok(challenge) => Some(challenge),
            Err(e) => {
                ctx.logger
                    .error(&format!("code challenge decryption failed: {e}"));
                return TokenReply::ServerError;
            }
        },
        None => None,
    };

    let scope = match validate_code_exchange(
        params,
        &found,
        client,
        code_challenge.as_deref(),
        Utc::now(),
    ) {
        Ok(scope) => scope,
        Err(e) => return e.into(),
    };

    // Single use: the conditional delete gates issuance. Of two
    // concurrent exchanges, the loser sees NotFound here.
    match ctx.store.delete_grant(found.grant.id).await {
        Ok(DeleteOutcome::Deleted) => {}
        Ok(DeleteOutcome::NotFound) => {
            return protocol_error(OAuthErrorCode::InvalidGrant, "code", "not found")
        }
        Err(e) => return storage_failure(ctx, "grant delete", e),
    }

    mint_tokens(ctx, &found.grant.resource_owner_id, client, &scope).await
}

async fn exchange_refresh(
    ctx: &ProviderContext,
    client: &Client,
    params: &TokenParams,
) -> TokenReply {
    let Some(raw_token) = params.refresh_token.as_deref() else {
        return protocol_error(
            OAuthErrorCode::InvalidRequest,
            "refresh_token",
            "can't be blank",
        );
    };

    let claims = match ctx.refresh_verifier.verify(raw_token).await {
        Ok(claims) => claims,
        Err(e) => {
            if e == RefreshVerifyError::Reused {
                ctx.logger.warn(&format!(
                    "invalidated refresh token presented by client {}",
                    client.id
                ));
            }
            return protocol_error(OAuthErrorCode::InvalidGrant, "refresh_token", &e.to_string());
        }
    };

    let authorization = match ctx.store.authorization(client.id, &claims.sub).await {
        Ok(authorization) => authorization,
        Err(e) => return storage_failure(ctx, "authorization lookup", e),
    };

    let scope = match validate_refresh(params, &claims, client, authorization.as_ref()) {
        Ok(scope) => scope,
        Err(e) => return e.into(),
    };

    mint_tokens(ctx, &claims.sub, client, &scope).await
}

async fn mint_tokens(
    ctx: &ProviderContext,
    user_id: &str,
    client: &Client,
    scope: &ScopeSet,
) -> TokenReply {
    let mut args = SessionUpsertArgs::oauth2(user_id);

    // Integrator hook first; the core-owned fields and claims are set
    // afterwards so they cannot be overridden.
    if let Some(hook) = &ctx.options.customize_session_upsert_args {
        hook(&mut args);
    }
    args.user_id = user_id.to_string();
    args.token_transport = doorman_core::session::TOKEN_TRANSPORT_BEARER.into();
    args.session_type = doorman_core::session::SESSION_TYPE_OAUTH2.into();
    args.access_claim_overrides
        .insert("cid".into(), Value::String(client.id.to_string()));
    args.access_claim_overrides.insert(
        "scope".into(),
        Value::Array(scope.iter().map(|s| Value::String(s.into())).collect()),
    );
    args.refresh_claim_overrides
        .insert("cid".into(), Value::String(client.id.to_string()));

    let bundle = match ctx.minter.mint(args).await {
        Ok(bundle) => bundle,
        Err(e) => {
            ctx.logger.error(&format!("token minting failed: {e}"));
            return TokenReply::ServerError;
        }
    };

    let now = Utc::now();
    TokenReply::Success(TokenResponseBody {
        access_token: bundle.access_token,
        token_type: "bearer".into(),
        expires_in: (bundle.access_expires_at - now).num_seconds(),
        refresh_token: bundle.refresh_token,
        refresh_expires_in: bundle
            .refresh_expires_at
            .map(|expires_at| (expires_at - now).num_seconds()),
        scope: scope.join(),
    })
}

fn storage_failure(ctx: &ProviderContext, during: &str, error: StoreError) -> TokenReply {
    ctx.logger
        .error(&format!("storage failure during {during}: {error}"));
    TokenReply::ServerError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_body_omits_absent_refresh_fields() {
        let body = TokenResponseBody {
            access_token: "at".into(),
            token_type: "bearer".into(),
            expires_in: 3600,
            refresh_token: None,
            refresh_expires_in: None,
            scope: "read".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert!(json.get("refresh_expires_in").is_none());
        assert_eq!(json["token_type"], "bearer");
    }

    #[test]
    fn test_protocol_error_description_shape() {
        let reply = protocol_error(OAuthErrorCode::InvalidGrant, "code", "not found");
        match reply {
            TokenReply::Error { error, description } => {
                assert_eq!(error, OAuthErrorCode::InvalidGrant);
                assert_eq!(description, "code: not found");
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
