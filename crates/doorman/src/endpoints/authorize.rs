//! The authorization endpoint.
//!
//! Entry point for the consent UI's `POST /authorize`. The caller is an
//! already-authenticated user; the state machine validates the request,
//! upserts the consent record, issues a single-use code, and answers
//! with a redirect envelope the user agent follows.

use chrono::{Duration, Utc};
use uuid::Uuid;

use doorman_core::error::{ErrorMap, OAuthErrorCode, StoreError};
use doorman_core::model::{Authorization, Client, GrantKind, NewGrant, Principal};

use crate::context::ProviderContext;
use crate::crypto::random;
use crate::validate::authorize::{
    validate_authorize, AuthorizeChangeSet, AuthorizeOutcome, AuthorizeParams,
};

/// What the HTTP layer sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeReply {
    /// 200 `{"redirect_to": …}`: success or a redirectable error; the
    /// user agent performs the actual redirect.
    RedirectTo(String),
    /// 400 `{"errors": …}`: the redirect target is untrusted.
    Invalid(ErrorMap),
    /// 500, no body details. The cause is logged.
    ServerError,
}

pub async fn handle_authorize(
    ctx: &ProviderContext,
    principal: &Principal,
    params: AuthorizeParams,
) -> AuthorizeReply {
    let client = match lookup_client(ctx, &params).await {
        Ok(client) => client,
        Err(reply) => return reply,
    };

    let prior_authorization = match &client {
        Some(client) => {
            match ctx
                .store
                .authorization(client.id, &principal.user_id)
                .await
            {
                Ok(prior) => prior,
                Err(e) => return storage_failure(ctx, "authorization lookup", e),
            }
        }
        None => None,
    };

    match validate_authorize(
        &params,
        client.as_ref(),
        prior_authorization.as_ref(),
        &ctx.options,
    ) {
        AuthorizeOutcome::NoRedirect(errors) => AuthorizeReply::Invalid(errors),
        AuthorizeOutcome::Redirect {
            redirect_uri,
            error,
            errors,
            state,
        } => AuthorizeReply::RedirectTo(error_redirect(
            &redirect_uri,
            error,
            &errors,
            state.as_deref(),
        )),
        AuthorizeOutcome::Authorize(change_set) => issue_grant(ctx, principal, change_set).await,
    }
}

async fn lookup_client(
    ctx: &ProviderContext,
    params: &AuthorizeParams,
) -> Result<Option<Client>, AuthorizeReply> {
    let Some(id) = params
        .client_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
    else {
        // Presence and format errors are the validator's to report.
        return Ok(None);
    };

    ctx.store
        .client(id)
        .await
        .map_err(|e| storage_failure(ctx, "client lookup", e))
}

/// The `Authorize` state: upsert consent, mint a code, build the
/// redirect.
async fn issue_grant(
    ctx: &ProviderContext,
    principal: &Principal,
    change_set: AuthorizeChangeSet,
) -> AuthorizeReply {
    let authorization: Authorization = match ctx
        .store
        .upsert_authorization(change_set.client_id, &principal.user_id, &change_set.scope)
        .await
    {
        Ok(authorization) => authorization,
        Err(e) => return store_error_reply(ctx, "authorization upsert", e),
    };

    let code = random::generate_secret();

    let encrypted_code_challenge = match &change_set.code_challenge {
        Some(challenge) => match ctx.keys.encrypt_code_challenge(challenge) {
            Ok(encrypted) => Some(encrypted),
            Err(e) => {
                ctx.logger
                    .error(&format!("code challenge encryption failed: {e}"));
                return AuthorizeReply::ServerError;
            }
        },
        None => None,
    };

    let grant = NewGrant {
        authorization_id: authorization.id,
        resource_owner_id: principal.user_id.clone(),
        kind: GrantKind::AuthorizationCode,
        redirect_uri: change_set.redirect_uri.clone(),
        redirect_uri_specified: change_set.redirect_uri_specified,
        encrypted_code_challenge,
        code_digest: ctx.keys.code_digest(&code),
        expires_at: Utc::now() + Duration::seconds(ctx.options.grant_ttl as i64),
    };

    if let Err(e) = ctx.store.insert_grant(grant).await {
        return store_error_reply(ctx, "grant insert", e);
    }

    let mut pairs = vec![("code", code.as_str())];
    if let Some(state) = change_set.state.as_deref() {
        pairs.push(("state", state));
    }
    AuthorizeReply::RedirectTo(append_query(&change_set.redirect_uri, &pairs))
}

/// Translate constraint violations into field errors; anything else is
/// a logged 500.
fn store_error_reply(ctx: &ProviderContext, during: &str, error: StoreError) -> AuthorizeReply {
    match error {
        StoreError::UniqueViolation("authorization") => {
            let mut errors = ErrorMap::new();
            errors.add("authorization", "user already authorized this client");
            AuthorizeReply::Invalid(errors)
        }
        StoreError::ForeignKeyViolation(what) => {
            let mut errors = ErrorMap::new();
            errors.add(what, "does not exist");
            AuthorizeReply::Invalid(errors)
        }
        other => storage_failure(ctx, during, other),
    }
}

fn storage_failure(ctx: &ProviderContext, during: &str, error: StoreError) -> AuthorizeReply {
    ctx.logger
        .error(&format!("storage failure during {during}: {error}"));
    AuthorizeReply::ServerError
}

fn error_redirect(
    redirect_uri: &str,
    error: OAuthErrorCode,
    errors: &ErrorMap,
    state: Option<&str>,
) -> String {
    let description = errors.description();
    let mut pairs = vec![("error", error.code()), ("error_description", &description)];
    if let Some(state) = state {
        pairs.push(("state", state));
    }
    append_query(redirect_uri, &pairs)
}

fn append_query(uri: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = String::from(uri);
    let mut separator = if uri.contains('?') { '&' } else { '?' };
    for (key, value) in pairs {
        out.push(separator);
        out.push_str(key);
        out.push('=');
        out.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    out
}
