//! Authorize-request validation.
//!
//! Validation is staged because OAuth 2.1 requires different HTTP
//! behavior per failure class:
//!
//! 1. No-redirect checks: `client_id`/`redirect_uri` problems must
//!    produce a 400 JSON body, never a redirect to an untrusted target.
//! 2. Redirect-base checks: once the redirect target is trusted,
//!    lexically unrecognizable `response_type`/`code_challenge_method`
//!    values redirect with `error=invalid_request`.
//! 3. Other checks: scope, PKCE, permission, and capability checks
//!    redirect with their specific OAuth error code.

use uuid::Uuid;

use doorman_core::error::{ErrorMap, OAuthErrorCode};
use doorman_core::model::{Authorization, Client, ClientType, GrantType};
use doorman_core::options::{EnforcePkce, ProviderOptions};
use doorman_core::scope::ScopeSet;

use crate::crypto::pkce;

/// Authorize-request parameters as cast from the request body.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub permission_granted: Option<String>,
}

/// Lexically recognized response types. `Token` (the implicit flow) is
/// recognized so it can be rejected as unsupported rather than invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseType {
    Code,
    Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChallengeMethod {
    S256,
    Plain,
}

/// The validated change set the authorize step executes.
#[derive(Debug, Clone)]
pub struct AuthorizeChangeSet {
    pub client_id: Uuid,
    pub redirect_uri: String,
    pub redirect_uri_specified: bool,
    pub scope: ScopeSet,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
}

/// Outcome of authorize-request validation. Exhaustive, so the endpoint
/// cannot forget a response class.
#[derive(Debug, Clone)]
pub enum AuthorizeOutcome {
    Authorize(AuthorizeChangeSet),
    /// 400 JSON `{"errors": …}`: the redirect target is untrusted or
    /// the consent UI itself is broken.
    NoRedirect(ErrorMap),
    /// Redirect to the validated target with an OAuth error.
    Redirect {
        redirect_uri: String,
        error: OAuthErrorCode,
        errors: ErrorMap,
        state: Option<String>,
    },
}

/// Run the full pipeline.
///
/// `client` is the lookup result for the request's `client_id` (when it
/// parsed); `prior_authorization` the existing consent row for this
/// client/user pair, if any.
pub fn validate_authorize(
    params: &AuthorizeParams,
    client: Option<&Client>,
    prior_authorization: Option<&Authorization>,
    options: &ProviderOptions,
) -> AuthorizeOutcome {
    let (client, redirect_uri, redirect_uri_specified) =
        match no_redirect_checks(params, client) {
            Ok(resolved) => resolved,
            Err(errors) => return AuthorizeOutcome::NoRedirect(errors),
        };

    let (response_type, method) = match redirect_base_checks(params) {
        Ok(parsed) => parsed,
        Err(errors) => {
            return AuthorizeOutcome::Redirect {
                redirect_uri,
                error: OAuthErrorCode::InvalidRequest,
                errors,
                state: params.state.clone(),
            }
        }
    };

    other_checks(
        params,
        client,
        prior_authorization,
        response_type,
        method,
        redirect_uri,
        redirect_uri_specified,
        options,
    )
}

/// Stage 1: anything wrong here must not redirect.
fn no_redirect_checks<'c>(
    params: &AuthorizeParams,
    client: Option<&'c Client>,
) -> Result<(&'c Client, String, bool), ErrorMap> {
    let mut errors = ErrorMap::new();

    let client = match params.client_id.as_deref() {
        None => {
            errors.add("client_id", "can't be blank");
            None
        }
        Some(raw) => match Uuid::parse_str(raw) {
            Err(_) => {
                errors.add("client_id", "is invalid");
                None
            }
            Ok(_) => match client {
                None => {
                    errors.add("client_id", "does not exist");
                    None
                }
                Some(client) => Some(client),
            },
        },
    };

    // The redirect target can only be judged against a resolved client.
    let resolved = client.and_then(|client| match params.redirect_uri.as_deref() {
        Some(uri) => {
            if client.redirect_uris.iter().any(|u| u == uri) {
                Some((uri.to_string(), true))
            } else {
                errors.add("redirect_uri", "invalid entry");
                None
            }
        }
        None => {
            if client.redirect_uris.len() == 1 {
                Some((client.redirect_uris[0].clone(), false))
            } else {
                errors.add("redirect_uri", "can't be blank");
                None
            }
        }
    });

    match (client, resolved) {
        (Some(client), Some((uri, specified))) if errors.is_empty() => {
            Ok((client, uri, specified))
        }
        _ => Err(errors),
    }
}

/// Stage 2: the redirect target is trusted; reject parameter values
/// that are not even lexically recognizable.
fn redirect_base_checks(
    params: &AuthorizeParams,
) -> Result<(ResponseType, Option<ChallengeMethod>), ErrorMap> {
    let mut errors = ErrorMap::new();

    let response_type = match params.response_type.as_deref() {
        None => {
            errors.add("response_type", "can't be blank");
            None
        }
        Some("code") => Some(ResponseType::Code),
        Some("token") => Some(ResponseType::Token),
        Some(_) => {
            errors.add("response_type", "is invalid");
            None
        }
    };

    let method = match params.code_challenge_method.as_deref() {
        None => None,
        Some("S256") => Some(ChallengeMethod::S256),
        Some("plain") => Some(ChallengeMethod::Plain),
        Some(_) => {
            errors.add("code_challenge_method", "is invalid");
            None
        }
    };

    match response_type {
        Some(response_type) if errors.is_empty() => Ok((response_type, method)),
        _ => Err(errors),
    }
}

/// Accumulates stage-3 errors while tracking the most specific OAuth
/// code any check contributed.
struct Flagged {
    errors: ErrorMap,
    code: OAuthErrorCode,
}

impl Flagged {
    fn new() -> Self {
        Self {
            errors: ErrorMap::new(),
            code: OAuthErrorCode::InvalidRequest,
        }
    }

    fn flag(&mut self, field: &str, message: impl Into<String>, code: OAuthErrorCode) {
        self.errors.add(field, message);
        if code.specificity() > self.code.specificity() {
            self.code = code;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn other_checks(
    params: &AuthorizeParams,
    client: &Client,
    prior_authorization: Option<&Authorization>,
    response_type: ResponseType,
    method: Option<ChallengeMethod>,
    redirect_uri: String,
    redirect_uri_specified: bool,
    options: &ProviderOptions,
) -> AuthorizeOutcome {
    // A missing or non-boolean permission flag is a consent-UI bug, not
    // a protocol answer: 400 JSON, no redirect.
    let permission_granted = match params.permission_granted.as_deref() {
        Some("true") => true,
        Some("false") => false,
        Some(_) => {
            let mut errors = ErrorMap::new();
            errors.add("permission_granted", "is invalid");
            return AuthorizeOutcome::NoRedirect(errors);
        }
        None => {
            let mut errors = ErrorMap::new();
            errors.add("permission_granted", "can't be blank");
            return AuthorizeOutcome::NoRedirect(errors);
        }
    };

    let mut flagged = Flagged::new();

    if !permission_granted {
        flagged.flag(
            "permission_granted",
            "the resource owner denied the request",
            OAuthErrorCode::AccessDenied,
        );
    }

    match response_type {
        ResponseType::Token => flagged.flag(
            "response_type",
            "the server does not support this response type",
            OAuthErrorCode::UnsupportedResponseType,
        ),
        ResponseType::Code => {
            if !client.supports_grant_type(GrantType::AuthorizationCode) {
                flagged.flag(
                    "response_type",
                    "is not supported by the client",
                    OAuthErrorCode::UnauthorizedClient,
                );
            }
        }
    }

    let scope = resolve_scope(params, client, prior_authorization, options, &mut flagged);

    let code_challenge = check_pkce(params, client, method, options, &mut flagged);

    if !flagged.errors.is_empty() {
        return AuthorizeOutcome::Redirect {
            redirect_uri,
            error: flagged.code,
            errors: flagged.errors,
            state: params.state.clone(),
        };
    }

    AuthorizeOutcome::Authorize(AuthorizeChangeSet {
        client_id: client.id,
        redirect_uri,
        redirect_uri_specified,
        scope,
        state: params.state.clone(),
        code_challenge,
    })
}

/// Requested scope must sit inside the application scopes and the
/// client's scope; when omitted, the prior authorization's scope is
/// reused, and with no prior authorization a scope is required.
fn resolve_scope(
    params: &AuthorizeParams,
    client: &Client,
    prior_authorization: Option<&Authorization>,
    options: &ProviderOptions,
    flagged: &mut Flagged,
) -> ScopeSet {
    match params.scope.as_deref() {
        Some(raw) => {
            let requested = ScopeSet::parse(raw);
            if requested.is_empty() {
                flagged.flag("scope", "can't be blank", OAuthErrorCode::InvalidRequest);
                return requested;
            }
            let app_scopes: ScopeSet = options.scopes.iter().map(String::as_str).collect();
            if !requested.is_subset(&app_scopes) {
                flagged.flag(
                    "scope",
                    "contains unknown values",
                    OAuthErrorCode::InvalidScope,
                );
            } else if !requested.is_subset(&client.scope) {
                flagged.flag(
                    "scope",
                    "exceeds the scope of the client",
                    OAuthErrorCode::AccessDenied,
                );
            }
            requested
        }
        None => match prior_authorization {
            Some(authorization) => authorization.scope.clone(),
            None => {
                flagged.flag("scope", "can't be blank", OAuthErrorCode::InvalidRequest);
                ScopeSet::new()
            }
        },
    }
}

fn check_pkce(
    params: &AuthorizeParams,
    client: &Client,
    method: Option<ChallengeMethod>,
    options: &ProviderOptions,
    flagged: &mut Flagged,
) -> Option<String> {
    let required = match options.enforce_pkce {
        EnforcePkce::All => true,
        EnforcePkce::Public => client.client_type == ClientType::Public,
        EnforcePkce::No => false,
    };

    let blank_challenge_message = if required {
        "can't be blank (PKCE is required)"
    } else {
        "can't be blank"
    };

    match (params.code_challenge.as_deref(), method) {
        (None, None) => {
            if required {
                flagged.flag(
                    "code_challenge",
                    blank_challenge_message,
                    OAuthErrorCode::InvalidRequest,
                );
                flagged.flag(
                    "code_challenge_method",
                    "can't be blank",
                    OAuthErrorCode::InvalidRequest,
                );
            }
            None
        }
        (Some(challenge), Some(ChallengeMethod::S256)) => {
            if pkce::valid_challenge_format(challenge) {
                Some(challenge.to_string())
            } else {
                flagged.flag("code_challenge", "is invalid", OAuthErrorCode::InvalidRequest);
                None
            }
        }
        (Some(_), Some(ChallengeMethod::Plain)) => {
            flagged.flag(
                "code_challenge_method",
                "must be S256",
                OAuthErrorCode::InvalidRequest,
            );
            None
        }
        (Some(_), None) => {
            flagged.flag(
                "code_challenge_method",
                "can't be blank",
                OAuthErrorCode::InvalidRequest,
            );
            None
        }
        (None, Some(_)) => {
            flagged.flag(
                "code_challenge",
                blank_challenge_message,
                OAuthErrorCode::InvalidRequest,
            );
            None
        }
    }
}
