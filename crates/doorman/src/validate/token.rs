//! Token-request validation.
//!
//! Simpler than the authorize side: cast, recognize the grant type,
//! authenticate the client (done by the endpoint, since it needs the
//! store and the key set), then run the grant-type-specific checks
//! here. Token errors carry one OAuth code plus field-tagged messages
//! for the `error_description`.

use chrono::{DateTime, Utc};

use doorman_core::error::{ErrorMap, OAuthErrorCode};
use doorman_core::model::{Authorization, Client, GrantType, GrantWithAuthorization};
use doorman_core::scope::ScopeSet;
use doorman_core::session::RefreshClaims;

use crate::crypto::pkce;

/// Token-request parameters as cast from the form body.
#[derive(Debug, Clone, Default)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub code_verifier: Option<String>,
    pub scope: Option<String>,
}

/// Grant types the token endpoint implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrantType {
    AuthorizationCode,
    RefreshToken,
}

/// A token-endpoint protocol error: one OAuth code, field-tagged
/// messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenError {
    pub error: OAuthErrorCode,
    pub errors: ErrorMap,
}

impl TokenError {
    pub fn new(error: OAuthErrorCode, field: &str, message: impl Into<String>) -> Self {
        let mut errors = ErrorMap::new();
        errors.add(field, message);
        Self { error, errors }
    }

    pub fn description(&self) -> String {
        self.errors.description()
    }
}

/// Rule 1: `grant_type` present and recognized.
pub fn recognize_grant_type(params: &TokenParams) -> Result<TokenGrantType, TokenError> {
    match params.grant_type.as_deref() {
        None => Err(TokenError::new(
            OAuthErrorCode::InvalidRequest,
            "grant_type",
            "can't be blank",
        )),
        Some("authorization_code") => Ok(TokenGrantType::AuthorizationCode),
        Some("refresh_token") => Ok(TokenGrantType::RefreshToken),
        Some(_) => Err(TokenError::new(
            OAuthErrorCode::UnsupportedGrantType,
            "grant_type",
            "server supports authorization_code and refresh_token",
        )),
    }
}

/// Cross-check an authorization-code exchange against the stored grant.
///
/// `code_challenge` is the decrypted stored challenge. Returns the
/// scope the tokens will carry.
pub fn validate_code_exchange(
    params: &TokenParams,
    found: &GrantWithAuthorization,
    client: &Client,
    code_challenge: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ScopeSet, TokenError> {
    let grant = &found.grant;
    let authorization = &found.authorization;

    if grant.expired_at(now) {
        return Err(TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "code",
            "is expired",
        ));
    }

    if authorization.client_id != client.id {
        return Err(TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "code",
            "was issued to another client",
        ));
    }

    if !client.supports_grant_type(GrantType::AuthorizationCode) {
        return Err(TokenError::new(
            OAuthErrorCode::UnauthorizedClient,
            "grant_type",
            "is not supported by the client",
        ));
    }

    check_redirect_uri(params, grant.redirect_uri_specified, &grant.redirect_uri)?;
    check_code_verifier(params, code_challenge)?;
    narrow_scope(params.scope.as_deref(), &authorization.scope)
}

/// Cross-check a refresh-token exchange against the verified claims.
pub fn validate_refresh(
    params: &TokenParams,
    claims: &RefreshClaims,
    client: &Client,
    authorization: Option<&Authorization>,
) -> Result<ScopeSet, TokenError> {
    if claims.cid != client.id.to_string() {
        return Err(TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "client_id",
            "does not match refresh token",
        ));
    }

    // The user revokes a client by deleting the authorization; refresh
    // tokens die with it.
    let authorization = authorization.ok_or_else(|| {
        TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "refresh_token",
            "has been revoked",
        )
    })?;

    if !client.supports_grant_type(GrantType::RefreshToken) {
        return Err(TokenError::new(
            OAuthErrorCode::UnauthorizedClient,
            "grant_type",
            "is not supported by the client",
        ));
    }

    narrow_scope(params.scope.as_deref(), &authorization.scope)
}

/// The token exchange must repeat the redirect URI exactly when the
/// authorize call spelled it out.
fn check_redirect_uri(
    params: &TokenParams,
    specified: bool,
    granted_uri: &str,
) -> Result<(), TokenError> {
    match params.redirect_uri.as_deref() {
        None if specified => Err(TokenError::new(
            OAuthErrorCode::InvalidRequest,
            "redirect_uri",
            "can't be blank",
        )),
        None => Ok(()),
        Some(uri) if uri == granted_uri => Ok(()),
        Some(_) => Err(TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "redirect_uri",
            "does not match the authorization request",
        )),
    }
}

fn check_code_verifier(
    params: &TokenParams,
    code_challenge: Option<&str>,
) -> Result<(), TokenError> {
    match (code_challenge, params.code_verifier.as_deref()) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(TokenError::new(
            OAuthErrorCode::InvalidGrant,
            "code_verifier",
            "no challenge was issued",
        )),
        (Some(_), None) => Err(TokenError::new(
            OAuthErrorCode::InvalidRequest,
            "code_verifier",
            "can't be blank",
        )),
        (Some(challenge), Some(verifier)) => {
            if pkce::verify(verifier, challenge) {
                Ok(())
            } else {
                Err(TokenError::new(
                    OAuthErrorCode::InvalidGrant,
                    "code_verifier",
                    "is invalid",
                ))
            }
        }
    }
}

/// Optional `scope` may narrow the granted scope within the
/// authorization's current scope.
fn narrow_scope(
    requested: Option<&str>,
    authorized: &ScopeSet,
) -> Result<ScopeSet, TokenError> {
    match requested {
        None => Ok(authorized.clone()),
        Some(raw) => {
            let requested = ScopeSet::parse(raw);
            if requested.is_empty() {
                return Err(TokenError::new(
                    OAuthErrorCode::InvalidRequest,
                    "scope",
                    "can't be blank",
                ));
            }
            if requested.is_subset(authorized) {
                Ok(requested)
            } else {
                Err(TokenError::new(
                    OAuthErrorCode::InvalidScope,
                    "scope",
                    "exceeds the authorized scope",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use doorman_core::model::{ClientType, Grant, GrantKind};
    use serde_json::Map;
    use uuid::Uuid;

    fn client() -> Client {
        Client {
            id: Uuid::new_v4(),
            name: "Test App".into(),
            description: "".into(),
            encrypted_secret: "".into(),
            redirect_uris: vec!["https://app.example.com/cb".into()],
            scope: ScopeSet::parse("read write"),
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            client_type: ClientType::Confidential,
            owner_id: "owner".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn found_for(client: &Client) -> GrantWithAuthorization {
        let authorization = Authorization {
            id: Uuid::new_v4(),
            client_id: client.id,
            resource_owner_id: "42".into(),
            scope: ScopeSet::parse("read write"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let grant = Grant {
            id: Uuid::new_v4(),
            authorization_id: authorization.id,
            resource_owner_id: "42".into(),
            kind: GrantKind::AuthorizationCode,
            redirect_uri: "https://app.example.com/cb".into(),
            redirect_uri_specified: true,
            encrypted_code_challenge: None,
            code_digest: "digest".into(),
            expires_at: Utc::now() + Duration::seconds(600),
            created_at: Utc::now(),
        };
        GrantWithAuthorization {
            grant,
            authorization,
        }
    }

    fn params() -> TokenParams {
        TokenParams {
            grant_type: Some("authorization_code".into()),
            code: Some("the-code".into()),
            redirect_uri: Some("https://app.example.com/cb".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_recognize_grant_type() {
        assert_eq!(
            recognize_grant_type(&params()).unwrap(),
            TokenGrantType::AuthorizationCode
        );

        let mut p = params();
        p.grant_type = Some("refresh_token".into());
        assert_eq!(
            recognize_grant_type(&p).unwrap(),
            TokenGrantType::RefreshToken
        );

        p.grant_type = None;
        let err = recognize_grant_type(&p).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidRequest);
        assert_eq!(err.description(), "grant_type: can't be blank");

        p.grant_type = Some("password".into());
        let err = recognize_grant_type(&p).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::UnsupportedGrantType);
        assert_eq!(
            err.description(),
            "grant_type: server supports authorization_code and refresh_token"
        );
    }

    #[test]
    fn test_code_exchange_happy_path() {
        let client = client();
        let found = found_for(&client);
        let scope =
            validate_code_exchange(&params(), &found, &client, None, Utc::now()).unwrap();
        assert_eq!(scope.join(), "read write");
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let client = client();
        let found = found_for(&client);
        let at_boundary = found.grant.expires_at;

        let err =
            validate_code_exchange(&params(), &found, &client, None, at_boundary).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "code: is expired");

        // One second before the boundary still succeeds.
        let just_before = at_boundary - Duration::seconds(1);
        assert!(validate_code_exchange(&params(), &found, &client, None, just_before).is_ok());
    }

    #[test]
    fn test_code_issued_to_another_client() {
        let client = client();
        let other = self::client();
        let found = found_for(&other);
        let err =
            validate_code_exchange(&params(), &found, &client, None, Utc::now()).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "code: was issued to another client");
    }

    #[test]
    fn test_redirect_uri_must_be_repeated_when_specified() {
        let client = client();
        let found = found_for(&client);
        let mut p = params();
        p.redirect_uri = None;
        let err = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidRequest);
        assert_eq!(err.description(), "redirect_uri: can't be blank");
    }

    #[test]
    fn test_redirect_uri_mismatch() {
        let client = client();
        let found = found_for(&client);
        let mut p = params();
        p.redirect_uri = Some("https://app.example.com/other".into());
        let err = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
    }

    #[test]
    fn test_redirect_uri_optional_when_resolved() {
        let client = client();
        let mut found = found_for(&client);
        found.grant.redirect_uri_specified = false;
        let mut p = params();
        p.redirect_uri = None;
        assert!(validate_code_exchange(&p, &found, &client, None, Utc::now()).is_ok());
    }

    #[test]
    fn test_pkce_verifier_checked_against_challenge() {
        let client = client();
        let found = found_for(&client);
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = pkce::code_challenge(verifier);

        let mut p = params();
        p.code_verifier = Some(verifier.into());
        assert!(
            validate_code_exchange(&p, &found, &client, Some(&challenge), Utc::now()).is_ok()
        );

        p.code_verifier = Some("wrong-verifier-wrong-verifier-wrong-verifie".into());
        let err = validate_code_exchange(&p, &found, &client, Some(&challenge), Utc::now())
            .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "code_verifier: is invalid");
    }

    #[test]
    fn test_pkce_verifier_required_when_challenge_stored() {
        let client = client();
        let found = found_for(&client);
        let err = validate_code_exchange(&params(), &found, &client, Some("challenge"), Utc::now())
            .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidRequest);
        assert_eq!(err.description(), "code_verifier: can't be blank");
    }

    #[test]
    fn test_verifier_without_challenge_is_an_error() {
        let client = client();
        let found = found_for(&client);
        let mut p = params();
        p.code_verifier = Some("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".into());
        let err = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "code_verifier: no challenge was issued");
    }

    #[test]
    fn test_scope_narrowing() {
        let client = client();
        let found = found_for(&client);

        let mut p = params();
        p.scope = Some("read".into());
        let scope = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap();
        assert_eq!(scope.join(), "read");

        p.scope = Some("read write".into());
        let scope = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap();
        assert_eq!(scope.join(), "read write");

        p.scope = Some("read write admin".into());
        let err = validate_code_exchange(&p, &found, &client, None, Utc::now()).unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidScope);
        assert_eq!(err.description(), "scope: exceeds the authorized scope");
    }

    fn refresh_claims(client: &Client) -> RefreshClaims {
        RefreshClaims {
            sub: "42".into(),
            cid: client.id.to_string(),
            session_id: "sess".into(),
            token_index: 1,
            extra: Map::new(),
        }
    }

    fn refresh_params() -> TokenParams {
        TokenParams {
            grant_type: Some("refresh_token".into()),
            refresh_token: Some("the-token".into()),
            ..Default::default()
        }
    }

    fn refresh_authorization(client: &Client) -> Authorization {
        Authorization {
            id: Uuid::new_v4(),
            client_id: client.id,
            resource_owner_id: "42".into(),
            scope: ScopeSet::parse("read"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_refresh_happy_path() {
        let client = client();
        let auth = refresh_authorization(&client);
        let scope = validate_refresh(
            &refresh_params(),
            &refresh_claims(&client),
            &client,
            Some(&auth),
        )
        .unwrap();
        assert_eq!(scope.join(), "read");
    }

    #[test]
    fn test_refresh_with_foreign_client() {
        let client = client();
        let other = self::client();
        let auth = refresh_authorization(&other);
        let err = validate_refresh(
            &refresh_params(),
            &refresh_claims(&client),
            &other,
            Some(&auth),
        )
        .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "client_id: does not match refresh token");
    }

    #[test]
    fn test_refresh_after_authorization_deleted() {
        let client = client();
        let err =
            validate_refresh(&refresh_params(), &refresh_claims(&client), &client, None)
                .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidGrant);
        assert_eq!(err.description(), "refresh_token: has been revoked");
    }

    #[test]
    fn test_refresh_scope_narrowing() {
        let client = client();
        let auth = refresh_authorization(&client);
        let mut p = refresh_params();
        p.scope = Some("read write".into());
        let err = validate_refresh(&p, &refresh_claims(&client), &client, Some(&auth))
            .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::InvalidScope);
    }

    #[test]
    fn test_refresh_client_without_grant_type() {
        let mut client = client();
        client.grant_types = vec![GrantType::AuthorizationCode];
        let auth = refresh_authorization(&client);
        let err = validate_refresh(
            &refresh_params(),
            &refresh_claims(&client),
            &client,
            Some(&auth),
        )
        .unwrap_err();
        assert_eq!(err.error, OAuthErrorCode::UnauthorizedClient);
    }
}
