//! Framework-agnostic HTTP layer.
//!
//! Integrations convert their request type into a [`GenericRequest`],
//! call [`route_request`], and convert the [`GenericResponse`] back.
//! The surface is deliberately small: `POST /authorize`,
//! `POST /token`, the CORS preflight, and 404 for everything else.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;

use doorman_core::model::Principal;

use crate::context::ProviderContext;
use crate::endpoints::authorize::{handle_authorize, AuthorizeReply};
use crate::endpoints::token::{handle_token, ClientCredentials, TokenReply};
use crate::validate::authorize::AuthorizeParams;
use crate::validate::token::TokenParams;

/// Token-request bodies are bounded.
const MAX_TOKEN_BODY_BYTES: usize = 1 << 20;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

// ─── Generic request / response ─────────────────────────────────

/// A framework-agnostic HTTP request.
#[derive(Debug, Clone)]
pub struct GenericRequest {
    /// HTTP method (GET, POST, …).
    pub method: String,
    /// Request path, already stripped of any mount prefix.
    pub path: String,
    /// Headers with lowercased names.
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl GenericRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// A framework-agnostic HTTP response.
#[derive(Debug, Clone)]
pub struct GenericResponse {
    pub status: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl GenericResponse {
    pub fn json<T: serde::Serialize>(status: u16, data: &T) -> Self {
        let body = serde_json::to_vec(data).unwrap_or_default();
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["application/json".to_string()],
        );
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            "content-type".to_string(),
            vec!["text/plain; charset=utf-8".to_string()],
        );
        Self {
            status,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// Token and authorize responses must never be cached.
    fn no_store(self) -> Self {
        self.with_header("cache-control", "no-store")
            .with_header("pragma", "no-cache")
    }

    fn cors_origin(self) -> Self {
        self.with_header("access-control-allow-origin", "*")
    }
}

// ─── Routing ────────────────────────────────────────────────────

/// Dispatch a request to the protocol endpoints.
///
/// `principal` is the already-authenticated user, extracted by the host
/// from its own session machinery; only the authorize endpoint needs
/// it.
pub async fn route_request(
    ctx: &ProviderContext,
    principal: Option<&Principal>,
    request: &GenericRequest,
) -> GenericResponse {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/authorize") => authorize_route(ctx, principal, request).await,
        ("POST", "/token") => token_route(ctx, request).await,
        ("OPTIONS", "/") | ("OPTIONS", "/token") => preflight(ctx),
        _ => GenericResponse::empty(404),
    }
}

fn preflight(ctx: &ProviderContext) -> GenericResponse {
    let mut allowed = vec!["authorization".to_string(), "content-type".to_string()];
    allowed.extend(
        ctx.options
            .token_endpoint_additional_allowed_headers
            .iter()
            .map(|h| h.to_lowercase()),
    );

    GenericResponse::empty(204)
        .cors_origin()
        .with_header("access-control-allow-methods", "POST")
        .with_header("access-control-allow-headers", &allowed.join(","))
}

async fn authorize_route(
    ctx: &ProviderContext,
    principal: Option<&Principal>,
    request: &GenericRequest,
) -> GenericResponse {
    let Some(principal) = principal else {
        return GenericResponse::json(401, &json!({"errors": {"base": ["authentication required"]}}))
            .no_store();
    };

    let fields = match parse_authorize_body(request) {
        Ok(fields) => fields,
        Err(()) => {
            return GenericResponse::json(
                400,
                &json!({"errors": {"base": ["could not parse body"]}}),
            )
            .no_store()
        }
    };

    let params = authorize_params_from(&fields);
    match handle_authorize(ctx, principal, params).await {
        AuthorizeReply::RedirectTo(uri) => {
            GenericResponse::json(200, &json!({"redirect_to": uri})).no_store()
        }
        AuthorizeReply::Invalid(errors) => {
            GenericResponse::json(400, &json!({"errors": errors})).no_store()
        }
        AuthorizeReply::ServerError => GenericResponse::empty(500).no_store(),
    }
}

async fn token_route(ctx: &ProviderContext, request: &GenericRequest) -> GenericResponse {
    match request.header("content-type") {
        Some(content_type) if content_type.starts_with(FORM_CONTENT_TYPE) => {}
        _ => {
            return GenericResponse::json(
                415,
                &json!({
                    "error": "invalid_request",
                    "error_description": "content type must be application/x-www-form-urlencoded",
                }),
            )
            .no_store()
            .cors_origin()
        }
    }

    let body = request.body.as_deref().unwrap_or_default();
    if body.len() > MAX_TOKEN_BODY_BYTES {
        return GenericResponse::empty(413).no_store().cors_origin();
    }

    let fields = match parse_form(body) {
        Ok(fields) => fields,
        Err(()) => {
            return GenericResponse::json(
                400,
                &json!({
                    "error": "invalid_request",
                    "error_description": "request body is not a valid form",
                }),
            )
            .no_store()
            .cors_origin()
        }
    };

    let params = token_params_from(&fields);
    let credentials = match basic_credentials(request) {
        Some(credentials) => credentials,
        None => ClientCredentials::from_body(&params),
    };

    match handle_token(ctx, credentials, params).await {
        TokenReply::Success(body) => GenericResponse::json(200, &body).no_store().cors_origin(),
        TokenReply::Error { error, description } => GenericResponse::json(
            400,
            &json!({"error": error.code(), "error_description": description}),
        )
        .no_store()
        .cors_origin(),
        TokenReply::BasicAuthFailed => GenericResponse::text(401, "Unauthorized")
            .with_header("www-authenticate", "Basic")
            .no_store()
            .cors_origin(),
        TokenReply::ServerError => GenericResponse::empty(500).no_store().cors_origin(),
    }
}

// ─── Body parsing ───────────────────────────────────────────────

/// The authorize endpoint accepts form-encoded or JSON bodies.
fn parse_authorize_body(request: &GenericRequest) -> Result<HashMap<String, String>, ()> {
    let body = request.body.as_deref().unwrap_or_default();

    if request
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("application/json"))
    {
        let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| ())?;
        let object = value.as_object().ok_or(())?;
        let mut fields = HashMap::new();
        for (key, value) in object {
            if let Some(scalar) = scalar_to_string(value) {
                fields.insert(key.clone(), scalar);
            }
        }
        Ok(fields)
    } else {
        parse_form(body)
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an `application/x-www-form-urlencoded` body with validated
/// UTF-8.
fn parse_form(body: &[u8]) -> Result<HashMap<String, String>, ()> {
    let text = std::str::from_utf8(body).map_err(|_| ())?;
    let mut fields = HashMap::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        fields.insert(decode_component(key)?, decode_component(value)?);
    }
    Ok(fields)
}

fn decode_component(raw: &str) -> Result<String, ()> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ())
}

fn non_empty(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).filter(|v| !v.is_empty()).cloned()
}

fn authorize_params_from(fields: &HashMap<String, String>) -> AuthorizeParams {
    AuthorizeParams {
        client_id: non_empty(fields, "client_id"),
        redirect_uri: non_empty(fields, "redirect_uri"),
        response_type: non_empty(fields, "response_type"),
        scope: non_empty(fields, "scope"),
        state: non_empty(fields, "state"),
        code_challenge: non_empty(fields, "code_challenge"),
        code_challenge_method: non_empty(fields, "code_challenge_method"),
        permission_granted: non_empty(fields, "permission_granted"),
    }
}

fn token_params_from(fields: &HashMap<String, String>) -> TokenParams {
    TokenParams {
        grant_type: non_empty(fields, "grant_type"),
        code: non_empty(fields, "code"),
        redirect_uri: non_empty(fields, "redirect_uri"),
        client_id: non_empty(fields, "client_id"),
        client_secret: non_empty(fields, "client_secret"),
        refresh_token: non_empty(fields, "refresh_token"),
        code_verifier: non_empty(fields, "code_verifier"),
        scope: non_empty(fields, "scope"),
    }
}

/// Extract Basic credentials. Only the `Basic` scheme counts; a header
/// with another scheme falls through to body credentials. A malformed
/// Basic header still claims the Basic path, so its failure answers
/// 401.
fn basic_credentials(request: &GenericRequest) -> Option<ClientCredentials> {
    let header = request.header("authorization")?;
    let (scheme, rest) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let parsed = STANDARD
        .decode(rest.trim())
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|decoded| {
            decoded.split_once(':').map(|(id, secret)| {
                (
                    decode_component(id).unwrap_or_default(),
                    decode_component(secret).unwrap_or_default(),
                )
            })
        });

    Some(match parsed {
        Some((id, secret)) => ClientCredentials {
            client_id: Some(id).filter(|v| !v.is_empty()),
            client_secret: Some(secret).filter(|v| !v.is_empty()),
            from_basic_header: true,
        },
        None => ClientCredentials {
            client_id: None,
            client_secret: None,
            from_basic_header: true,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, path: &str) -> GenericRequest {
        GenericRequest {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_parse_form() {
        let fields = parse_form(b"grant_type=authorization_code&code=abc%2Bdef&x=1+2").unwrap();
        assert_eq!(fields["grant_type"], "authorization_code");
        assert_eq!(fields["code"], "abc+def");
        assert_eq!(fields["x"], "1 2");
    }

    #[test]
    fn test_parse_form_rejects_invalid_utf8() {
        assert!(parse_form(&[0x67, 0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_empty_values_are_treated_as_absent() {
        let fields = parse_form(b"scope=&code=abc").unwrap();
        let params = token_params_from(&fields);
        assert_eq!(params.scope, None);
        assert_eq!(params.code.as_deref(), Some("abc"));
    }

    #[test]
    fn test_basic_credentials() {
        let mut req = request("POST", "/token");
        // client:secret
        req.headers
            .insert("authorization".into(), "Basic Y2xpZW50OnNlY3JldA==".into());
        let creds = basic_credentials(&req).unwrap();
        assert!(creds.from_basic_header);
        assert_eq!(creds.client_id.as_deref(), Some("client"));
        assert_eq!(creds.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_malformed_basic_header_still_claims_basic() {
        let mut req = request("POST", "/token");
        req.headers
            .insert("authorization".into(), "Basic !!not-base64!!".into());
        let creds = basic_credentials(&req).unwrap();
        assert!(creds.from_basic_header);
        assert_eq!(creds.client_id, None);
    }

    #[test]
    fn test_bearer_header_is_not_basic() {
        let mut req = request("POST", "/token");
        req.headers
            .insert("authorization".into(), "Bearer some-token".into());
        assert!(basic_credentials(&req).is_none());
    }

    #[test]
    fn test_json_scalars_cast_to_strings() {
        let body = serde_json::to_vec(&json!({
            "client_id": "abc",
            "permission_granted": true,
            "state": 7,
        }))
        .unwrap();
        let mut req = request("POST", "/authorize");
        req.headers
            .insert("content-type".into(), "application/json".into());
        req.body = Some(body);

        let fields = parse_authorize_body(&req).unwrap();
        let params = authorize_params_from(&fields);
        assert_eq!(params.permission_granted.as_deref(), Some("true"));
        assert_eq!(params.state.as_deref(), Some("7"));
    }
}
