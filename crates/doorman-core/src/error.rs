//! Error taxonomy.
//!
//! Protocol errors (the OAuth error codes a client sees) are kept apart
//! from operational errors (storage, crypto, configuration). Validators
//! aggregate per-field messages into an [`ErrorMap`] rather than failing
//! on the first problem, so one response can report everything wrong
//! with a request.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// OAuth 2.1 protocol error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    AccessDenied,
}

impl OAuthErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
        }
    }

    /// Specificity rank used when one aggregated response must pick a
    /// single code: anything beats `invalid_request`.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::InvalidRequest => 0,
            Self::InvalidScope => 1,
            Self::AccessDenied => 2,
            Self::InvalidGrant | Self::InvalidClient => 3,
            Self::UnauthorizedClient => 4,
            Self::UnsupportedGrantType | Self::UnsupportedResponseType => 5,
        }
    }
}

impl fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-field validation messages, aggregated across all checks.
///
/// Fields are kept in a `BTreeMap` so rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, Vec<String>>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field. Duplicate messages are kept;
    /// the consent UI may show them per check.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn merge(&mut self, other: ErrorMap) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Render `"field: msg1, msg2, other_field: msg"` for
    /// `error_description` values.
    pub fn description(&self) -> String {
        self.0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Storage-layer failures the endpoints know how to translate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database unique index rejected the write.
    #[error("unique constraint violated on {0}")]
    UniqueViolation(&'static str),

    /// A referenced row does not exist.
    #[error("{0} does not exist")]
    ForeignKeyViolation(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Operational (non-protocol) error: configuration problems, crypto
/// failures, storage and minter faults. Surfaced to clients as a bare
/// 500; details go to the logger only.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session error: {0}")]
    Session(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(OAuthErrorCode::InvalidRequest.code(), "invalid_request");
        assert_eq!(OAuthErrorCode::AccessDenied.code(), "access_denied");
        assert_eq!(
            OAuthErrorCode::UnsupportedGrantType.code(),
            "unsupported_grant_type"
        );
    }

    #[test]
    fn test_specificity_prefers_specific_codes() {
        assert!(
            OAuthErrorCode::UnsupportedResponseType.specificity()
                > OAuthErrorCode::InvalidRequest.specificity()
        );
        assert!(
            OAuthErrorCode::AccessDenied.specificity()
                > OAuthErrorCode::InvalidScope.specificity()
        );
    }

    #[test]
    fn test_error_map_accumulates() {
        let mut errors = ErrorMap::new();
        errors.add("scope", "can't be blank");
        errors.add("scope", "is invalid");
        errors.add("client_id", "does not exist");
        assert_eq!(errors.messages("scope").len(), 2);
        assert!(errors.contains_field("client_id"));
    }

    #[test]
    fn test_description_is_deterministic() {
        let mut errors = ErrorMap::new();
        errors.add("code_challenge_method", "can't be blank");
        errors.add("code_challenge", "can't be blank (PKCE is required)");
        assert_eq!(
            errors.description(),
            "code_challenge: can't be blank (PKCE is required), code_challenge_method: can't be blank"
        );
    }

    #[test]
    fn test_description_joins_messages_per_field() {
        let mut errors = ErrorMap::new();
        errors.add("redirect_uri", "can't be blank");
        errors.add("redirect_uri", "invalid entry");
        assert_eq!(
            errors.description(),
            "redirect_uri: can't be blank, invalid entry"
        );
    }

    #[test]
    fn test_error_map_serializes_as_object() {
        let mut errors = ErrorMap::new();
        errors.add("redirect_uri", "invalid entry");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["redirect_uri"][0], "invalid entry");
    }
}
