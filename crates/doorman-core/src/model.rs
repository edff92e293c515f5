//! Persistent data model: clients, authorizations, grants.
//!
//! Ownership forms a tree: a client owns its authorizations, an
//! authorization owns its grants, and the resource owner owns both. The
//! store cascades deletes along those edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scope::ScopeSet;

/// Whether a client can keep a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Confidential,
    Public,
}

/// Grant types a client may be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
        }
    }
}

/// A registered third-party application.
///
/// Created and managed by application CRUD outside this core; the core
/// only reads clients and narrows their scope (with the cascading
/// authorization intersection) through [`crate::store::Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// The client secret, encrypted at rest. Regenerated on every write
    /// by the owning CRUD layer.
    pub encrypted_secret: String,
    /// Absolute HTTPS URIs without fragments; non-empty.
    pub redirect_uris: Vec<String>,
    /// Non-empty; always a subset of the configured application scopes.
    pub scope: ScopeSet,
    /// Non-empty.
    pub grant_types: Vec<GrantType>,
    pub client_type: ClientType,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn supports_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }
}

/// A user's standing consent for a client.
///
/// At most one row exists per `(client_id, resource_owner_id)`; its
/// scope never exceeds the client's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub id: Uuid,
    pub client_id: Uuid,
    pub resource_owner_id: String,
    pub scope: ScopeSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kinds of grant this core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    AuthorizationCode,
}

/// A short-lived single-use code bound to an authorization.
///
/// The code itself is never stored: `code_digest` holds its keyed HMAC,
/// and the PKCE challenge (when present) is encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub id: Uuid,
    pub authorization_id: Uuid,
    pub resource_owner_id: String,
    pub kind: GrantKind,
    pub redirect_uri: String,
    /// Whether the authorize request spelled the redirect URI out (as
    /// opposed to it being resolved from a single registered entry).
    /// The token exchange must repeat the URI exactly when it did.
    pub redirect_uri_specified: bool,
    pub encrypted_code_challenge: Option<String>,
    pub code_digest: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    /// A grant is expired from `expires_at` onwards (inclusive).
    pub fn expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Parameters for inserting a grant.
#[derive(Debug, Clone)]
pub struct NewGrant {
    pub authorization_id: Uuid,
    pub resource_owner_id: String,
    pub kind: GrantKind,
    pub redirect_uri: String,
    pub redirect_uri_specified: bool,
    pub encrypted_code_challenge: Option<String>,
    pub code_digest: String,
    pub expires_at: DateTime<Utc>,
}

/// A grant with its parent authorization preloaded.
#[derive(Debug, Clone)]
pub struct GrantWithAuthorization {
    pub grant: Grant,
    pub authorization: Authorization,
}

/// The already-authenticated caller of the authorize endpoint.
///
/// Produced by the host application's authentication layer; this core
/// never authenticates users itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
