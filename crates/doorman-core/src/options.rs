//! Configuration options.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::logger::LoggerConfig;
use crate::session::SessionUpsertArgs;

/// When PKCE is required on the authorize flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcePkce {
    /// Every client must send a code challenge.
    #[default]
    All,
    /// Only public clients must.
    Public,
    /// PKCE is optional (a supplied challenge is still verified).
    No,
}

/// Where the host keeps its resource owners. Consumed by the SQL
/// backend when emitting schema DDL; the protocol core treats owner ids
/// as opaque strings regardless.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOwnerOptions {
    pub table: String,
    pub id_column: String,
    /// SQL type of the id column (e.g. `uuid`, `bigint`).
    pub id_type: String,
}

impl Default for ResourceOwnerOptions {
    fn default() -> Self {
        Self {
            table: "users".into(),
            id_column: "id".into(),
            id_type: "uuid".into(),
        }
    }
}

/// Hook for adding claims to minted tokens. Runs after the core has set
/// its own upsert arguments.
pub type SessionArgsHook = Arc<dyn Fn(&mut SessionUpsertArgs) + Send + Sync>;

/// Top-level configuration for the authorization server core.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderOptions {
    /// Base secret all field keys are derived from. At least 32 chars.
    pub secret: String,

    /// The universe of application scope strings.
    pub scopes: Vec<String>,

    #[serde(default)]
    pub enforce_pkce: EnforcePkce,

    /// Seconds until an authorization code expires.
    #[serde(default = "default_grant_ttl")]
    pub grant_ttl: u64,

    #[serde(default)]
    pub resource_owner: ResourceOwnerOptions,

    /// Extra header names appended to the token endpoint's
    /// `Access-Control-Allow-Headers` list.
    #[serde(default)]
    pub token_endpoint_additional_allowed_headers: Vec<String>,

    #[serde(skip)]
    pub customize_session_upsert_args: Option<SessionArgsHook>,

    #[serde(skip)]
    pub logger: LoggerConfig,
}

fn default_grant_ttl() -> u64 {
    600
}

impl ProviderOptions {
    pub fn new(secret: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            secret: secret.into(),
            scopes,
            enforce_pkce: EnforcePkce::default(),
            grant_ttl: default_grant_ttl(),
            resource_owner: ResourceOwnerOptions::default(),
            token_endpoint_additional_allowed_headers: Vec::new(),
            customize_session_upsert_args: None,
            logger: LoggerConfig::default(),
        }
    }

    pub fn enforce_pkce(mut self, mode: EnforcePkce) -> Self {
        self.enforce_pkce = mode;
        self
    }

    pub fn grant_ttl(mut self, seconds: u64) -> Self {
        self.grant_ttl = seconds;
        self
    }

    pub fn resource_owner(mut self, resource_owner: ResourceOwnerOptions) -> Self {
        self.resource_owner = resource_owner;
        self
    }

    pub fn customize_session_upsert_args(mut self, hook: SessionArgsHook) -> Self {
        self.customize_session_upsert_args = Some(hook);
        self
    }

    /// Check invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.secret.len() < 32 {
            return Err(ProviderError::Config(
                "secret must be at least 32 characters".into(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(ProviderError::Config(
                "at least one application scope must be configured".into(),
            ));
        }
        if self.scopes.iter().any(|s| s.is_empty()) {
            return Err(ProviderError::Config(
                "application scopes must be non-empty strings".into(),
            ));
        }
        if self.grant_ttl == 0 {
            return Err(ProviderError::Config("grant_ttl must be positive".into()));
        }
        Ok(())
    }
}

// Manual Debug: never print the secret.
impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("enforce_pkce", &self.enforce_pkce)
            .field("grant_ttl", &self.grant_ttl)
            .field("resource_owner", &self.resource_owner)
            .field(
                "token_endpoint_additional_allowed_headers",
                &self.token_endpoint_additional_allowed_headers,
            )
            .field(
                "customize_session_upsert_args",
                &self.customize_session_upsert_args.is_some(),
            )
            .finish()
    }
}
