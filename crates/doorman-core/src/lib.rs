//! # doorman-core
//!
//! Shared vocabulary for the doorman OAuth 2.1 authorization server:
//! the persistent data model, the storage and session-integration traits,
//! the protocol error taxonomy, and the configuration options.
//!
//! The protocol state machines themselves live in the `doorman` crate;
//! storage backends implement [`store::Store`] (see `doorman-memory` and
//! `doorman-sqlx`).

pub mod error;
pub mod logger;
pub mod model;
pub mod options;
pub mod scope;
pub mod session;
pub mod store;

pub use error::{ErrorMap, OAuthErrorCode, ProviderError, StoreError, StoreResult};
pub use logger::{LogHandler, LogLevel, LoggerConfig, ProviderLogger};
pub use model::{
    Authorization, Client, ClientType, Grant, GrantKind, GrantType, GrantWithAuthorization,
    NewGrant, Principal,
};
pub use options::{EnforcePkce, ProviderOptions, ResourceOwnerOptions};
pub use scope::ScopeSet;
pub use session::{
    MintError, RefreshClaims, RefreshTokenVerifier, RefreshVerifyError, SessionRecord,
    SessionStore, SessionUpsertArgs, TokenBundle, TokenMinter,
};
pub use store::{DeleteOutcome, Store};
