//! # doorman
//!
//! An embeddable OAuth 2.1 authorization server core. The crate
//! provides the two protocol endpoints (authorize and token), their
//! validators, the crypto that protects secrets at rest, and a
//! framework-agnostic HTTP handler. The host application supplies user
//! authentication, the consent UI, storage (see `doorman-memory` /
//! `doorman-sqlx`), and its own token minting unless the bundled JWT
//! session manager fits.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use doorman::context::ProviderContext;
//! use doorman::session::JwtSessionManager;
//! use doorman_core::options::ProviderOptions;
//! use doorman_memory::{MemorySessionStore, MemoryStore};
//!
//! let options = ProviderOptions::new(
//!     "a-32-byte-or-longer-base-secret!",
//!     vec!["read".into(), "write".into()],
//! );
//! let sessions = Arc::new(MemorySessionStore::new());
//! let manager = Arc::new(JwtSessionManager::new(options.secret.clone(), sessions));
//! let ctx = ProviderContext::new(
//!     options,
//!     Arc::new(MemoryStore::new()),
//!     manager.clone(),
//!     manager,
//! )
//! .unwrap();
//! # let _ = ctx;
//! ```

pub mod context;
pub mod crypto;
pub mod endpoints;
pub mod handler;
pub mod session;
pub mod validate;

pub use context::ProviderContext;
pub use endpoints::{handle_authorize, handle_token, AuthorizeReply, ClientCredentials, TokenReply};
pub use handler::{route_request, GenericRequest, GenericResponse};
