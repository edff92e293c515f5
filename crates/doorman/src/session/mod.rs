//! Session/token integration.
//!
//! The traits live in `doorman-core`; this module carries the reference
//! JWT-backed implementation.

pub mod jwt;

pub use jwt::{JwtSessionManager, JwtSessionOptions};
