//! Request validators.
//!
//! Pure functions building validated change sets from untyped input.
//! Checks accumulate per-field messages instead of short-circuiting, so
//! one response can report every problem with a request. The only I/O
//! in the pipeline is the client/authorization lookup, which the
//! endpoints perform up front and pass in.

pub mod authorize;
pub mod token;

pub use authorize::{validate_authorize, AuthorizeChangeSet, AuthorizeOutcome, AuthorizeParams};
pub use token::{recognize_grant_type, TokenError, TokenGrantType, TokenParams};
