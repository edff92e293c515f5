//! The protocol endpoints: authorize and token.

pub mod authorize;
pub mod token;

pub use authorize::{handle_authorize, AuthorizeReply};
pub use token::{handle_token, ClientCredentials, TokenReply, TokenResponseBody};
