//! Crypto primitives: secret-at-rest encryption, keyed code digests,
//! constant-time comparison, CSPRNG secrets, and PKCE hashing.

pub mod keys;
pub mod pkce;
pub mod random;
pub mod symmetric;

pub use keys::KeySet;
pub use random::generate_secret;
pub use symmetric::constant_time_equal;
