//! PKCE (RFC 7636), S256 only.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use super::symmetric::constant_time_equal;

/// Compute the S256 challenge for a verifier:
/// `base64url_nopad(SHA256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Whether a challenge is plausibly a stored S256 value (the length
/// band RFC 7636 allows for challenges).
pub fn valid_challenge_format(challenge: &str) -> bool {
    (43..=128).contains(&challenge.len())
}

/// Verify a code verifier against a stored challenge, in constant time.
pub fn verify(verifier: &str, challenge: &str) -> bool {
    constant_time_equal(code_challenge(verifier).as_bytes(), challenge.as_bytes())
}
