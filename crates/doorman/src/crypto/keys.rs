//! Field-key derivation.
//!
//! One base secret enters at startup; each protected field gets its own
//! 32-byte key derived via HMAC-SHA-256 over a fixed salt. The derived
//! set is immutable for the process lifetime, so a database leak alone
//! never exposes client secrets, code challenges, or usable grant codes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use doorman_core::error::ProviderError;

use super::symmetric;

type HmacSha256 = Hmac<Sha256>;

const CLIENT_SECRET_SALT: &[u8] = b"doorman.client-secret";
const CODE_CHALLENGE_SALT: &[u8] = b"doorman.code-challenge";
const GRANT_CODE_SALT: &[u8] = b"doorman.grant-code";

/// The per-field keys derived from the configured base secret.
#[derive(Clone)]
pub struct KeySet {
    client_secret_key: [u8; 32],
    code_challenge_key: [u8; 32],
    grant_code_key: [u8; 32],
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet").finish_non_exhaustive()
    }
}

impl KeySet {
    pub fn derive(base_secret: &str) -> Self {
        Self {
            client_secret_key: derive_key(base_secret, CLIENT_SECRET_SALT),
            code_challenge_key: derive_key(base_secret, CODE_CHALLENGE_SALT),
            grant_code_key: derive_key(base_secret, GRANT_CODE_SALT),
        }
    }

    pub fn encrypt_client_secret(&self, secret: &str) -> Result<String, ProviderError> {
        symmetric::encrypt(&self.client_secret_key, secret)
    }

    pub fn decrypt_client_secret(&self, stored: &str) -> Result<String, ProviderError> {
        symmetric::decrypt(&self.client_secret_key, stored)
    }

    pub fn encrypt_code_challenge(&self, challenge: &str) -> Result<String, ProviderError> {
        symmetric::encrypt(&self.code_challenge_key, challenge)
    }

    pub fn decrypt_code_challenge(&self, stored: &str) -> Result<String, ProviderError> {
        symmetric::decrypt(&self.code_challenge_key, stored)
    }

    /// Keyed digest of a grant code, base64-encoded.
    ///
    /// Stored in place of the code so it can be looked up by exact
    /// equality in SQL but not reversed from a leaked database.
    pub fn code_digest(&self, code: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.grant_code_key)
            .expect("HMAC accepts any key length");
        mac.update(code.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn derive_key(base_secret: &str, salt: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(base_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(salt);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "an-adequately-long-base-secret-value";

    #[test]
    fn test_field_keys_are_distinct() {
        let keys = KeySet::derive(SECRET);
        assert_ne!(keys.client_secret_key, keys.code_challenge_key);
        assert_ne!(keys.client_secret_key, keys.grant_code_key);
        assert_ne!(keys.code_challenge_key, keys.grant_code_key);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        assert_eq!(
            KeySet::derive(SECRET).client_secret_key,
            KeySet::derive(SECRET).client_secret_key
        );
        assert_ne!(
            KeySet::derive(SECRET).client_secret_key,
            KeySet::derive("a-different-but-also-long-secret!!").client_secret_key
        );
    }

    #[test]
    fn test_client_secret_round_trip() {
        let keys = KeySet::derive(SECRET);
        let stored = keys.encrypt_client_secret("s3cr3t").unwrap();
        assert_eq!(keys.decrypt_client_secret(&stored).unwrap(), "s3cr3t");
    }

    #[test]
    fn test_wrong_base_secret_fails_decryption() {
        let stored = KeySet::derive(SECRET)
            .encrypt_client_secret("s3cr3t")
            .unwrap();
        let other = KeySet::derive("a-different-but-also-long-secret!!");
        assert!(other.decrypt_client_secret(&stored).is_err());
    }

    #[test]
    fn test_fields_do_not_share_keys() {
        let keys = KeySet::derive(SECRET);
        let as_secret = keys.encrypt_client_secret("value").unwrap();
        // The same ciphertext under the challenge key must not decrypt.
        assert!(keys.decrypt_code_challenge(&as_secret).is_err());
    }

    #[test]
    fn test_code_digest_is_stable_and_keyed() {
        let keys = KeySet::derive(SECRET);
        assert_eq!(keys.code_digest("code"), keys.code_digest("code"));
        assert_ne!(keys.code_digest("code"), keys.code_digest("code2"));
        let other = KeySet::derive("a-different-but-also-long-secret!!");
        assert_ne!(keys.code_digest("code"), other.code_digest("code"));
    }

    #[test]
    fn test_debug_never_prints_key_material() {
        let rendered = format!("{:?}", KeySet::derive(SECRET));
        assert_eq!(rendered, "KeySet { .. }");
    }
}
