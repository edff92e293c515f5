//! Symmetric encryption for secrets at rest.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce prepended to the
//! ciphertext, hex-encoded. The authentication tag makes decryption
//! under the wrong key a hard error rather than silent garbage.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use subtle::ConstantTimeEq;

use doorman_core::error::ProviderError;

const NONCE_LEN: usize = 24;

/// Encrypt `data` under a 32-byte key.
pub fn encrypt(key: &[u8; 32], data: &str) -> Result<String, ProviderError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| ProviderError::Crypto(format!("cipher init failed: {e}")))?;

    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data.as_bytes())
        .map_err(|e| ProviderError::Crypto(format!("encryption failed: {e}")))?;

    // Prepend nonce to ciphertext, then hex-encode
    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);
    Ok(hex::encode(result))
}

/// Decrypt data produced by [`encrypt`].
pub fn decrypt(key: &[u8; 32], data: &str) -> Result<String, ProviderError> {
    let raw = hex::decode(data)
        .map_err(|e| ProviderError::Crypto(format!("invalid hex data: {e}")))?;

    if raw.len() < NONCE_LEN {
        return Err(ProviderError::Crypto(
            "ciphertext too short (missing nonce)".into(),
        ));
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| ProviderError::Crypto(format!("cipher init failed: {e}")))?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ProviderError::Crypto("decryption failed".into()))?;

    String::from_utf8(plaintext)
        .map_err(|e| ProviderError::Crypto(format!("invalid UTF-8 plaintext: {e}")))
}

/// Compare two byte slices in constant time.
///
/// Mandatory for client secrets, PKCE challenges, and any token-like
/// value.
pub fn constant_time_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";
    const OTHER_KEY: &[u8; 32] = b"fedcba9876543210fedcba9876543210";

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let encrypted = encrypt(KEY, "a-client-secret").unwrap();
        assert_ne!(encrypted, "a-client-secret");
        assert_eq!(decrypt(KEY, &encrypted).unwrap(), "a-client-secret");
    }

    #[test]
    fn test_wrong_key_is_an_error() {
        let encrypted = encrypt(KEY, "a-client-secret").unwrap();
        assert!(decrypt(OTHER_KEY, &encrypted).is_err());
    }

    #[test]
    fn test_nonces_differ() {
        let enc1 = encrypt(KEY, "same data").unwrap();
        let enc2 = encrypt(KEY, "same data").unwrap();
        assert_ne!(enc1, enc2);
        assert_eq!(decrypt(KEY, &enc1).unwrap(), "same data");
        assert_eq!(decrypt(KEY, &enc2).unwrap(), "same data");
    }

    #[test]
    fn test_truncated_ciphertext() {
        assert!(decrypt(KEY, "abcd").is_err());
        assert!(decrypt(KEY, "not hex at all").is_err());
    }

    #[test]
    fn test_constant_time_equal() {
        assert!(constant_time_equal(b"secret", b"secret"));
        assert!(!constant_time_equal(b"secret", b"secreT"));
        assert!(!constant_time_equal(b"secret", b"secre"));
    }
}
