//! Secret and code generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Generate a 256-bit secret, URL-safe base64 without padding.
///
/// Used for grant codes; client secrets use the same construction on
/// the CRUD side.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
