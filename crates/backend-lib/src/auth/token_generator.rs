// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
/** Secure identifier and credential generation
Permalinks, teacher ids and teacher tokens are all drawn from OS entropy and
encoded as base64url without padding, so they are safe in paths and query
strings. */
use rand::{rngs::OsRng, RngCore};

/// 128 bits: public but unguessable share links
pub const PERMALINK_BYTES: usize = 16;
/// Public teacher identifier
pub const TEACHER_ID_BYTES: usize = 9;
/// 256 bits: the teacher's bearer credential
pub const TEACHER_TOKEN_BYTES: usize = 32;

pub fn generate_permalink() -> String {
    generate_secure_token_with_size(PERMALINK_BYTES)
}

pub fn generate_teacher_id() -> String {
    generate_secure_token_with_size(TEACHER_ID_BYTES)
}

pub fn generate_teacher_token() -> String {
    generate_secure_token_with_size(TEACHER_TOKEN_BYTES)
}

/** Generate a cryptographically secure random token with specified size
# Arguments
* `bytes` - The size of the random token in bytes
# Returns
A base64 URL-safe encoded string without padding */
pub fn generate_secure_token_with_size(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}
