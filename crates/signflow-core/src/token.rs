//! Unguessable token generation for signing sessions and public forms

use uuid::Uuid;

/// Session and public tokens are 32 lowercase hex characters.
pub const TOKEN_LEN: usize = 32;

/// Generate a fresh token: the simple (hyphenless) hex form of a random
/// v4 UUID. 122 bits of OS-sourced randomness; never derived from a
/// sequence. Uniqueness is enforced by the storage layer, which retries
/// on collision.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
