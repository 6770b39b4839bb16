//! Invite code generation.

use rand::Rng;
use uuid::Uuid;

/// Length of a generated invite code.
const CODE_LENGTH: usize = 14;

/// Uppercase alphanumeric alphabet. No lowercase: codes are read aloud and
/// typed by hand.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generator for human-shareable invite codes.
pub struct InviteCode;

impl InviteCode {
    /// A random 14-character uppercase alphanumeric code.
    pub fn generate() -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Guaranteed-unique fallback when random generation keeps colliding.
    pub fn fallback() -> String {
        Uuid::new_v4().simple().to_string().to_uppercase()
    }
}
