//! Bearer token generation.

use rand::RngCore;

/// Number of random bytes in a token before hex encoding.
pub const TOKEN_BYTES: usize = 16;

/// Generates a fresh token: 16 bytes from the OS RNG, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
