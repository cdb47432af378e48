//! Opaque identifier generation for sessions and logical sockets.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Number of random bytes behind each identifier
const ID_BYTES: usize = 15;

/// Generate a fresh URL-safe random identifier (20 characters).
///
/// Identifiers carry 120 bits of randomness, so collisions are not tracked.
pub fn generate_id() -> String {
    let mut raw = [0u8; ID_BYTES];
    rand::rng().fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}
