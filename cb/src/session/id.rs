//! Session ID generation
//!
//! IDs use the format `session_{32-hex}`, built from 16 random bytes.

use rand::RngCore;

/// Mint a new unguessable session identifier
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("session_{}", hex)
}
