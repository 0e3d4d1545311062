//! PKCE (Proof Key for Code Exchange) and `state` generation.
//!
//! S256 code challenge method per RFC 7636.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE verifier/challenge pair.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The code verifier (random base64url string, 43 chars).
    pub verifier: String,
    /// The S256 code challenge (SHA-256 of verifier, base64url encoded).
    pub challenge: String,
}

/// Generate a PKCE verifier and its S256 challenge.
pub fn generate_pkce() -> PkcePair {
    let verifier = random_token(32);
    let challenge = challenge_for(&verifier);
    PkcePair {
        verifier,
        challenge,
    }
}

pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque `state` value tying a callback to the sign-in that started it.
pub fn generate_state() -> String {
    random_token(16)
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
