//! PKCE verification and opaque code generation using `ring`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use super::error::{Result, StorageError};
use super::types::{CodeChallenge, CodeChallengeMethod};

/// Generate a PKCE code challenge from the given verifier using SHA-256 and base64url (no padding).
pub fn pkce_code_challenge(verifier: &str) -> String {
    let hash = digest::digest(&digest::SHA256, verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash.as_ref())
}

/// Check a PKCE verifier against the stored challenge.
pub fn verify_code_challenge(challenge: &CodeChallenge, verifier: &str) -> bool {
    match challenge.method {
        CodeChallengeMethod::S256 => pkce_code_challenge(verifier) == challenge.challenge,
        CodeChallengeMethod::Plain => verifier == challenge.challenge,
    }
}

/// 32 random bytes, base64url encoded. Used for authorization codes.
pub fn random_token() -> Result<String> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; 32];
    rng.fill(&mut buf)
        .map_err(|_| StorageError::Crypto("random generation failed".into()))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}
