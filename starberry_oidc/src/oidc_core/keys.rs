//! Process-lifetime signing key and its published JWKS entry.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{Entity, Result, StorageError};

/// A public key as represented in a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// A JWKS document containing the published keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// The private half handed to the token issuer.
#[derive(Clone)]
pub struct SigningKey {
    pub key: EncodingKey,
    pub key_id: String,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Owns the single ES256 key pair of this process.
///
/// Generated once at construction and never rotated; no lock is needed
/// because nothing mutates it afterwards.
pub struct KeyManager {
    key_id: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
}

impl KeyManager {
    /// Generates a fresh P-256 key pair with a random key ID.
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| StorageError::Crypto(format!("failed to generate signing key: {}", e)))?;
        let pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
            .map_err(|e| StorageError::Crypto(format!("generated signing key rejected: {}", e)))?;

        // Uncompressed SEC1 point: 0x04 || x || y
        let point = pair.public_key().as_ref();
        if point.len() != 65 || point[0] != 0x04 {
            return Err(StorageError::Crypto("unexpected public key encoding".into()));
        }
        let key_id = Uuid::new_v4().to_string();
        let jwk = Jwk {
            kty: "EC".into(),
            kid: key_id.clone(),
            use_: "sig".into(),
            alg: "ES256".into(),
            crv: "P-256".into(),
            x: URL_SAFE_NO_PAD.encode(&point[1..33]),
            y: URL_SAFE_NO_PAD.encode(&point[33..65]),
        };
        let decoding = DecodingKey::from_ec_components(&jwk.x, &jwk.y)?;
        let encoding = EncodingKey::from_ec_der(pkcs8.as_ref());
        info!(key_id = %key_id, "signing key generated");
        Ok(Self { key_id, encoding, decoding, jwk })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        Algorithm::ES256
    }

    /// The active signing key. Always the same key for the lifetime of the manager.
    pub fn signing_key(&self) -> SigningKey {
        SigningKey {
            key: self.encoding.clone(),
            key_id: self.key_id.clone(),
            algorithm: self.algorithm(),
        }
    }

    /// The public half of the signing key, for the JWKS endpoint.
    pub fn public_key_set(&self) -> JwkSet {
        JwkSet { keys: vec![self.jwk.clone()] }
    }

    /// Resolves a key ID to the published key. Only the active key ID resolves.
    pub fn resolve_public_key(&self, key_id: &str, client_id: &str) -> Result<Jwk> {
        if key_id != self.key_id {
            debug!(key_id, client_id, "unknown key ID requested");
            return Err(StorageError::NotFound(Entity::SigningKey));
        }
        Ok(self.jwk.clone())
    }

    /// Verification key for tokens signed with the active key.
    pub fn decoding_key(&self, key_id: &str) -> Result<&DecodingKey> {
        if key_id != self.key_id {
            return Err(StorageError::NotFound(Entity::SigningKey));
        }
        Ok(&self.decoding)
    }
}
