//! ID token signing and verification with the process signing key.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Header, Validation, decode, decode_header, encode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::error::{Entity, Result, StorageError};
use super::keys::KeyManager;
use super::types::Claims;

/// Claims carried by an ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Scope-gated user claims.
    #[serde(flatten)]
    pub extra: Claims,
}

impl IdTokenClaims {
    pub fn new(
        issuer: &str,
        subject: &str,
        client_id: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            iss: issuer.to_string(),
            sub: subject.to_string(),
            aud: client_id.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            auth_time: None,
            nonce: None,
            extra: Claims::new(),
        }
    }
}

/// Issues ID tokens for one issuer URL.
#[derive(Debug, Clone)]
pub struct JwtIssuer {
    issuer: String,
}

impl JwtIssuer {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self { issuer: issuer.into() }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs the claims, embedding the active key ID in the header.
    #[instrument(skip(self, keys, claims), fields(sub = %claims.sub), level = "debug")]
    pub fn sign(&self, keys: &KeyManager, claims: &IdTokenClaims) -> Result<String> {
        let signing = keys.signing_key();
        let mut header = Header::new(signing.algorithm);
        header.kid = Some(signing.key_id);
        Ok(encode(&header, claims, &signing.key)?)
    }

    /// Verifies signature, issuer, audience and expiry of an ID token.
    pub fn verify(&self, keys: &KeyManager, token: &str, client_id: &str) -> Result<IdTokenClaims> {
        let header = decode_header(token)?;
        let key_id = header.kid.ok_or(StorageError::NotFound(Entity::SigningKey))?;
        let decoding = keys.decoding_key(&key_id)?;
        let mut validation = Validation::new(keys.algorithm());
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[client_id]);
        let data = decode::<IdTokenClaims>(token, decoding, &validation)?;
        Ok(data.claims)
    }
}
