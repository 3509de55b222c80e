//! Error kinds returned by the backing store to the protocol engine.

use std::error::Error as StdError;
use std::fmt;

use serde_json::{Value, json};
use tracing::warn;

/// The kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Client,
    AuthRequest,
    AuthCode,
    Token,
    User,
    SigningKey,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Client => "client",
            Entity::AuthRequest => "auth request",
            Entity::AuthCode => "authorization code",
            Entity::Token => "token",
            Entity::User => "user",
            Entity::SigningKey => "signing key",
        };
        f.write_str(name)
    }
}

/// Errors produced by the OIDC backing store.
///
/// None of these are process-fatal. Constructors that cannot produce a usable
/// store (for example when key generation fails) return `Crypto` and leave
/// the decision to abort to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The client, request, token, user or key does not exist.
    NotFound(Entity),
    /// Username/password pair did not match any user.
    InvalidCredentials,
    /// Client secret did not match.
    InvalidSecret,
    /// The record exists but is past its expiry.
    Expired(Entity),
    /// A caller-supplied ID is already taken.
    AlreadyExists(Entity),
    /// The token request shape is not handled by this store.
    Unsupported(String),
    /// The grant cannot be honoured (client/redirect mismatch, PKCE failure, ...).
    InvalidGrant(String),
    /// Configuration or seed data could not be loaded.
    Config(String),
    /// Key generation, signing or verification failed.
    Crypto(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{} not found", entity),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::InvalidSecret => write!(f, "invalid client secret"),
            Self::Expired(entity) => write!(f, "{} expired", entity),
            Self::AlreadyExists(entity) => write!(f, "{} already exists", entity),
            Self::Unsupported(what) => write!(f, "unsupported token request: {}", what),
            Self::InvalidGrant(reason) => write!(f, "invalid grant: {}", reason),
            Self::Config(reason) => write!(f, "configuration error: {}", reason),
            Self::Crypto(reason) => write!(f, "crypto error: {}", reason),
        }
    }
}

impl StdError for StorageError {}

impl From<jsonwebtoken::errors::Error> for StorageError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        StorageError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Config(err.to_string())
    }
}

impl StorageError {
    /// The OAuth 2.0 / OIDC error code a protocol engine should report for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(Entity::Client) | Self::InvalidSecret => "invalid_client",
            Self::NotFound(Entity::AuthRequest) | Self::NotFound(Entity::AuthCode) => "invalid_grant",
            Self::NotFound(Entity::Token) | Self::Expired(Entity::Token) => "invalid_token",
            Self::NotFound(_) => "invalid_request",
            Self::InvalidCredentials => "access_denied",
            Self::Expired(_) | Self::InvalidGrant(_) => "invalid_grant",
            Self::AlreadyExists(_) => "invalid_request",
            Self::Unsupported(_) => "unsupported_grant_type",
            Self::Config(_) | Self::Crypto(_) => "server_error",
        }
    }

    /// Render the standard `{"error", "error_description"}` body for this error.
    pub fn to_json(&self) -> Value {
        let code = self.error_code();
        warn!(error = ?self, error_code = code, "OIDC storage error reported");
        json!({ "error": code, "error_description": self.to_string() })
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
