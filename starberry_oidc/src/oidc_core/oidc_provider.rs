//! Storage ports for the OIDC provider.
//!
//! Each component of the backing store is a trait so that a protocol engine,
//! or an alternative backend, can bind to it without knowing the in-memory
//! implementations.

use async_trait::async_trait;

use super::error::Result;
use super::keys::{Jwk, JwkSet, SigningKey};
use super::types::{
    AuthRequest, Claims, Client, Introspection, IssuedToken, NewAuthRequest, OidcUser,
    RefreshTokenInfo, RefreshTokenRequest, Token, TokenPair, TokenRequest,
};

/// Registry of OAuth2 / OIDC clients.
#[async_trait]
pub trait ClientStore: Send + Sync + 'static {
    /// Retrieves a client by its identifier.
    async fn lookup(&self, client_id: &str) -> Result<Client>;

    /// Checks a confidential client's secret. Fails with `NotFound` or `InvalidSecret`.
    async fn authorize(&self, client_id: &str, secret: &str) -> Result<()>;

    /// Registers a client, generating an ID when none is supplied. Returns the ID.
    async fn register(&self, client: Client) -> Result<String>;

    /// Replaces an existing client.
    async fn update(&self, client: Client) -> Result<()>;

    /// Removes a client.
    async fn delete(&self, client_id: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<Client>>;
}

/// In-flight authorization requests and their authorization codes.
#[async_trait]
pub trait AuthRequestStore: Send + Sync + 'static {
    /// Stores a new pending request. `subject` is set when the user is already known.
    async fn create(&self, request: NewAuthRequest, subject: Option<&str>) -> Result<AuthRequest>;

    async fn get_by_id(&self, id: &str) -> Result<AuthRequest>;

    /// Resolves a request from the authorization code issued for it.
    async fn get_by_code(&self, code: &str) -> Result<AuthRequest>;

    /// Binds the authenticated subject to a pending request.
    /// Fails once the request has been authenticated.
    async fn set_subject(&self, id: &str, subject: &str) -> Result<()>;

    /// Binds `subject` and issues `code` in one step, marking the request done.
    /// Fails once the request has been authenticated.
    async fn complete(&self, id: &str, subject: &str, code: &str) -> Result<()>;

    /// Associates `code` with the request and marks it done.
    async fn save_code(&self, id: &str, code: &str) -> Result<()>;

    /// Removes the request and its code. A second delete reports `NotFound`.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Drops requests older than the configured lifetime. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// Access and refresh token bookkeeping.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    /// Issues a standalone access token.
    async fn issue_access_token(&self, subject: &str, client_id: &str, scopes: &[String]) -> Result<IssuedToken>;

    /// Issues an access + refresh pair, atomically retiring `supersedes` and
    /// the access token minted with it.
    async fn issue_pair(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
        supersedes: Option<&str>,
    ) -> Result<TokenPair>;

    /// Resolves a refresh token presented by `client_id`.
    async fn refresh_token_info(&self, client_id: &str, refresh_token: &str) -> Result<RefreshTokenInfo>;

    /// Returns an active token by ID.
    async fn lookup(&self, token_id: &str) -> Result<Token>;

    /// Revokes a token by ID or refresh-token value.
    async fn revoke(&self, token: &str, subject: &str, client_id: &str) -> Result<()>;

    /// Removes every token of `subject` issued to `client_id`. Returns how many were removed.
    async fn terminate_session(&self, subject: &str, client_id: &str) -> usize;

    /// Never fails: unknown or expired tokens are reported inactive.
    async fn introspect(&self, token_id: &str) -> Introspection;

    /// Drops expired tokens. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

/// End users and claim assembly.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Checks a username/password pair, returning the user ID.
    async fn authenticate(&self, username: &str, password: &str) -> Result<String>;

    async fn get_by_id(&self, user_id: &str) -> Result<OidcUser>;

    /// Claims visible under `scopes`. Always contains `sub` and the user's custom claims.
    async fn claims_for_scopes(&self, user_id: &str, scopes: &[String]) -> Result<Claims>;

    /// Every claim of the user, unfiltered.
    async fn full_userinfo(&self, user_id: &str) -> Result<Claims>;

    async fn create(&self, user: OidcUser) -> Result<()>;

    async fn list(&self) -> Result<Vec<OidcUser>>;
}

/// The contract an OIDC protocol engine expects from its persistence layer.
#[async_trait]
pub trait OidcStorage: Send + Sync + 'static {
    // Clients
    async fn get_client_by_client_id(&self, client_id: &str) -> Result<Client>;
    async fn authorize_client_id_secret(&self, client_id: &str, client_secret: &str) -> Result<()>;

    // Authorization requests
    async fn create_auth_request(&self, request: NewAuthRequest, subject: Option<&str>) -> Result<AuthRequest>;
    async fn auth_request_by_id(&self, id: &str) -> Result<AuthRequest>;
    async fn auth_request_by_code(&self, code: &str) -> Result<AuthRequest>;
    async fn save_auth_code(&self, id: &str, code: &str) -> Result<()>;
    async fn delete_auth_request(&self, id: &str) -> Result<()>;
    /// Binds an authenticated subject to the request and issues its authorization code.
    async fn complete_authentication(&self, id: &str, subject: &str) -> Result<String>;

    // Tokens
    async fn create_access_token(&self, request: &TokenRequest) -> Result<IssuedToken>;
    async fn create_access_and_refresh_tokens(
        &self,
        request: &TokenRequest,
        current_refresh_token: Option<&str>,
    ) -> Result<TokenPair>;
    /// One-time exchange of an authorization code for a token pair.
    async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<TokenPair>;
    /// Rotates a refresh token into a new pair.
    async fn refresh(&self, client_id: &str, refresh_token: &str) -> Result<TokenPair>;
    async fn token_request_by_refresh_token(&self, refresh_token: &str) -> Result<RefreshTokenRequest>;
    async fn get_refresh_token_info(&self, client_id: &str, refresh_token: &str) -> Result<(String, String)>;
    async fn terminate_session(&self, subject: &str, client_id: &str) -> Result<()>;
    /// `Ok(false)` when the token is unknown.
    async fn revoke_token(&self, token: &str, subject: &str, client_id: &str) -> Result<bool>;
    async fn introspect(&self, token_id: &str) -> Introspection;

    // Claims
    async fn userinfo_from_token(&self, token_id: &str) -> Result<Claims>;
    async fn private_claims_from_scopes(&self, user_id: &str, client_id: &str, scopes: &[String]) -> Result<Claims>;
    async fn validate_jwt_profile_scopes(&self, user_id: &str, scopes: &[String]) -> Result<Vec<String>>;
    async fn validate_user(&self, username: &str, password: &str) -> Result<String>;
    async fn get_user_by_subject(&self, subject: &str) -> Result<OidcUser>;

    // Keys
    async fn signing_key(&self) -> Result<SigningKey>;
    async fn signature_algorithms(&self) -> Result<Vec<jsonwebtoken::Algorithm>>;
    async fn key_set(&self) -> Result<JwkSet>;
    async fn key_by_id_and_client_id(&self, key_id: &str, client_id: &str) -> Result<Jwk>;

    async fn health(&self) -> Result<()>;
}
