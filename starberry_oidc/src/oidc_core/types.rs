//! OIDC core primitives: clients, authorization requests, tokens and users.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{Result, StorageError};

/// Scope that turns an OAuth2 request into an OpenID Connect one.
pub const SCOPE_OPENID: &str = "openid";
/// Scope gating the profile claims.
pub const SCOPE_PROFILE: &str = "profile";
/// Scope gating the email claims.
pub const SCOPE_EMAIL: &str = "email";

/// Longest lifetime accepted anywhere in the store: ten years, in seconds.
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Seconds to a [`Duration`], rejecting anything past [`MAX_LIFETIME_SECS`].
pub(crate) fn bounded_seconds(name: &str, secs: u64) -> Result<Duration> {
    i64::try_from(secs)
        .ok()
        .filter(|s| *s <= MAX_LIFETIME_SECS)
        .and_then(Duration::try_seconds)
        .ok_or_else(|| StorageError::Config(format!("{} must not exceed {} seconds", name, MAX_LIFETIME_SECS)))
}

/// Scopes a client may request when it does not list its own.
pub const DEFAULT_SCOPES: [&str; 3] = [SCOPE_OPENID, SCOPE_PROFILE, SCOPE_EMAIL];

/// Claims handed to ID tokens, userinfo and introspection responses.
pub type Claims = Map<String, Value>;

/// Client application type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Web,
    UserAgent,
    Native,
}

/// Client authentication method at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    #[serde(rename = "client_secret_basic")]
    Basic,
    #[serde(rename = "client_secret_post")]
    Post,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "private_key_jwt")]
    PrivateKeyJwt,
}

/// Response types a client may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "id_token")]
    IdToken,
    #[serde(rename = "id_token token")]
    IdTokenToken,
}

/// How the authorization response is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Query,
    Fragment,
    FormPost,
}

/// Grant types a client may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "refresh_token")]
    RefreshToken,
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
    JwtBearer,
}

/// Format of the access tokens handed to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTokenType {
    Bearer,
    Jwt,
}

fn default_login_url() -> String {
    "/login?authRequestID={id}".to_string()
}

fn default_id_token_lifetime() -> u64 {
    3600
}

fn default_clock_skew() -> u64 {
    60
}

/// A registered OAuth2 / OIDC client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    /// Client identifier. Empty on registration means "generate one".
    #[serde(default)]
    pub id: String,
    /// Secret for confidential clients.
    #[serde(default)]
    pub secret: Option<String>,
    /// Allowed redirect URIs, matched exactly.
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    pub application_type: ApplicationType,
    pub auth_method: AuthMethod,
    pub response_types: Vec<ResponseType>,
    pub grant_types: Vec<GrantType>,
    pub access_token_type: AccessTokenType,
    #[serde(default)]
    pub id_token_userinfo_claims_assertion: bool,
    #[serde(default)]
    pub dev_mode: bool,
    /// Scopes this client may request. Empty means [`DEFAULT_SCOPES`].
    #[serde(default)]
    pub allowed_scopes: Vec<String>,
    /// Login page template; `{id}` is replaced with the auth request ID.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_id_token_lifetime")]
    pub id_token_lifetime_secs: u64,
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: u64,
}

impl Client {
    pub fn redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    pub fn is_scope_allowed(&self, scope: &str) -> bool {
        if self.allowed_scopes.is_empty() {
            DEFAULT_SCOPES.contains(&scope)
        } else {
            self.allowed_scopes.iter().any(|s| s == scope)
        }
    }

    pub fn supports_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Login page URL for the given authorization request.
    pub fn login_url(&self, auth_request_id: &str) -> String {
        self.login_url.replace("{id}", auth_request_id)
    }

    pub fn id_token_lifetime(&self) -> Result<Duration> {
        bounded_seconds("id_token_lifetime_secs", self.id_token_lifetime_secs)
    }

    pub fn clock_skew(&self) -> Result<Duration> {
        bounded_seconds("clock_skew_secs", self.clock_skew_secs)
    }

    /// Fails when a configured lifetime is out of range.
    pub fn check_lifetimes(&self) -> Result<()> {
        self.id_token_lifetime()?;
        self.clock_skew()?;
        Ok(())
    }

    pub fn is_confidential(&self) -> bool {
        self.secret.is_some() && self.auth_method != AuthMethod::None
    }
}

/// PKCE code challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

/// PKCE code challenge stored with an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

/// The inbound authorization request as parsed by the protocol engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAuthRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub response_type: Option<ResponseType>,
    pub response_mode: Option<ResponseMode>,
    pub state: String,
    pub nonce: String,
    pub code_challenge: Option<CodeChallenge>,
    pub login_hint: Option<String>,
    pub max_age: Option<u64>,
}

/// A stored authorization request.
///
/// Pending while `done` is false; completed once a subject has authenticated
/// and an authorization code was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub response_type: ResponseType,
    pub response_mode: Option<ResponseMode>,
    pub state: String,
    pub nonce: String,
    pub code_challenge: Option<CodeChallenge>,
    pub login_hint: Option<String>,
    pub max_age: Option<u64>,
    /// Authenticated user; `None` until login completes.
    pub subject: Option<String>,
    pub auth_time: Option<DateTime<Utc>>,
    /// Authorization code bound to this request.
    pub code: Option<String>,
    pub done: bool,
}

impl AuthRequest {
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn audience(&self) -> Vec<String> {
        vec![self.client_id.clone()]
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Kind of an issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// An issued access or refresh token. The token ID is also the opaque value
/// handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub id: String,
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub kind: TokenKind,
    /// For access tokens minted together with a refresh token.
    pub refresh_token_id: Option<String>,
}

impl Token {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Result of issuing a standalone access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of issuing an access + refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token_id: String,
    pub refresh_token_id: String,
    /// Expiry of the access token.
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// What a refresh token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenInfo {
    pub subject: String,
    pub token_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

/// Token request derived from a presented refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
}

impl RefreshTokenRequest {
    pub fn audience(&self) -> Vec<String> {
        vec![self.client_id.clone()]
    }
}

/// Shapes of token request the store knows how to turn into tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    AuthCode(AuthRequest),
    Refresh(RefreshTokenRequest),
    ClientCredentials { client_id: String, scopes: Vec<String> },
}

impl TokenRequest {
    pub fn grant_type(&self) -> GrantType {
        match self {
            TokenRequest::AuthCode(_) => GrantType::AuthorizationCode,
            TokenRequest::Refresh(_) => GrantType::RefreshToken,
            TokenRequest::ClientCredentials { .. } => GrantType::ClientCredentials,
        }
    }
}

/// Introspection view of a token. Inactive tokens carry no other data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(rename = "sub", skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "scope", skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds_option", skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds_option", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenKind>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub(crate) fn from_token(token: &Token) -> Self {
        Introspection {
            active: true,
            subject: Some(token.subject.clone()),
            client_id: Some(token.client_id.clone()),
            scopes: token.scopes.clone(),
            issued_at: Some(token.created_at),
            expires_at: Some(token.expires_at),
            token_type: Some(token.kind),
        }
    }
}

/// An end user known to the OIDC provider.
///
/// `password` is a demo credential compared in plain text; it is never
/// serialized back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcUser {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub preferred_username: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub family_name: String,
    #[serde(default)]
    pub locale: String,
    /// Additional claims merged into every claim set.
    #[serde(default)]
    pub claims: Claims,
}

impl OidcUser {
    /// Full display name, falling back to the preferred username.
    pub fn name(&self) -> String {
        let name = format!("{} {}", self.given_name, self.family_name);
        let name = name.trim();
        if name.is_empty() {
            self.preferred_username.clone()
        } else {
            name.to_string()
        }
    }
}
