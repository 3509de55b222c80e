//! The storage facade handed to an OIDC protocol engine.
//!
//! [`BackingStore`] composes the client, auth request, token and user stores
//! with the process signing key and implements [`OidcStorage`] on top of them.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::Algorithm;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::auth_request::InMemoryAuthRequestStore;
use super::config::OidcConfig;
use super::crypto::{random_token, verify_code_challenge};
use super::error::{Entity, Result, StorageError};
use super::jwt::{IdTokenClaims, JwtIssuer};
use super::keys::{Jwk, JwkSet, KeyManager, SigningKey};
use super::memory::{InMemoryClientStore, InMemoryUserStore};
use super::oidc_provider::{AuthRequestStore, ClientStore, OidcStorage, TokenStore, UserStore};
use super::token_store::InMemoryTokenStore;
use super::types::{
    AuthRequest, Claims, Client, GrantType, Introspection, IssuedToken, NewAuthRequest, OidcUser,
    RefreshTokenRequest, TokenKind, TokenPair, TokenRequest,
};

/// Everything an OIDC server needs to persist, behind one handle.
pub struct BackingStore {
    config: OidcConfig,
    clients: Arc<dyn ClientStore>,
    auth_requests: Arc<dyn AuthRequestStore>,
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    keys: KeyManager,
    jwt: JwtIssuer,
}

/// Builder for [`BackingStore`], for swapping in other client or user stores.
pub struct BackingStoreBuilder {
    config: OidcConfig,
    clients: Option<Arc<dyn ClientStore>>,
    users: Option<Arc<dyn UserStore>>,
}

impl BackingStoreBuilder {
    pub fn new(config: OidcConfig) -> Self {
        Self { config, clients: None, users: None }
    }

    /// Uses `store` instead of an in-memory client store. Seed clients are not loaded into it.
    pub fn client_store(mut self, store: Arc<dyn ClientStore>) -> Self {
        self.clients = Some(store);
        self
    }

    /// Uses `store` instead of an in-memory user store. Seed users are not loaded into it.
    pub fn user_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.users = Some(store);
        self
    }

    pub fn build(self) -> Result<BackingStore> {
        let config = self.config;
        config.validate()?;

        let clients: Arc<dyn ClientStore> = match self.clients {
            Some(store) => store,
            None => Arc::new(InMemoryClientStore::new(config.seed.clients.clone())?),
        };
        let users: Arc<dyn UserStore> = match self.users {
            Some(store) => store,
            None => Arc::new(InMemoryUserStore::new(config.seed.users.clone())?),
        };
        let auth_requests = Arc::new(InMemoryAuthRequestStore::new(config.auth_request_lifetime));
        let tokens = Arc::new(InMemoryTokenStore::new(
            config.access_token_lifetime,
            config.refresh_token_lifetime,
            config.revocation_policy,
        ));
        let keys = KeyManager::generate()?;
        let jwt = JwtIssuer::new(config.issuer.clone());

        info!(
            issuer = %config.issuer,
            clients = config.seed.clients.len(),
            users = config.seed.users.len(),
            key_id = %keys.key_id(),
            "backing store ready"
        );
        Ok(BackingStore { config, clients, auth_requests, tokens, users, keys, jwt })
    }
}

impl BackingStore {
    /// In-memory stores seeded from `config.seed`, plus a freshly generated signing key.
    pub fn new(config: OidcConfig) -> Result<Self> {
        BackingStoreBuilder::new(config).build()
    }

    pub fn builder(config: OidcConfig) -> BackingStoreBuilder {
        BackingStoreBuilder::new(config)
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn issuer(&self) -> &str {
        self.jwt.issuer()
    }

    pub fn clients(&self) -> &Arc<dyn ClientStore> {
        &self.clients
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub async fn register_client(&self, client: Client) -> Result<String> {
        self.clients.register(client).await
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>> {
        self.clients.list().await
    }

    pub async fn create_user(&self, user: OidcUser) -> Result<()> {
        self.users.create(user).await
    }

    pub async fn list_users(&self) -> Result<Vec<OidcUser>> {
        self.users.list().await
    }

    /// Every claim of the user regardless of scope.
    pub async fn full_userinfo(&self, user_id: &str) -> Result<Claims> {
        self.users.full_userinfo(user_id).await
    }

    /// Signs an ID token for `subject`, carrying the claims `scopes` unlock.
    #[instrument(skip(self, scopes, nonce), level = "debug")]
    pub async fn issue_id_token(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
        nonce: Option<&str>,
        auth_time: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let lifetime = match self.clients.lookup(client_id).await {
            Ok(client) => client.id_token_lifetime()?,
            Err(_) => self.config.id_token_lifetime,
        };
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| StorageError::Config("id token lifetime overflows the clock".into()))?;
        let mut claims = IdTokenClaims::new(self.jwt.issuer(), subject, client_id, now, expires_at);
        claims.nonce = nonce.filter(|n| !n.is_empty()).map(str::to_string);
        claims.auth_time = auth_time.map(|t| t.timestamp());
        claims.extra = self.private_claims_from_scopes(subject, client_id, scopes).await?;
        self.jwt.sign(&self.keys, &claims)
    }

    /// ID token for a completed authorization request.
    pub async fn id_token_for_request(&self, request: &AuthRequest) -> Result<String> {
        let subject = request
            .subject
            .as_deref()
            .ok_or_else(|| StorageError::InvalidGrant("auth request has no authenticated subject".into()))?;
        self.issue_id_token(subject, &request.client_id, &request.scopes, Some(&request.nonce), request.auth_time)
            .await
    }

    pub fn verify_id_token(&self, token: &str, client_id: &str) -> Result<IdTokenClaims> {
        self.jwt.verify(&self.keys, token, client_id)
    }

    /// Drops expired tokens and auth requests. Returns `(tokens, auth_requests)` removed.
    pub async fn purge_expired(&self) -> (usize, usize) {
        let tokens = self.tokens.purge_expired().await;
        let requests = self.auth_requests.purge_expired().await;
        if tokens + requests > 0 {
            debug!(tokens, auth_requests = requests, "expired records purged");
        }
        (tokens, requests)
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `every` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(store) = weak.upgrade() else {
                    debug!("backing store dropped, sweeper exiting");
                    break;
                };
                store.purge_expired().await;
            }
        })
    }

    async fn client_with_grant(&self, client_id: &str, grant: GrantType) -> Result<Client> {
        let client = self.clients.lookup(client_id).await?;
        if !client.supports_grant(grant) {
            warn!(client_id, ?grant, "grant type not allowed for client");
            return Err(StorageError::InvalidGrant(format!("client may not use the {:?} grant", grant)));
        }
        Ok(client)
    }
}

#[async_trait]
impl OidcStorage for BackingStore {
    async fn get_client_by_client_id(&self, client_id: &str) -> Result<Client> {
        self.clients.lookup(client_id).await
    }

    async fn authorize_client_id_secret(&self, client_id: &str, client_secret: &str) -> Result<()> {
        match self.clients.authorize(client_id, client_secret).await {
            Err(StorageError::NotFound(Entity::Client)) => Err(StorageError::InvalidSecret),
            other => other,
        }
    }

    #[instrument(skip(self, request), fields(client_id = %request.client_id), level = "debug")]
    async fn create_auth_request(&self, request: NewAuthRequest, subject: Option<&str>) -> Result<AuthRequest> {
        let client = self.clients.lookup(&request.client_id).await?;
        if !client.redirect_uri_allowed(&request.redirect_uri) {
            warn!(client_id = %client.id, redirect_uri = %request.redirect_uri, "redirect URI not registered");
            return Err(StorageError::InvalidGrant("redirect_uri is not registered for this client".into()));
        }
        self.auth_requests.create(request, subject).await
    }

    async fn auth_request_by_id(&self, id: &str) -> Result<AuthRequest> {
        self.auth_requests.get_by_id(id).await
    }

    async fn auth_request_by_code(&self, code: &str) -> Result<AuthRequest> {
        self.auth_requests.get_by_code(code).await
    }

    async fn save_auth_code(&self, id: &str, code: &str) -> Result<()> {
        self.auth_requests.save_code(id, code).await
    }

    async fn delete_auth_request(&self, id: &str) -> Result<()> {
        match self.auth_requests.delete(id).await {
            Err(StorageError::NotFound(Entity::AuthRequest)) => Ok(()),
            other => other,
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn complete_authentication(&self, id: &str, subject: &str) -> Result<String> {
        self.users.get_by_id(subject).await?;
        let code = random_token()?;
        self.auth_requests.complete(id, subject, &code).await?;
        info!(auth_request_id = %id, subject, "user authenticated");
        Ok(code)
    }

    async fn create_access_token(&self, request: &TokenRequest) -> Result<IssuedToken> {
        match request {
            TokenRequest::AuthCode(auth) => {
                let subject = auth
                    .subject
                    .as_deref()
                    .ok_or_else(|| StorageError::InvalidGrant("auth request has no authenticated subject".into()))?;
                self.tokens.issue_access_token(subject, &auth.client_id, &auth.scopes).await
            }
            TokenRequest::Refresh(refresh) => {
                self.tokens
                    .issue_access_token(&refresh.subject, &refresh.client_id, &refresh.scopes)
                    .await
            }
            TokenRequest::ClientCredentials { client_id, scopes } => {
                self.client_with_grant(client_id, request.grant_type()).await?;
                self.tokens.issue_access_token(client_id, client_id, scopes).await
            }
        }
    }

    async fn create_access_and_refresh_tokens(
        &self,
        request: &TokenRequest,
        current_refresh_token: Option<&str>,
    ) -> Result<TokenPair> {
        match request {
            TokenRequest::AuthCode(auth) => {
                let subject = auth
                    .subject
                    .as_deref()
                    .ok_or_else(|| StorageError::InvalidGrant("auth request has no authenticated subject".into()))?;
                self.tokens
                    .issue_pair(subject, &auth.client_id, &auth.scopes, current_refresh_token)
                    .await
            }
            TokenRequest::Refresh(refresh) => {
                self.tokens
                    .issue_pair(&refresh.subject, &refresh.client_id, &refresh.scopes, current_refresh_token)
                    .await
            }
            TokenRequest::ClientCredentials { .. } => Err(StorageError::Unsupported(
                "client_credentials does not issue refresh tokens".into(),
            )),
        }
    }

    #[instrument(skip(self, code, code_verifier), level = "debug")]
    async fn exchange_code(
        &self,
        client_id: &str,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<TokenPair> {
        let request = self.auth_requests.get_by_code(code).await?;
        if request.client_id != client_id {
            warn!(client_id, auth_request_id = %request.id, "code presented by another client");
            return Err(StorageError::InvalidGrant("code was issued to another client".into()));
        }
        self.client_with_grant(client_id, GrantType::AuthorizationCode).await?;
        if !request.is_done() {
            return Err(StorageError::InvalidGrant("auth request is not completed".into()));
        }
        if let Some(uri) = redirect_uri {
            if uri != request.redirect_uri {
                return Err(StorageError::InvalidGrant("redirect_uri does not match".into()));
            }
        }
        if let Some(challenge) = &request.code_challenge {
            match code_verifier {
                Some(verifier) if verify_code_challenge(challenge, verifier) => {}
                _ => return Err(StorageError::InvalidGrant("PKCE verification failed".into())),
            }
        }
        let subject = request
            .subject
            .clone()
            .ok_or_else(|| StorageError::InvalidGrant("auth request has no authenticated subject".into()))?;

        // Deleting first makes the code single-use: a concurrent exchange loses here.
        self.auth_requests
            .delete(&request.id)
            .await
            .map_err(|_| StorageError::NotFound(Entity::AuthCode))?;
        let pair = self.tokens.issue_pair(&subject, client_id, &request.scopes, None).await?;
        info!(client_id, subject = %subject, "authorization code exchanged");
        Ok(pair)
    }

    #[instrument(skip(self, refresh_token), level = "debug")]
    async fn refresh(&self, client_id: &str, refresh_token: &str) -> Result<TokenPair> {
        self.client_with_grant(client_id, GrantType::RefreshToken).await?;
        let info = self.tokens.refresh_token_info(client_id, refresh_token).await?;
        self.tokens
            .issue_pair(&info.subject, client_id, &info.scopes, Some(refresh_token))
            .await
    }

    async fn token_request_by_refresh_token(&self, refresh_token: &str) -> Result<RefreshTokenRequest> {
        let token = self.tokens.lookup(refresh_token).await?;
        if token.kind != TokenKind::Refresh {
            return Err(StorageError::NotFound(Entity::Token));
        }
        Ok(RefreshTokenRequest {
            refresh_token: token.id,
            subject: token.subject,
            client_id: token.client_id,
            scopes: token.scopes,
        })
    }

    async fn get_refresh_token_info(&self, client_id: &str, refresh_token: &str) -> Result<(String, String)> {
        let info = self.tokens.refresh_token_info(client_id, refresh_token).await?;
        Ok((info.subject, info.token_id))
    }

    async fn terminate_session(&self, subject: &str, client_id: &str) -> Result<()> {
        self.tokens.terminate_session(subject, client_id).await;
        Ok(())
    }

    async fn revoke_token(&self, token: &str, subject: &str, client_id: &str) -> Result<bool> {
        match self.tokens.revoke(token, subject, client_id).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(Entity::Token)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn introspect(&self, token_id: &str) -> Introspection {
        self.tokens.introspect(token_id).await
    }

    async fn userinfo_from_token(&self, token_id: &str) -> Result<Claims> {
        let token = self.tokens.lookup(token_id).await?;
        if token.kind != TokenKind::Access {
            return Err(StorageError::NotFound(Entity::Token));
        }
        self.users.claims_for_scopes(&token.subject, &token.scopes).await
    }

    async fn private_claims_from_scopes(&self, user_id: &str, _client_id: &str, scopes: &[String]) -> Result<Claims> {
        let mut claims = self.users.claims_for_scopes(user_id, scopes).await?;
        // sub is a registered ID token claim, not a private one
        claims.remove("sub");
        Ok(claims)
    }

    async fn validate_jwt_profile_scopes(&self, user_id: &str, scopes: &[String]) -> Result<Vec<String>> {
        self.users.get_by_id(user_id).await?;
        Ok(scopes.to_vec())
    }

    async fn validate_user(&self, username: &str, password: &str) -> Result<String> {
        self.users.authenticate(username, password).await
    }

    async fn get_user_by_subject(&self, subject: &str) -> Result<OidcUser> {
        self.users.get_by_id(subject).await
    }

    async fn signing_key(&self) -> Result<SigningKey> {
        Ok(self.keys.signing_key())
    }

    async fn signature_algorithms(&self) -> Result<Vec<Algorithm>> {
        Ok(vec![self.keys.algorithm()])
    }

    async fn key_set(&self) -> Result<JwkSet> {
        Ok(self.keys.public_key_set())
    }

    async fn key_by_id_and_client_id(&self, key_id: &str, client_id: &str) -> Result<Jwk> {
        self.keys.resolve_public_key(key_id, client_id)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
