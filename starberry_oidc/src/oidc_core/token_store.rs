//! In-memory access/refresh token store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::config::RevocationPolicy;
use super::error::{Entity, Result, StorageError};
use super::oidc_provider::TokenStore;
use super::types::{Introspection, IssuedToken, RefreshTokenInfo, Token, TokenKind, TokenPair};

#[derive(Default)]
struct TokenTables {
    /// token ID -> token, for both kinds. The ID doubles as the opaque token value.
    tokens: HashMap<String, Token>,
    /// refresh token ID -> ID of the access token minted with it
    access_by_refresh: HashMap<String, String>,
}

impl TokenTables {
    fn insert(&mut self, token: Token) {
        self.tokens.insert(token.id.clone(), token);
    }

    /// Removes a refresh token together with the access token minted with it.
    fn remove_refresh_with_access(&mut self, refresh_id: &str) {
        self.tokens.remove(refresh_id);
        if let Some(access_id) = self.access_by_refresh.remove(refresh_id) {
            self.tokens.remove(&access_id);
        }
    }

    fn prune_index(&mut self) {
        let TokenTables { tokens, access_by_refresh } = self;
        access_by_refresh.retain(|refresh_id, access_id| {
            tokens.contains_key(refresh_id) && tokens.contains_key(access_id)
        });
    }
}

/// Token store with one lock over every map, so pair issuance and rotation
/// are observed as a single step.
#[derive(Clone)]
pub struct InMemoryTokenStore {
    tables: Arc<RwLock<TokenTables>>,
    access_lifetime: Duration,
    refresh_lifetime: Duration,
    policy: RevocationPolicy,
}

impl InMemoryTokenStore {
    pub fn new(access_lifetime: Duration, refresh_lifetime: Duration, policy: RevocationPolicy) -> Self {
        Self {
            tables: Arc::new(RwLock::new(TokenTables::default())),
            access_lifetime,
            refresh_lifetime,
            policy,
        }
    }

    fn token(
        &self,
        kind: TokenKind,
        subject: &str,
        client_id: &str,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<Token> {
        let lifetime = match kind {
            TokenKind::Access => self.access_lifetime,
            TokenKind::Refresh => self.refresh_lifetime,
        };
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| StorageError::Config(format!("{:?} token lifetime overflows the clock", kind)))?;
        Ok(Token {
            id: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            client_id: client_id.to_string(),
            scopes: scopes.to_vec(),
            created_at: now,
            expires_at,
            kind,
            refresh_token_id: None,
        })
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    #[instrument(skip(self, scopes), level = "debug")]
    async fn issue_access_token(&self, subject: &str, client_id: &str, scopes: &[String]) -> Result<IssuedToken> {
        let token = self.token(TokenKind::Access, subject, client_id, scopes, Utc::now())?;
        let issued = IssuedToken { id: token.id.clone(), expires_at: token.expires_at };
        self.tables.write().await.insert(token);
        debug!(token_id = %issued.id, "access token issued");
        Ok(issued)
    }

    #[instrument(skip(self, scopes, supersedes), level = "debug")]
    async fn issue_pair(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
        supersedes: Option<&str>,
    ) -> Result<TokenPair> {
        let now = Utc::now();
        let refresh = self.token(TokenKind::Refresh, subject, client_id, scopes, now)?;
        let mut access = self.token(TokenKind::Access, subject, client_id, scopes, now)?;
        access.refresh_token_id = Some(refresh.id.clone());
        let pair = TokenPair {
            access_token_id: access.id.clone(),
            refresh_token_id: refresh.id.clone(),
            expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        };

        let mut tables = self.tables.write().await;
        if let Some(old_id) = supersedes.filter(|id| !id.is_empty()) {
            match tables.tokens.get(old_id) {
                Some(old) if old.kind == TokenKind::Refresh => {
                    if old.client_id != client_id {
                        return Err(StorageError::InvalidGrant("refresh token was issued to another client".into()));
                    }
                    if old.is_expired(now) {
                        return Err(StorageError::Expired(Entity::Token));
                    }
                }
                _ => return Err(StorageError::NotFound(Entity::Token)),
            }
            tables.remove_refresh_with_access(old_id);
            debug!(refresh_token_id = %old_id, "refresh token rotated");
        }
        tables.access_by_refresh.insert(refresh.id.clone(), access.id.clone());
        tables.insert(access);
        tables.insert(refresh);
        debug!(access_token_id = %pair.access_token_id, refresh_token_id = %pair.refresh_token_id, "token pair issued");
        Ok(pair)
    }

    async fn refresh_token_info(&self, client_id: &str, refresh_token: &str) -> Result<RefreshTokenInfo> {
        let tables = self.tables.read().await;
        let token = tables
            .tokens
            .get(refresh_token)
            .filter(|t| t.kind == TokenKind::Refresh)
            .ok_or(StorageError::NotFound(Entity::Token))?;
        if token.client_id != client_id {
            warn!(client_id, "refresh token presented by another client");
            return Err(StorageError::InvalidGrant("refresh token was issued to another client".into()));
        }
        if token.is_expired(Utc::now()) {
            return Err(StorageError::Expired(Entity::Token));
        }
        Ok(RefreshTokenInfo {
            subject: token.subject.clone(),
            token_id: token.id.clone(),
            client_id: token.client_id.clone(),
            scopes: token.scopes.clone(),
        })
    }

    async fn lookup(&self, token_id: &str) -> Result<Token> {
        let tables = self.tables.read().await;
        let token = tables.tokens.get(token_id).ok_or(StorageError::NotFound(Entity::Token))?;
        if token.is_expired(Utc::now()) {
            return Err(StorageError::Expired(Entity::Token));
        }
        Ok(token.clone())
    }

    #[instrument(skip(self, token), level = "debug")]
    async fn revoke(&self, token: &str, subject: &str, client_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let found = tables.tokens.get(token).ok_or(StorageError::NotFound(Entity::Token))?;
        if !client_id.is_empty() && found.client_id != client_id {
            warn!(client_id, "revocation requested by another client");
            return Err(StorageError::InvalidGrant("token was issued to another client".into()));
        }
        if !subject.is_empty() && found.subject != subject {
            return Err(StorageError::InvalidGrant("token belongs to another subject".into()));
        }
        match (found.kind, self.policy) {
            (TokenKind::Refresh, RevocationPolicy::Cascade) => tables.remove_refresh_with_access(token),
            (TokenKind::Refresh, RevocationPolicy::Sever) => {
                tables.tokens.remove(token);
                tables.access_by_refresh.remove(token);
            }
            (TokenKind::Access, _) => {
                tables.tokens.remove(token);
                tables.prune_index();
            }
        }
        debug!(token_id = %token, "token revoked");
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn terminate_session(&self, subject: &str, client_id: &str) -> usize {
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables
            .tokens
            .retain(|_, token| !(token.subject == subject && token.client_id == client_id));
        tables.prune_index();
        let removed = before - tables.tokens.len();
        info!(subject, client_id, removed, "session terminated");
        removed
    }

    async fn introspect(&self, token_id: &str) -> Introspection {
        let tables = self.tables.read().await;
        match tables.tokens.get(token_id) {
            Some(token) if !token.is_expired(Utc::now()) => Introspection::from_token(token),
            _ => Introspection::inactive(),
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        let before = tables.tokens.len();
        tables.tokens.retain(|_, token| !token.is_expired(now));
        tables.prune_index();
        before - tables.tokens.len()
    }
}
