//! In-memory authorization request store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::{Entity, Result, StorageError};
use super::oidc_provider::AuthRequestStore;
use super::types::{AuthRequest, NewAuthRequest, ResponseType};

#[derive(Default)]
struct AuthRequestTables {
    requests: HashMap<String, AuthRequest>,
    /// code -> request ID
    codes: HashMap<String, String>,
}

/// Authorization requests keyed by ID, with a code index.
///
/// Both maps live behind one lock so a code can never point at a request
/// that has already been deleted.
#[derive(Clone)]
pub struct InMemoryAuthRequestStore {
    tables: Arc<RwLock<AuthRequestTables>>,
    lifetime: Duration,
}

impl InMemoryAuthRequestStore {
    /// `lifetime` bounds how long a request may wait for its code exchange.
    pub fn new(lifetime: Duration) -> Self {
        Self {
            tables: Arc::new(RwLock::new(AuthRequestTables::default())),
            lifetime,
        }
    }

    fn is_expired(&self, request: &AuthRequest) -> bool {
        Utc::now() - request.created_at > self.lifetime
    }
}

#[async_trait]
impl AuthRequestStore for InMemoryAuthRequestStore {
    #[instrument(skip(self, request), fields(client_id = %request.client_id), level = "debug")]
    async fn create(&self, request: NewAuthRequest, subject: Option<&str>) -> Result<AuthRequest> {
        let id = Uuid::new_v4().to_string();
        let stored = AuthRequest {
            id: id.clone(),
            created_at: Utc::now(),
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            scopes: request.scopes,
            response_type: request.response_type.unwrap_or(ResponseType::Code),
            response_mode: request.response_mode,
            state: request.state,
            nonce: request.nonce,
            code_challenge: request.code_challenge,
            login_hint: request.login_hint,
            max_age: request.max_age,
            subject: subject.filter(|s| !s.is_empty()).map(str::to_string),
            auth_time: None,
            code: None,
            done: false,
        };
        let mut tables = self.tables.write().await;
        tables.requests.insert(id.clone(), stored.clone());
        debug!(auth_request_id = %id, "auth request created");
        Ok(stored)
    }

    async fn get_by_id(&self, id: &str) -> Result<AuthRequest> {
        let tables = self.tables.read().await;
        tables
            .requests
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound(Entity::AuthRequest))
    }

    async fn get_by_code(&self, code: &str) -> Result<AuthRequest> {
        let tables = self.tables.read().await;
        let request = tables
            .codes
            .get(code)
            .and_then(|id| tables.requests.get(id))
            .ok_or(StorageError::NotFound(Entity::AuthCode))?;
        if self.is_expired(request) {
            return Err(StorageError::Expired(Entity::AuthRequest));
        }
        Ok(request.clone())
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_subject(&self, id: &str, subject: &str) -> Result<()> {
        if subject.is_empty() {
            return Err(StorageError::InvalidGrant("subject cannot be empty".into()));
        }
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .get_mut(id)
            .ok_or(StorageError::NotFound(Entity::AuthRequest))?;
        ensure_unauthenticated(request)?;
        request.subject = Some(subject.to_string());
        request.auth_time = Some(Utc::now());
        Ok(())
    }

    #[instrument(skip(self, code), level = "debug")]
    async fn complete(&self, id: &str, subject: &str, code: &str) -> Result<()> {
        if subject.is_empty() {
            return Err(StorageError::InvalidGrant("subject cannot be empty".into()));
        }
        let mut tables = self.tables.write().await;
        if tables.codes.contains_key(code) {
            return Err(StorageError::AlreadyExists(Entity::AuthCode));
        }
        let request = tables
            .requests
            .get_mut(id)
            .ok_or(StorageError::NotFound(Entity::AuthRequest))?;
        if self.is_expired(request) {
            return Err(StorageError::Expired(Entity::AuthRequest));
        }
        ensure_unauthenticated(request)?;
        request.subject = Some(subject.to_string());
        request.auth_time = Some(Utc::now());
        request.code = Some(code.to_string());
        request.done = true;
        tables.codes.insert(code.to_string(), id.to_string());
        debug!(auth_request_id = %id, "auth request completed");
        Ok(())
    }

    #[instrument(skip(self, code), level = "debug")]
    async fn save_code(&self, id: &str, code: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.codes.contains_key(code) {
            return Err(StorageError::AlreadyExists(Entity::AuthCode));
        }
        let request = tables
            .requests
            .get_mut(id)
            .ok_or(StorageError::NotFound(Entity::AuthRequest))?;
        if request.subject.is_none() {
            return Err(StorageError::InvalidGrant("auth request has no authenticated subject".into()));
        }
        if request.is_done() {
            return Err(StorageError::InvalidGrant("code already issued for auth request".into()));
        }
        request.code = Some(code.to_string());
        request.done = true;
        tables.codes.insert(code.to_string(), id.to_string());
        debug!(auth_request_id = %id, "authorization code issued");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .remove(id)
            .ok_or(StorageError::NotFound(Entity::AuthRequest))?;
        if let Some(code) = request.code {
            tables.codes.remove(&code);
        }
        debug!(auth_request_id = %id, "auth request deleted");
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let lifetime = self.lifetime;
        let mut tables = self.tables.write().await;
        let before = tables.requests.len();
        tables.requests.retain(|_, request| now - request.created_at <= lifetime);
        let AuthRequestTables { requests, codes } = &mut *tables;
        codes.retain(|_, id| requests.contains_key(id));
        before - requests.len()
    }
}

/// A request is authenticated at most once.
fn ensure_unauthenticated(request: &AuthRequest) -> Result<()> {
    if request.is_done() {
        return Err(StorageError::InvalidGrant("auth request already completed".into()));
    }
    if request.auth_time.is_some() {
        return Err(StorageError::InvalidGrant("auth request already authenticated".into()));
    }
    Ok(())
}
