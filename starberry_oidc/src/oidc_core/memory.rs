//! In-memory client registry and user store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::error::{Entity, Result, StorageError};
use super::oidc_provider::{ClientStore, UserStore};
use super::types::{Claims, Client, OidcUser, SCOPE_EMAIL, SCOPE_PROFILE};

#[derive(Clone, Debug, Default)]
pub struct InMemoryClientStore {
    clients: Arc<DashMap<String, Client>>,
}

impl InMemoryClientStore {
    /// Creates a new in-memory client store with an initial set of clients.
    ///
    /// Clients without an ID get a generated one; duplicate IDs are rejected.
    pub fn new(initial_clients: Vec<Client>) -> Result<Self> {
        let store = Self::default();
        for client in initial_clients {
            store.insert(client)?;
        }
        Ok(store)
    }

    fn insert(&self, mut client: Client) -> Result<String> {
        client.check_lifetimes()?;
        if client.id.is_empty() {
            client.id = Uuid::new_v4().to_string();
        }
        let id = client.id.clone();
        match self.clients.entry(id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(Entity::Client)),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(id)
            }
        }
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn lookup(&self, client_id: &str) -> Result<Client> {
        self.clients
            .get(client_id)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::NotFound(Entity::Client))
    }

    #[instrument(skip(self, secret), level = "debug")]
    async fn authorize(&self, client_id: &str, secret: &str) -> Result<()> {
        let client = self.clients.get(client_id).ok_or(StorageError::NotFound(Entity::Client))?;
        match client.secret.as_deref() {
            Some(expected) if expected == secret => Ok(()),
            _ => {
                warn!(client_id, "client secret rejected");
                Err(StorageError::InvalidSecret)
            }
        }
    }

    #[instrument(skip(self, client), fields(client_id = %client.id), level = "debug")]
    async fn register(&self, client: Client) -> Result<String> {
        let id = self.insert(client)?;
        debug!(client_id = %id, "client registered");
        Ok(id)
    }

    async fn update(&self, client: Client) -> Result<()> {
        client.check_lifetimes()?;
        match self.clients.get_mut(&client.id) {
            Some(mut existing) => {
                *existing = client;
                Ok(())
            }
            None => Err(StorageError::NotFound(Entity::Client)),
        }
    }

    async fn delete(&self, client_id: &str) -> Result<()> {
        self.clients
            .remove(client_id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(Entity::Client))
    }

    async fn list(&self) -> Result<Vec<Client>> {
        Ok(self.clients.iter().map(|entry| entry.value().clone()).collect())
    }
}

/// Demo user store. Passwords are compared in plain text.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<DashMap<String, OidcUser>>,
}

impl InMemoryUserStore {
    pub fn new(initial_users: Vec<OidcUser>) -> Result<Self> {
        let store = Self::default();
        for user in initial_users {
            store.insert(user)?;
        }
        Ok(store)
    }

    fn insert(&self, user: OidcUser) -> Result<()> {
        if user.id.is_empty() {
            return Err(StorageError::Config("user ID cannot be empty".into()));
        }
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(Entity::User)),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    fn user(&self, user_id: &str) -> Result<OidcUser> {
        self.users
            .get(user_id)
            .map(|entry| entry.value().clone())
            .ok_or(StorageError::NotFound(Entity::User))
    }
}

fn profile_claims(user: &OidcUser, claims: &mut Claims) {
    claims.insert("name".into(), Value::from(user.name()));
    claims.insert("given_name".into(), Value::from(user.given_name.clone()));
    claims.insert("family_name".into(), Value::from(user.family_name.clone()));
    claims.insert("preferred_username".into(), Value::from(user.preferred_username.clone()));
    claims.insert("locale".into(), Value::from(user.locale.clone()));
}

fn email_claims(user: &OidcUser, claims: &mut Claims) {
    claims.insert("email".into(), Value::from(user.email.clone()));
    claims.insert("email_verified".into(), Value::from(user.email_verified));
}

const PROFILE_CLAIMS: [&str; 5] = ["name", "given_name", "family_name", "preferred_username", "locale"];
const EMAIL_CLAIMS: [&str; 2] = ["email", "email_verified"];

/// Merges the user's custom claims over the standard ones.
///
/// `sub` always stays the user ID, and a custom claim named like a profile
/// or email claim only passes when that scope was granted.
fn merge_custom_claims(user: OidcUser, profile: bool, email: bool, claims: &mut Claims) {
    for (key, value) in user.claims {
        let name = key.as_str();
        if name == "sub"
            || (!profile && PROFILE_CLAIMS.contains(&name))
            || (!email && EMAIL_CLAIMS.contains(&name))
        {
            continue;
        }
        claims.insert(key, value);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    #[instrument(skip(self, password), level = "debug")]
    async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let found = self
            .users
            .iter()
            .find(|entry| entry.username == username && entry.password == password)
            .map(|entry| entry.id.clone());
        match found {
            Some(id) => Ok(id),
            None => {
                warn!(username, "authentication failed");
                Err(StorageError::InvalidCredentials)
            }
        }
    }

    async fn get_by_id(&self, user_id: &str) -> Result<OidcUser> {
        self.user(user_id)
    }

    async fn claims_for_scopes(&self, user_id: &str, scopes: &[String]) -> Result<Claims> {
        let user = self.user(user_id)?;
        let mut claims = Claims::new();
        claims.insert("sub".into(), Value::from(user.id.clone()));
        let profile = scopes.iter().any(|s| s == SCOPE_PROFILE);
        let email = scopes.iter().any(|s| s == SCOPE_EMAIL);
        if profile {
            profile_claims(&user, &mut claims);
        }
        if email {
            email_claims(&user, &mut claims);
        }
        merge_custom_claims(user, profile, email, &mut claims);
        Ok(claims)
    }

    async fn full_userinfo(&self, user_id: &str) -> Result<Claims> {
        let user = self.user(user_id)?;
        let mut claims = Claims::new();
        claims.insert("sub".into(), Value::from(user.id.clone()));
        profile_claims(&user, &mut claims);
        email_claims(&user, &mut claims);
        merge_custom_claims(user, true, true, &mut claims);
        Ok(claims)
    }

    async fn create(&self, user: OidcUser) -> Result<()> {
        let id = user.id.clone();
        self.insert(user)?;
        debug!(user_id = %id, "user created");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<OidcUser>> {
        Ok(self.users.iter().map(|entry| entry.value().clone()).collect())
    }
}
