//! Store configuration and seed records.

use std::env;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::{Result, StorageError};
use super::types::{Client, MAX_LIFETIME_SECS, OidcUser};

const DEMO_SEED: &str = include_str!("../../seed/demo.json");

/// What revoking a refresh token does to the access token minted with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationPolicy {
    /// Delete the paired access token as well, like rotation does.
    Cascade,
    /// Only drop the pairing; the access token lives until it expires.
    Sever,
}

impl std::str::FromStr for RevocationPolicy {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" => Ok(RevocationPolicy::Cascade),
            "sever" => Ok(RevocationPolicy::Sever),
            other => Err(StorageError::Config(format!("unknown revocation policy `{}`", other))),
        }
    }
}

/// Clients and users loaded into the store at construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub users: Vec<OidcUser>,
}

impl SeedData {
    /// The bundled demo seed: `demo-client` plus two demo users with plain-text passwords.
    pub fn demo() -> Result<Self> {
        Self::from_json_str(DEMO_SEED)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let seed: Self = serde_json::from_str(json)?;
        seed.check_lifetimes()?;
        Ok(seed)
    }

    fn check_lifetimes(&self) -> Result<()> {
        self.clients.iter().try_for_each(Client::check_lifetimes)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("cannot read seed file {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}

/// Backing-store configuration.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    /// How long an authorization request may wait for its code exchange.
    pub auth_request_lifetime: Duration,
    pub id_token_lifetime: Duration,
    pub revocation_policy: RevocationPolicy,
    pub seed: SeedData,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(30),
            auth_request_lifetime: Duration::minutes(10),
            id_token_lifetime: Duration::hours(1),
            revocation_policy: RevocationPolicy::Cascade,
            seed: SeedData::default(),
        }
    }
}

fn env_seconds(key: &str) -> Result<Option<Duration>> {
    match env::var(key) {
        Ok(raw) => {
            let secs: i64 = raw
                .trim()
                .parse()
                .map_err(|_| StorageError::Config(format!("{} must be a number of seconds, got `{}`", key, raw)))?;
            if secs <= 0 {
                return Err(StorageError::Config(format!("{} must be positive", key)));
            }
            Duration::try_seconds(secs)
                .filter(|_| secs <= MAX_LIFETIME_SECS)
                .map(Some)
                .ok_or_else(|| StorageError::Config(format!("{} must not exceed {} seconds", key, MAX_LIFETIME_SECS)))
        }
        Err(_) => Ok(None),
    }
}

impl OidcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the bundled demo seed.
    pub fn demo() -> Result<Self> {
        Ok(Self::default().seed(SeedData::demo()?))
    }

    /// Reads `OIDC_*` environment variables on top of the defaults.
    ///
    /// Without `OIDC_SEED_FILE` the demo seed is used.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(issuer) = env::var("OIDC_ISSUER") {
            if !issuer.trim().is_empty() {
                config.issuer = issuer.trim().to_string();
            }
        }
        if let Some(ttl) = env_seconds("OIDC_ACCESS_TOKEN_TTL_SECS")? {
            config.access_token_lifetime = ttl;
        }
        if let Some(ttl) = env_seconds("OIDC_REFRESH_TOKEN_TTL_SECS")? {
            config.refresh_token_lifetime = ttl;
        }
        if let Some(ttl) = env_seconds("OIDC_AUTH_REQUEST_TTL_SECS")? {
            config.auth_request_lifetime = ttl;
        }
        if let Some(ttl) = env_seconds("OIDC_ID_TOKEN_TTL_SECS")? {
            config.id_token_lifetime = ttl;
        }
        if let Ok(policy) = env::var("OIDC_REVOCATION_POLICY") {
            config.revocation_policy = policy.parse()?;
        }
        config.seed = match env::var("OIDC_SEED_FILE") {
            Ok(path) => SeedData::from_file(path)?,
            Err(_) => SeedData::demo()?,
        };
        Ok(config)
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    pub fn refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    pub fn auth_request_lifetime(mut self, lifetime: Duration) -> Self {
        self.auth_request_lifetime = lifetime;
        self
    }

    pub fn id_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.id_token_lifetime = lifetime;
        self
    }

    pub fn revocation_policy(mut self, policy: RevocationPolicy) -> Self {
        self.revocation_policy = policy;
        self
    }

    pub fn seed(mut self, seed: SeedData) -> Self {
        self.seed = seed;
        self
    }

    /// Lifetimes must be positive so every token expires strictly after it was issued,
    /// and bounded so expiry timestamps stay representable.
    pub fn validate(&self) -> Result<()> {
        let lifetimes = [
            ("access_token_lifetime", self.access_token_lifetime),
            ("refresh_token_lifetime", self.refresh_token_lifetime),
            ("auth_request_lifetime", self.auth_request_lifetime),
            ("id_token_lifetime", self.id_token_lifetime),
        ];
        for (name, lifetime) in lifetimes {
            if lifetime <= Duration::zero() {
                return Err(StorageError::Config(format!("{} must be positive", name)));
            }
            if lifetime.num_seconds() > MAX_LIFETIME_SECS {
                return Err(StorageError::Config(format!(
                    "{} must not exceed {} seconds",
                    name, MAX_LIFETIME_SECS
                )));
            }
        }
        self.seed.check_lifetimes()?;
        if self.issuer.is_empty() {
            return Err(StorageError::Config("issuer cannot be empty".into()));
        }
        Ok(())
    }
}
