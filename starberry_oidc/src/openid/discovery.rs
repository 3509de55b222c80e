use serde::{Deserialize, Serialize};

use crate::oidc_core::backing_store::BackingStore;
use crate::oidc_core::types::DEFAULT_SCOPES;

/// Claims the user store can release, across all scopes.
const SUPPORTED_CLAIMS: [&str; 8] = [
    "sub",
    "name",
    "given_name",
    "family_name",
    "preferred_username",
    "locale",
    "email",
    "email_verified",
];

/// Body of `/.well-known/openid-configuration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub revocation_endpoint: String,
    pub introspection_endpoint: String,
    pub end_session_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl DiscoveryDocument {
    /// Metadata for `issuer` with endpoints at their conventional paths.
    pub fn new(issuer: &str, signing_algorithm: jsonwebtoken::Algorithm) -> Self {
        let base = issuer.trim_end_matches('/');
        let endpoint = |path: &str| format!("{}{}", base, path);
        Self {
            issuer: base.to_string(),
            authorization_endpoint: endpoint("/authorize"),
            token_endpoint: endpoint("/oauth/token"),
            userinfo_endpoint: endpoint("/userinfo"),
            jwks_uri: endpoint("/keys"),
            revocation_endpoint: endpoint("/revoke"),
            introspection_endpoint: endpoint("/oauth/introspect"),
            end_session_endpoint: endpoint("/end_session"),
            scopes_supported: strings(&DEFAULT_SCOPES),
            response_types_supported: strings(&["code", "id_token", "id_token token"]),
            grant_types_supported: strings(&[
                "authorization_code",
                "refresh_token",
                "client_credentials",
                "urn:ietf:params:oauth:grant-type:jwt-bearer",
            ]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: vec![format!("{:?}", signing_algorithm)],
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
                "none",
                "private_key_jwt",
            ]),
            code_challenge_methods_supported: strings(&["S256", "plain"]),
            claims_supported: strings(&SUPPORTED_CLAIMS),
        }
    }

    pub fn for_store(store: &BackingStore) -> Self {
        Self::new(store.issuer(), store.keys().algorithm())
    }
}
