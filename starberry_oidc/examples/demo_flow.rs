//! Walks the demo client through login, code exchange, refresh and revocation.
//! Run with: `RUST_LOG=debug cargo run --example demo_flow`

use std::sync::Arc;
use std::time::Duration;

use starberry_oidc::openid::DiscoveryDocument;
use starberry_oidc::{BackingStore, NewAuthRequest, OidcConfig, OidcStorage};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(BackingStore::new(OidcConfig::from_env()?)?);
    let _sweeper = store.spawn_sweeper(Duration::from_secs(60));

    let discovery = DiscoveryDocument::for_store(&store);
    println!("discovery: {}", serde_json::to_string_pretty(&discovery)?);
    println!("jwks: {}", serde_json::to_string_pretty(&store.key_set().await?)?);

    // Authorize + login
    let request = store
        .create_auth_request(
            NewAuthRequest {
                client_id: "demo-client".into(),
                redirect_uri: "http://localhost:8080/callback".into(),
                scopes: vec!["openid".into(), "profile".into(), "email".into()],
                state: "demo-state".into(),
                nonce: "demo-nonce".into(),
                ..Default::default()
            },
            None,
        )
        .await?;
    let client = store.get_client_by_client_id(&request.client_id).await?;
    println!("login page: {}", client.login_url(&request.id));

    let subject = store.validate_user("demo@example.com", "password123").await?;
    let code = store.complete_authentication(&request.id, &subject).await?;

    // Token endpoint
    store.authorize_client_id_secret("demo-client", "demo-secret").await?;
    let completed = store.auth_request_by_code(&code).await?;
    let id_token = store.id_token_for_request(&completed).await?;
    let pair = store
        .exchange_code("demo-client", &code, Some("http://localhost:8080/callback"), None)
        .await?;
    println!("access token: {}", pair.access_token_id);
    println!("id token: {}", id_token);

    let userinfo = store.userinfo_from_token(&pair.access_token_id).await?;
    println!("userinfo: {}", serde_json::Value::Object(userinfo));

    let rotated = store.refresh("demo-client", &pair.refresh_token_id).await?;
    println!(
        "old access active: {}, new access active: {}",
        store.introspect(&pair.access_token_id).await.active,
        store.introspect(&rotated.access_token_id).await.active
    );

    let revoked = store
        .revoke_token(&rotated.refresh_token_id, &subject, "demo-client")
        .await?;
    println!("refresh token revoked: {}", revoked);
    println!(
        "introspection after revoke: {}",
        serde_json::to_string(&store.introspect(&rotated.access_token_id).await)?
    );
    Ok(())
}
