use chrono::Duration;
use starberry_oidc::{
    Entity, InMemoryTokenStore, RevocationPolicy, StorageError, TokenKind, TokenStore,
};

fn scopes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn store(policy: RevocationPolicy) -> InMemoryTokenStore {
    InMemoryTokenStore::new(Duration::hours(1), Duration::days(30), policy)
}

#[tokio::test]
async fn test_issue_access_token() {
    let tokens = store(RevocationPolicy::Cascade);
    let issued = tokens
        .issue_access_token("user1", "demo-client", &scopes(&["openid"]))
        .await
        .unwrap();

    let token = tokens.lookup(&issued.id).await.unwrap();
    assert_eq!(token.kind, TokenKind::Access);
    assert_eq!(token.subject, "user1");
    assert_eq!(token.client_id, "demo-client");
    assert_eq!(token.expires_at, issued.expires_at);
    assert!(token.expires_at > token.created_at);
    assert_eq!(token.refresh_token_id, None);
}

#[tokio::test]
async fn test_overflowing_lifetime_is_an_error() {
    let tokens = InMemoryTokenStore::new(Duration::MAX, Duration::MAX, RevocationPolicy::Cascade);
    assert!(matches!(
        tokens.issue_access_token("user1", "demo-client", &[]).await.unwrap_err(),
        StorageError::Config(_)
    ));
    assert!(matches!(
        tokens.issue_pair("user1", "demo-client", &[], None).await.unwrap_err(),
        StorageError::Config(_)
    ));
    assert!(!tokens.introspect("anything").await.active);
}

#[tokio::test]
async fn test_issue_pair_links_access_to_refresh() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid", "profile"]), None)
        .await
        .unwrap();

    assert_ne!(pair.access_token_id, pair.refresh_token_id);
    assert!(pair.refresh_expires_at > pair.expires_at);

    let access = tokens.lookup(&pair.access_token_id).await.unwrap();
    assert_eq!(access.refresh_token_id.as_deref(), Some(pair.refresh_token_id.as_str()));

    let info = tokens
        .refresh_token_info("demo-client", &pair.refresh_token_id)
        .await
        .unwrap();
    assert_eq!(info.subject, "user1");
    assert_eq!(info.token_id, pair.refresh_token_id);
    assert_eq!(info.scopes, scopes(&["openid", "profile"]));
}

#[tokio::test]
async fn test_rotation_retires_previous_pair() {
    let tokens = store(RevocationPolicy::Cascade);
    let first = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();
    let second = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), Some(&first.refresh_token_id))
        .await
        .unwrap();

    assert!(!tokens.introspect(&first.access_token_id).await.active);
    assert!(!tokens.introspect(&first.refresh_token_id).await.active);
    assert!(tokens.introspect(&second.access_token_id).await.active);
    assert!(tokens.introspect(&second.refresh_token_id).await.active);
    assert_eq!(
        tokens.refresh_token_info("demo-client", &first.refresh_token_id).await.unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );

    // The retired token cannot be rotated again.
    assert_eq!(
        tokens
            .issue_pair("user1", "demo-client", &scopes(&["openid"]), Some(&first.refresh_token_id))
            .await
            .unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
}

#[tokio::test]
async fn test_rotation_rejects_foreign_or_access_tokens() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    assert!(matches!(
        tokens
            .issue_pair("user1", "other-client", &scopes(&["openid"]), Some(&pair.refresh_token_id))
            .await
            .unwrap_err(),
        StorageError::InvalidGrant(_)
    ));
    assert_eq!(
        tokens
            .issue_pair("user1", "demo-client", &scopes(&["openid"]), Some(&pair.access_token_id))
            .await
            .unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
    // Failed rotations leave the original pair intact.
    assert!(tokens.introspect(&pair.refresh_token_id).await.active);
    assert!(tokens.introspect(&pair.access_token_id).await.active);
}

#[tokio::test]
async fn test_refresh_token_info_errors() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    assert!(matches!(
        tokens.refresh_token_info("other-client", &pair.refresh_token_id).await.unwrap_err(),
        StorageError::InvalidGrant(_)
    ));
    assert_eq!(
        tokens.refresh_token_info("demo-client", &pair.access_token_id).await.unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
    assert_eq!(
        tokens.refresh_token_info("demo-client", "bogus").await.unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
}

#[tokio::test]
async fn test_revoke_refresh_cascades_to_access() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    tokens.revoke(&pair.refresh_token_id, "user1", "demo-client").await.unwrap();
    assert!(!tokens.introspect(&pair.refresh_token_id).await.active);
    assert!(!tokens.introspect(&pair.access_token_id).await.active);
}

#[tokio::test]
async fn test_revoke_refresh_severs_pairing() {
    let tokens = store(RevocationPolicy::Sever);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    tokens.revoke(&pair.refresh_token_id, "", "demo-client").await.unwrap();
    assert!(!tokens.introspect(&pair.refresh_token_id).await.active);
    assert!(tokens.introspect(&pair.access_token_id).await.active);
}

#[tokio::test]
async fn test_revoke_access_keeps_refresh() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    tokens.revoke(&pair.access_token_id, "user1", "").await.unwrap();
    assert!(!tokens.introspect(&pair.access_token_id).await.active);
    assert!(tokens.introspect(&pair.refresh_token_id).await.active);

    // The refresh token still rotates even though its access token is gone.
    tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), Some(&pair.refresh_token_id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_revoke_checks_ownership() {
    let tokens = store(RevocationPolicy::Cascade);
    let issued = tokens
        .issue_access_token("user1", "demo-client", &scopes(&["openid"]))
        .await
        .unwrap();

    assert!(matches!(
        tokens.revoke(&issued.id, "user1", "other-client").await.unwrap_err(),
        StorageError::InvalidGrant(_)
    ));
    assert!(matches!(
        tokens.revoke(&issued.id, "admin1", "demo-client").await.unwrap_err(),
        StorageError::InvalidGrant(_)
    ));
    assert_eq!(
        tokens.revoke("missing", "", "").await.unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
    assert!(tokens.introspect(&issued.id).await.active);
}

#[tokio::test]
async fn test_terminate_session_only_touches_that_session() {
    let tokens = store(RevocationPolicy::Cascade);
    let mine = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();
    let standalone = tokens
        .issue_access_token("user1", "demo-client", &scopes(&["openid"]))
        .await
        .unwrap();
    let other_user = tokens
        .issue_pair("admin1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();
    let other_client = tokens
        .issue_access_token("user1", "other-client", &scopes(&["openid"]))
        .await
        .unwrap();

    assert_eq!(tokens.terminate_session("user1", "demo-client").await, 3);
    assert!(!tokens.introspect(&mine.access_token_id).await.active);
    assert!(!tokens.introspect(&mine.refresh_token_id).await.active);
    assert!(!tokens.introspect(&standalone.id).await.active);
    assert!(tokens.introspect(&other_user.access_token_id).await.active);
    assert!(tokens.introspect(&other_client.id).await.active);

    assert_eq!(tokens.terminate_session("user1", "demo-client").await, 0);
}

#[tokio::test]
async fn test_introspection_fields() {
    let tokens = store(RevocationPolicy::Cascade);
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid", "email"]), None)
        .await
        .unwrap();

    let active = tokens.introspect(&pair.access_token_id).await;
    assert!(active.active);
    assert_eq!(active.subject.as_deref(), Some("user1"));
    assert_eq!(active.client_id.as_deref(), Some("demo-client"));
    assert_eq!(active.scopes, scopes(&["openid", "email"]));
    assert_eq!(active.expires_at, Some(pair.expires_at));
    assert_eq!(active.token_type, Some(TokenKind::Access));

    let body = serde_json::to_value(&active).unwrap();
    assert_eq!(body["active"], true);
    assert_eq!(body["sub"], "user1");
    assert_eq!(body["exp"], pair.expires_at.timestamp());

    let unknown = tokens.introspect("never-issued").await;
    assert!(!unknown.active);
    assert_eq!(unknown.subject, None);
    assert_eq!(serde_json::to_value(&unknown).unwrap(), serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn test_expired_tokens() {
    let tokens = InMemoryTokenStore::new(
        Duration::milliseconds(40),
        Duration::milliseconds(40),
        RevocationPolicy::Cascade,
    );
    let pair = tokens
        .issue_pair("user1", "demo-client", &scopes(&["openid"]), None)
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(!tokens.introspect(&pair.access_token_id).await.active);
    assert_eq!(
        tokens.lookup(&pair.access_token_id).await.unwrap_err(),
        StorageError::Expired(Entity::Token)
    );
    assert_eq!(
        tokens.refresh_token_info("demo-client", &pair.refresh_token_id).await.unwrap_err(),
        StorageError::Expired(Entity::Token)
    );
    assert_eq!(
        tokens
            .issue_pair("user1", "demo-client", &scopes(&["openid"]), Some(&pair.refresh_token_id))
            .await
            .unwrap_err(),
        StorageError::Expired(Entity::Token)
    );

    assert_eq!(tokens.purge_expired().await, 2);
    assert_eq!(
        tokens.lookup(&pair.access_token_id).await.unwrap_err(),
        StorageError::NotFound(Entity::Token)
    );
}
