use jsonwebtoken::Algorithm;
use starberry_oidc::{
    BackingStore, Entity, IdTokenClaims, JwtIssuer, KeyManager, OidcConfig, OidcStorage, StorageError,
};

#[tokio::test]
async fn test_key_set_matches_signing_key() {
    let keys = KeyManager::generate().unwrap();
    let signing = keys.signing_key();
    let set = keys.public_key_set();

    assert_eq!(set.keys.len(), 1);
    let jwk = &set.keys[0];
    assert_eq!(jwk.kid, signing.key_id);
    assert_eq!(jwk.kid, keys.key_id());
    assert_eq!(jwk.kty, "EC");
    assert_eq!(jwk.crv, "P-256");
    assert_eq!(jwk.alg, "ES256");
    assert_eq!(jwk.use_, "sig");
    assert_eq!(signing.algorithm, Algorithm::ES256);

    // The signing key never changes for the lifetime of the manager.
    assert_eq!(keys.signing_key().key_id, signing.key_id);
    assert_eq!(keys.public_key_set(), set);

    let body = serde_json::to_value(&set).unwrap();
    assert_eq!(body["keys"][0]["use"], "sig");
    assert!(body["keys"][0]["x"].as_str().is_some_and(|x| !x.is_empty()));
}

#[tokio::test]
async fn test_separate_managers_have_separate_keys() {
    let a = KeyManager::generate().unwrap();
    let b = KeyManager::generate().unwrap();
    assert_ne!(a.key_id(), b.key_id());
    assert_ne!(a.public_key_set().keys[0].x, b.public_key_set().keys[0].x);
}

#[tokio::test]
async fn test_resolve_public_key() {
    let keys = KeyManager::generate().unwrap();
    let jwk = keys.resolve_public_key(keys.key_id(), "demo-client").unwrap();
    assert_eq!(jwk.kid, keys.key_id());
    assert_eq!(
        keys.resolve_public_key("other-kid", "demo-client").unwrap_err(),
        StorageError::NotFound(Entity::SigningKey)
    );
}

#[tokio::test]
async fn test_sign_and_verify_id_token() {
    let keys = KeyManager::generate().unwrap();
    let issuer = JwtIssuer::new("https://id.example.com");
    let now = chrono::Utc::now();
    let mut claims = IdTokenClaims::new(
        issuer.issuer(),
        "user1",
        "demo-client",
        now,
        now + chrono::Duration::hours(1),
    );
    claims.nonce = Some("abc".to_string());
    claims.extra.insert("role".to_string(), serde_json::json!("user"));

    let token = issuer.sign(&keys, &claims).unwrap();
    let header = jsonwebtoken::decode_header(&token).unwrap();
    assert_eq!(header.kid.as_deref(), Some(keys.key_id()));
    assert_eq!(header.alg, Algorithm::ES256);

    let verified = issuer.verify(&keys, &token, "demo-client").unwrap();
    assert_eq!(verified, claims);

    assert!(matches!(
        issuer.verify(&keys, &token, "other-client").unwrap_err(),
        StorageError::Crypto(_)
    ));
    let other_keys = KeyManager::generate().unwrap();
    assert_eq!(
        issuer.verify(&other_keys, &token, "demo-client").unwrap_err(),
        StorageError::NotFound(Entity::SigningKey)
    );
    let other_issuer = JwtIssuer::new("https://elsewhere.example.com");
    assert!(other_issuer.verify(&keys, &token, "demo-client").is_err());
}

#[tokio::test]
async fn test_facade_key_operations() {
    let store = BackingStore::new(OidcConfig::demo().unwrap()).unwrap();

    let signing = store.signing_key().await.unwrap();
    let set = store.key_set().await.unwrap();
    assert_eq!(set.keys[0].kid, signing.key_id);
    assert_eq!(store.signature_algorithms().await.unwrap(), vec![Algorithm::ES256]);

    let jwk = store.key_by_id_and_client_id(&signing.key_id, "demo-client").await.unwrap();
    assert_eq!(jwk, set.keys[0]);
    assert_eq!(
        store.key_by_id_and_client_id("unknown", "demo-client").await.unwrap_err(),
        StorageError::NotFound(Entity::SigningKey)
    );
}
