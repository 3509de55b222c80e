use std::sync::Arc;

use starberry_oidc::{BackingStore, Entity, NewAuthRequest, OidcConfig, OidcStorage, StorageError};

fn demo_store() -> Arc<BackingStore> {
    Arc::new(BackingStore::new(OidcConfig::demo().unwrap()).unwrap())
}

async fn issue_code(store: &BackingStore) -> String {
    let request = NewAuthRequest {
        client_id: "demo-client".to_string(),
        redirect_uri: "http://localhost:8080/callback".to_string(),
        scopes: vec!["openid".to_string()],
        ..Default::default()
    };
    let created = store.create_auth_request(request, None).await.unwrap();
    store.complete_authentication(&created.id, "user1").await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_has_one_winner() {
    for _ in 0..20 {
        let store = demo_store();
        let code = issue_code(&store).await;
        let pair = store.exchange_code("demo-client", &code, None, None).await.unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let refresh = pair.refresh_token_id.clone();
                tokio::spawn(async move { store.refresh("demo-client", &refresh).await })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(new_pair) => winners.push(new_pair),
                Err(err) => assert_eq!(err, StorageError::NotFound(Entity::Token)),
            }
        }
        assert_eq!(winners.len(), 1);
        assert!(store.introspect(&winners[0].access_token_id).await.active);
        assert!(!store.introspect(&pair.access_token_id).await.active);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_code_exchange_has_one_winner() {
    for _ in 0..20 {
        let store = demo_store();
        let code = issue_code(&store).await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let code = code.clone();
                tokio::spawn(async move { store.exchange_code("demo-client", &code, None, None).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(err) => assert_eq!(err, StorageError::NotFound(Entity::AuthCode)),
            }
        }
        assert_eq!(successes, 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_logins_bind_one_subject() {
    for _ in 0..20 {
        let store = demo_store();
        let request = NewAuthRequest {
            client_id: "demo-client".to_string(),
            redirect_uri: "http://localhost:8080/callback".to_string(),
            scopes: vec!["openid".to_string()],
            ..Default::default()
        };
        let created = store.create_auth_request(request, None).await.unwrap();

        let handles: Vec<_> = ["user1", "admin1"]
            .into_iter()
            .map(|subject| {
                let store = store.clone();
                let id = created.id.clone();
                tokio::spawn(async move { (subject, store.complete_authentication(&id, subject).await) })
            })
            .collect();

        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                (subject, Ok(code)) => winners.push((subject, code)),
                (_, Err(err)) => assert!(matches!(err, StorageError::InvalidGrant(_))),
            }
        }
        assert_eq!(winners.len(), 1);
        let (subject, code) = &winners[0];
        let bound = store.auth_request_by_code(code).await.unwrap();
        assert_eq!(bound.subject.as_deref(), Some(*subject));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_issuance_yields_unique_tokens() {
    let store = demo_store();
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let code = issue_code(&store).await;
                store.exchange_code("demo-client", &code, None, None).await.unwrap()
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        let pair = handle.await.unwrap();
        assert!(ids.insert(pair.access_token_id));
        assert!(ids.insert(pair.refresh_token_id));
    }
    assert_eq!(ids.len(), 64);
}
