use starberry_oidc::{Entity, StorageError};

#[tokio::test]
async fn test_storage_error_codes() {
    let cases = vec![
        (StorageError::NotFound(Entity::Client), "invalid_client", "client not found"),
        (StorageError::InvalidSecret, "invalid_client", "invalid client secret"),
        (StorageError::NotFound(Entity::AuthCode), "invalid_grant", "authorization code not found"),
        (StorageError::NotFound(Entity::AuthRequest), "invalid_grant", "auth request not found"),
        (StorageError::NotFound(Entity::Token), "invalid_token", "token not found"),
        (StorageError::Expired(Entity::Token), "invalid_token", "token expired"),
        (StorageError::Expired(Entity::AuthRequest), "invalid_grant", "auth request expired"),
        (StorageError::NotFound(Entity::User), "invalid_request", "user not found"),
        (StorageError::InvalidCredentials, "access_denied", "invalid credentials"),
        (StorageError::AlreadyExists(Entity::User), "invalid_request", "user already exists"),
        (
            StorageError::InvalidGrant("PKCE verification failed".into()),
            "invalid_grant",
            "invalid grant: PKCE verification failed",
        ),
        (
            StorageError::Unsupported("client_credentials".into()),
            "unsupported_grant_type",
            "unsupported token request: client_credentials",
        ),
        (StorageError::Config("bad seed".into()), "server_error", "configuration error: bad seed"),
        (StorageError::Crypto("rng".into()), "server_error", "crypto error: rng"),
    ];

    for (err, expected_code, expected_desc) in cases {
        assert_eq!(err.error_code(), expected_code, "code for {:?}", err);
        assert_eq!(err.to_string(), expected_desc);

        let body = err.to_json();
        assert_eq!(body["error"], expected_code);
        assert_eq!(body["error_description"], expected_desc);
        assert_eq!(body.as_object().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn test_storage_error_is_std_error() {
    let err: Box<dyn std::error::Error + Send + Sync> = Box::new(StorageError::NotFound(Entity::SigningKey));
    assert_eq!(err.to_string(), "signing key not found");
}

#[tokio::test]
async fn test_conversions() {
    let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    assert!(matches!(StorageError::from(parse), StorageError::Config(_)));

    let jwt = jsonwebtoken::decode_header("not-a-jwt").unwrap_err();
    assert!(matches!(StorageError::from(jwt), StorageError::Crypto(_)));
}
