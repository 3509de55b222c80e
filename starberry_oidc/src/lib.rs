pub mod oidc_core;

#[cfg(feature = "openid")]
pub mod openid;

pub use oidc_core::backing_store::{BackingStore, BackingStoreBuilder};
pub use oidc_core::config::{OidcConfig, RevocationPolicy, SeedData};
pub use oidc_core::error::{Entity, StorageError};
pub use oidc_core::jwt::{IdTokenClaims, JwtIssuer};
pub use oidc_core::keys::{Jwk, JwkSet, KeyManager, SigningKey};
pub use oidc_core::memory::{InMemoryClientStore, InMemoryUserStore};
pub use oidc_core::auth_request::InMemoryAuthRequestStore;
pub use oidc_core::token_store::InMemoryTokenStore;
pub use oidc_core::oidc_provider::{AuthRequestStore, ClientStore, OidcStorage, TokenStore, UserStore};
pub use oidc_core::types::{
    AccessTokenType, ApplicationType, AuthMethod, AuthRequest, Claims, Client, CodeChallenge,
    CodeChallengeMethod, GrantType, Introspection, MAX_LIFETIME_SECS, IssuedToken, NewAuthRequest, OidcUser,
    RefreshTokenInfo, RefreshTokenRequest, ResponseMode, ResponseType, Token, TokenKind, TokenPair,
    TokenRequest,
};
