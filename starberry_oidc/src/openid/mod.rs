#![cfg(feature = "openid")]
//! OpenID Connect provider metadata published at `/.well-known/openid-configuration`.

pub mod discovery;

pub use discovery::DiscoveryDocument;
