//! Backing store for an OpenID Connect authorization server.

pub mod auth_request;
pub mod backing_store;
pub mod config;
pub mod crypto;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod memory;
pub mod oidc_provider;
pub mod token_store;
pub mod types;
