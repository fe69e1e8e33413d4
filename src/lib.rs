//! Issuance and validation of bearer credentials.
//!
//! Two credential kinds, API keys (`ok1-…`) and MCP tokens (`mt1-…`), share
//! one engine: [`manager::CredentialManager`] composes the token codec, the
//! secret generator, the Argon2id hasher and a [`store::CredentialStore`].

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod scope;
pub mod secret;
pub mod store;
pub mod token;

pub use errors::{CredentialError, PublicError};
pub use manager::{
    ApiKeyManager, CredentialAdmin, CredentialManager, IssuedCredential, McpTokenManager,
};
