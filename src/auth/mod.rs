//! Authentication module
//!
//! Signs in against the Firebase identity REST API and keeps the ID token
//! fresh. The chat stream handshake carries the ID token as its bearer
//! credential.

pub mod firebase;
pub mod tokens;

use anyhow::Result;
use async_trait::async_trait;

pub use firebase::{login, logout, status, FirebaseCredentials};
pub use tokens::{StoredToken, TokenStore};

/// Identity provider endpoints
pub struct AuthConfig {
    /// Email/password sign-in
    pub sign_in_url: &'static str,
    /// Refresh-token exchange
    pub refresh_url: &'static str,
}

impl AuthConfig {
    pub fn firebase() -> Self {
        Self {
            sign_in_url: "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword",
            refresh_url: "https://securetoken.googleapis.com/v1/token",
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::firebase()
    }
}

/// Source of the bearer credential used to open a chat stream.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fresh_credential(&self) -> Result<String>;
}
