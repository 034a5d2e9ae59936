//! Authentication and authorization for shelf: the credential table, signed
//! tokens, and the request guards built on them.

pub mod access;
pub mod credentials;
pub mod role;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shelf_kernel::settings::AuthSettings;

pub use access::{authorize, require_token, AccessControl, AuthzError};
pub use credentials::{CredentialVerifier, StaticCredentials};
pub use role::{Identity, Role};
pub use token::{Claims, Clock, IssuedToken, SystemClock, TokenError, TokenService};

/// Everything the auth surface needs, built once from settings.
#[derive(Clone)]
pub struct AuthContext {
    pub credentials: Arc<dyn CredentialVerifier>,
    pub access: AccessControl,
}

impl AuthContext {
    pub fn from_settings(settings: &AuthSettings) -> anyhow::Result<Self> {
        let credentials = StaticCredentials::from_settings(&settings.users)
            .context("invalid auth.users configuration")?;
        let tokens = TokenService::new(
            settings.jwt_secret.as_bytes(),
            Duration::from_secs(settings.token_ttl_secs),
        )
        .context("unable to build token signer")?;

        Ok(Self {
            credentials: Arc::new(credentials),
            access: AccessControl::new(Arc::new(tokens)),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        self.access.tokens()
    }
}
