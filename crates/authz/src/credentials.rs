use std::collections::HashMap;

use shelf_kernel::settings::UserSettings;

use crate::role::{Identity, Role, UnknownRole};

/// Checks a login attempt and resolves the caller's identity.
///
/// Implementations own the secret comparison, so swapping the plaintext
/// table for hashed secrets does not touch token issuing or access checks.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, user_id: &str, secret: &str) -> Option<Identity>;
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("user '{user_id}': {source}")]
    InvalidRole {
        user_id: String,
        #[source]
        source: UnknownRole,
    },
    #[error("user '{0}' is configured more than once")]
    Duplicate(String),
    #[error("user id must not be empty")]
    EmptyUserId,
}

struct Account {
    secret: String,
    role: Role,
}

/// Read-only account table compared in plaintext.
///
/// Secrets are held and compared as given. This mirrors the configured
/// table one to one and is not suitable for real deployments.
pub struct StaticCredentials {
    accounts: HashMap<String, Account>,
}

impl StaticCredentials {
    pub fn from_settings(users: &[UserSettings]) -> Result<Self, CredentialError> {
        let mut accounts = HashMap::with_capacity(users.len());

        for user in users {
            if user.user_id.is_empty() {
                return Err(CredentialError::EmptyUserId);
            }
            let role = user
                .role
                .parse::<Role>()
                .map_err(|source| CredentialError::InvalidRole {
                    user_id: user.user_id.clone(),
                    source,
                })?;
            let account = Account {
                secret: user.secret.clone(),
                role,
            };
            if accounts.insert(user.user_id.clone(), account).is_some() {
                return Err(CredentialError::Duplicate(user.user_id.clone()));
            }
        }

        Ok(Self { accounts })
    }

    /// Identity for a known user, without checking any secret. Only for
    /// minting tokens locally from the CLI.
    pub fn lookup(&self, user_id: &str) -> Option<Identity> {
        self.accounts.get(user_id).map(|account| Identity {
            user_id: user_id.to_string(),
            role: account.role,
        })
    }

    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, user_id: &str, secret: &str) -> Option<Identity> {
        let account = self.accounts.get(user_id)?;
        if account.secret != secret {
            return None;
        }
        Some(Identity {
            user_id: user_id.to_string(),
            role: account.role,
        })
    }
}
