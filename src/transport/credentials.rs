//! transport::credentials
//!
//! Opaque identity/secret pairs handed to the transport.
//!
//! # Security
//!
//! - `Credentials` implements a redacting `Debug`; neither half is printed
//! - Nothing in this crate logs credentials or puts them in error messages
//! - The sync core passes credentials through without inspecting them

use std::fmt;

use thiserror::Error;

/// Environment variable holding the identity for [`EnvCredentials`].
pub const USERNAME_ENV: &str = "TREESYNC_USERNAME";

/// Environment variable holding the secret for [`EnvCredentials`].
pub const TOKEN_ENV: &str = "TREESYNC_TOKEN";

/// Errors from credential sources.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The source is only partly configured.
    #[error("incomplete credentials: {0}")]
    Incomplete(String),
}

/// An `(identity, secret)` pair.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    identity: String,
    secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// No identity and no secret.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_empty() && self.secret.is_empty()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Supplies credentials for a remote.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    fn credentials(&self, remote: &str) -> Result<Credentials, CredentialError>;
}

/// The same credentials for every remote.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self, _remote: &str) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}

/// Credentials read from `TREESYNC_USERNAME` / `TREESYNC_TOKEN` at call time.
///
/// Neither variable set means anonymous access; only one set is an error.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn credentials(&self, _remote: &str) -> Result<Credentials, CredentialError> {
        let username = std::env::var(USERNAME_ENV).ok().filter(|v| !v.is_empty());
        let token = std::env::var(TOKEN_ENV).ok().filter(|v| !v.is_empty());
        match (username, token) {
            (Some(username), Some(token)) => Ok(Credentials::new(username, token)),
            (None, None) => Ok(Credentials::anonymous()),
            (Some(_), None) => Err(CredentialError::Incomplete(format!("{TOKEN_ENV} is not set"))),
            (None, Some(_)) => Err(CredentialError::Incomplete(format!(
                "{USERNAME_ENV} is not set"
            ))),
        }
    }
}
