//! core::config::schema
//!
//! Serde types for both config files. Unknown keys are rejected, and values
//! are checked after parsing so a name that would make an invalid ref never
//! reaches the ref store.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::{BranchName, RefName};
use crate::store::object::Signature;

fn invalid(what: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue(format!("invalid {what}: {err}"))
}

/// User-scope settings.
///
/// ```toml
/// [author]
/// name = "Ada"
/// email = "ada@example.com"
///
/// [diff]
/// detect_renames = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    pub author: Option<AuthorConfig>,
    pub diff: Option<DiffConfig>,
}

impl GlobalConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an identity that cannot be
    /// recorded on a commit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.author.as_ref().map_or(Ok(()), AuthorConfig::validate)
    }
}

/// Repository-scope settings.
///
/// ```toml
/// remote = "origin"
/// branch = "master"
/// remote_url = "local://origin"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Remote that `sync` pushes to
    pub remote: Option<String>,

    /// Branch that receives commits and is pushed
    pub branch: Option<String>,

    /// Where `list_remote_branches` looks when no URL is given
    pub remote_url: Option<String>,

    pub author: Option<AuthorConfig>,

    pub diff: Option<DiffConfig>,
}

impl RepoConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the branch is not a valid
    /// branch name, the remote cannot form `refs/remotes/<remote>/<branch>`,
    /// or the identity cannot be recorded on a commit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let branch = match &self.branch {
            Some(name) => BranchName::new(name.as_str()).map_err(|e| invalid("branch name", e))?,
            None => BranchName::default(),
        };
        if let Some(remote) = &self.remote {
            RefName::for_remote_branch(remote, &branch).map_err(|e| invalid("remote name", e))?;
        }
        self.author.as_ref().map_or(Ok(()), AuthorConfig::validate)
    }
}

/// Commit identity; name and email are set independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl AuthorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        Signature::validate_identity(
            self.name.as_deref().unwrap_or("x"),
            self.email.as_deref().unwrap_or("x"),
        )
        .map_err(|e| invalid("author", e))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiffConfig {
    /// Report same-content delete/add pairs as renames
    pub detect_renames: Option<bool>,
}
