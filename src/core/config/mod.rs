//! core::config
//!
//! TOML configuration with two scopes.
//!
//! The global file holds per-user identity and diff defaults. The first of
//! these that exists is used:
//!
//! 1. `$TREESYNC_CONFIG`
//! 2. `$XDG_CONFIG_HOME/treesync/config.toml`
//! 3. `~/.treesync/config.toml`
//!
//! The repository file `<root>/.treesync/config.toml` names the remote and
//! branch and may override anything global. Accessors on [`Config`] resolve
//! each key as repo, then global, then the built-in default. Missing files
//! are fine; unreadable, malformed, or invalid ones are errors.
//!
//! # Example
//!
//! ```no_run
//! use treesync::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/worktree"))).unwrap();
//! let config = result.config;
//!
//! println!("Remote: {}", config.remote());
//! println!("Branch: {}", config.branch());
//! ```

pub mod schema;

pub use schema::{AuthorConfig, DiffConfig, GlobalConfig, RepoConfig};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::core::paths::{self, RepoPaths};

/// Environment variable naming an explicit global config file.
pub const CONFIG_ENV: &str = "TREESYNC_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
}

/// Merged configuration from both scopes.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    /// `None` outside a repository or when the repo file is absent.
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    pub const DEFAULT_REMOTE: &'static str = "origin";

    pub const DEFAULT_BRANCH: &'static str = "master";

    /// `(name, email)` used when no identity is configured.
    pub const DEFAULT_AUTHOR: (&'static str, &'static str) = ("treesync", "treesync@localhost");

    /// Build a configuration from already-parsed parts.
    pub fn from_parts(global: GlobalConfig, repo: Option<RepoConfig>) -> Result<Self, ConfigError> {
        Self::validated(global, None, repo, None)
    }

    fn validated(
        global: GlobalConfig,
        global_path: Option<PathBuf>,
        repo: Option<RepoConfig>,
        repo_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        global.validate()?;
        repo.as_ref().map(RepoConfig::validate).transpose()?;
        Ok(Self {
            global,
            repo,
            global_path,
            repo_path,
        })
    }

    /// Load the global file and, given a working tree root, the repo file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed,
    /// or validated.
    pub fn load(worktree_root: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::global_candidates().into_iter().find(|p| p.is_file());
        let global = match &global_path {
            Some(path) => Self::read_toml(path)?,
            None => GlobalConfig::default(),
        };

        let repo_path = worktree_root
            .map(Self::repo_config_path)
            .filter(|p| p.is_file());
        let repo: Option<RepoConfig> = repo_path.as_deref().map(Self::read_toml).transpose()?;

        tracing::debug!(global = ?global_path, repo = ?repo_path, "loaded configuration");
        let config = Self::validated(global, global_path, repo, repo_path)?;
        Ok(ConfigLoadResult { config })
    }

    /// Global config locations in lookup order.
    fn global_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            candidates.push(PathBuf::from(explicit));
        }
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg).join("treesync").join("config.toml"));
        }
        if let Ok(home) = Self::global_config_path() {
            candidates.push(home);
        }
        candidates
    }

    fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// `~/.treesync/config.toml`, where `write_global` writes.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".treesync").join("config.toml"))
    }

    pub fn repo_config_path(worktree_root: &Path) -> PathBuf {
        RepoPaths::new(worktree_root.to_path_buf()).config_path()
    }

    /// Validate and atomically write the global config.
    pub fn write_global(config: &GlobalConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::global_config_path()?;
        Self::write_toml(&path, config)?;
        Ok(path)
    }

    /// Validate and atomically write the repo config.
    pub fn write_repo(worktree_root: &Path, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::repo_config_path(worktree_root);
        Self::write_toml(&path, config)?;
        Ok(path)
    }

    fn write_toml<T: Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
        let text =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        paths::write_atomic(path, text.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn repo_value<'a, T: ?Sized>(&'a self, get: impl Fn(&'a RepoConfig) -> Option<&'a T>) -> Option<&'a T> {
        self.repo.as_ref().and_then(get)
    }

    /// Remote used by `sync`; `origin` by default.
    pub fn remote(&self) -> &str {
        self.repo_value(|r| r.remote.as_deref())
            .unwrap_or(Self::DEFAULT_REMOTE)
    }

    /// Branch that receives commits; `master` by default.
    pub fn branch(&self) -> &str {
        self.repo_value(|r| r.branch.as_deref())
            .unwrap_or(Self::DEFAULT_BRANCH)
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.repo_value(|r| r.remote_url.as_deref())
    }

    /// Commit identity as `(name, email)`.
    ///
    /// Name and email fall back independently.
    pub fn author(&self) -> (&str, &str) {
        let scopes = [
            self.repo_value(|r| r.author.as_ref()),
            self.global.author.as_ref(),
        ];
        let name = scopes
            .into_iter()
            .flatten()
            .find_map(|a| a.name.as_deref())
            .unwrap_or(Self::DEFAULT_AUTHOR.0);
        let email = scopes
            .into_iter()
            .flatten()
            .find_map(|a| a.email.as_deref())
            .unwrap_or(Self::DEFAULT_AUTHOR.1);
        (name, email)
    }

    /// Off unless enabled in either scope; the repo scope wins.
    pub fn detect_renames(&self) -> bool {
        [
            self.repo_value(|r| r.diff.as_ref()),
            self.global.diff.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find_map(|d| d.detect_renames)
        .unwrap_or(false)
    }

    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}
