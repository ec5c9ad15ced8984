//! logging
//!
//! Tracing subscriber setup for embedding applications and tests.
//!
//! The library itself only emits `tracing` events; nothing is printed unless
//! the host installs a subscriber. [`init`] installs a formatted stderr
//! subscriber whose filter comes from `TREESYNC_LOG` when set, otherwise
//! from the requested [`Verbosity`].

use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "TREESYNC_LOG";

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Normal output (commits, push outcomes)
    #[default]
    Normal,
    /// Debug mode - object and ref traffic
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    /// Default filter directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "treesync=warn",
            Verbosity::Normal => "treesync=info",
            Verbosity::Debug => "treesync=debug",
        }
    }
}

/// Build the filter: `TREESYNC_LOG` if set and valid, else the verbosity default.
pub fn filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(verbosity.directive()))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; calling this more
/// than once is harmless.
pub fn init(verbosity: Verbosity) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
