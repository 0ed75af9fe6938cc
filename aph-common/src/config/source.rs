//! Source tracking for configuration values.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "from", rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// The TOML configuration file.
    File(PathBuf),
    /// An `APH_*` environment variable.
    Env(String),
    /// A command-line flag.
    Cli,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Env(var) => write!(f, "env {var}"),
            Self::Cli => write!(f, "command line"),
        }
    }
}

/// A value paired with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
        }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Env(var.into()),
        }
    }

    /// Whether the value was explicitly set rather than defaulted.
    pub fn is_set(&self) -> bool {
        self.source != ConfigSource::Default
    }
}
