//! Configuration system for APH.
//!
//! Values come from three layers, later layers winning:
//! - Built-in defaults
//! - The TOML file (`--config` or `$XDG_CONFIG_HOME/aph/config.toml`)
//! - `APH_*` environment variables
//!
//! Every value set by the file or the environment is recorded with its
//! [`ConfigSource`] so `aph config` can explain where it came from.

pub mod env;
pub mod source;
mod validate;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};
pub use validate::validate_config;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::errors::{Coded, ErrorCode};
use crate::pipeline::Stage;

/// Default tag token that disables the pipeline for a window.
pub const DEFAULT_IGNORE_MARKER: &str = "NoAph";

/// Default external project-root resolver.
pub const DEFAULT_RESOLVER: &str = "acme-root";

/// Default mount point for the `mount` transport.
pub const DEFAULT_MOUNT: &str = "/mnt/acme";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("invalid environment: {}", join_env(.0))]
    Env(Vec<EnvError>),
}

fn join_env(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Coded for ConfigError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Invalid(_) => ErrorCode::ConfigValidationError,
            Self::Env(_) => ErrorCode::ConfigEnvError,
        }
    }
}

/// How APH reaches acme's file system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// 9P over the plan9port namespace socket.
    #[default]
    #[serde(rename = "9p")]
    NineP,
    /// A mounted acme directory.
    Mount,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "9p" | "ninep" => Ok(Self::NineP),
            "mount" => Ok(Self::Mount),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NineP => write!(f, "9p"),
            Self::Mount => write!(f, "mount"),
        }
    }
}

/// How the window body is brought back in line with a reformatted file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteStrategy {
    /// Ask acme to reload the file (`get`).
    #[default]
    Reload,
    /// Replace the whole body through `addr`/`data` without undo marks.
    Replace,
}

impl FromStr for RewriteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reload" | "get" => Ok(Self::Reload),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown rewrite strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcmeConfig {
    pub transport: Transport,
    /// Namespace directory holding the `acme` socket. Defaults to
    /// `$NAMESPACE` or `/tmp/ns.$USER.$DISPLAY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<PathBuf>,
    pub mount: PathBuf,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            namespace: None,
            mount: PathBuf::from(DEFAULT_MOUNT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Tag token that turns the pipeline off for a window.
    pub ignore_marker: String,
    /// Name of the per-project log window relative to the root. Empty means
    /// the root's directory window.
    pub log_window: String,
    pub rewrite: RewriteStrategy,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            ignore_marker: DEFAULT_IGNORE_MARKER.to_string(),
            log_window: String::new(),
            rewrite: RewriteStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_RESOLVER.to_string(),
            args: Vec::new(),
        }
    }
}

/// One external tool in the save pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub command: String,
    /// Extra arguments after the file's path.
    pub args: Vec<String>,
    pub enabled: bool,
    /// File extensions (without the dot) the stage applies to. Empty means
    /// every file.
    pub extensions: Vec<String>,
}

impl StageConfig {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            enabled: true,
            extensions: Vec::new(),
        }
    }

    /// Whether the stage applies to `file`.
    pub fn applies_to(&self, file: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = file.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|want| want.trim_start_matches('.') == ext)
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::new("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    pub format: StageConfig,
    pub check: StageConfig,
    pub build: StageConfig,
    pub test: StageConfig,
}

impl StagesConfig {
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Format => &self.format,
            Stage::Check => &self.check,
            Stage::Build => &self.build,
            Stage::Test => &self.test,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageConfig {
        match stage {
            Stage::Format => &mut self.format,
            Stage::Check => &mut self.check,
            Stage::Build => &mut self.build,
            Stage::Test => &mut self.test,
        }
    }
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            format: StageConfig::new("acme-format"),
            check: StageConfig::new("acme-check"),
            build: StageConfig::new("acme-build"),
            test: StageConfig::new("acme-test"),
        }
    }
}

/// Complete APH configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AphConfig {
    pub acme: AcmeConfig,
    pub watch: WatchConfig,
    pub resolver: ResolverConfig,
    pub stages: StagesConfig,
}

/// A loaded configuration with the origin of each explicitly set key.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AphConfig,
    /// The file that was read, if any.
    pub path: Option<PathBuf>,
    /// Dotted key (`watch.ignore_marker`) to source. Keys left at their
    /// defaults are absent.
    pub sources: BTreeMap<String, ConfigSource>,
}

impl LoadedConfig {
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Default)
    }

    /// Apply `--namespace` / `--mount` flags. A mount point selects the
    /// mount transport.
    pub fn apply_acme_flags(&mut self, namespace: Option<PathBuf>, mount: Option<PathBuf>) {
        if let Some(ns) = namespace {
            self.config.acme.namespace = Some(ns);
            self.config.acme.transport = Transport::NineP;
            self.sources.insert("acme.namespace".into(), ConfigSource::Cli);
            self.sources.insert("acme.transport".into(), ConfigSource::Cli);
        }
        if let Some(mount) = mount {
            self.config.acme.mount = mount;
            self.config.acme.transport = Transport::Mount;
            self.sources.insert("acme.mount".into(), ConfigSource::Cli);
            self.sources.insert("acme.transport".into(), ConfigSource::Cli);
        }
    }
}

/// `$XDG_CONFIG_HOME/aph/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("aph").join("config.toml"))
}

/// Load configuration from `path` (or the default location) and the
/// process environment.
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_with_env(path, &mut EnvParser::new())
}

/// Like [`load`], with environment lookups going through `env`.
pub fn load_with_env(
    path: Option<&Path>,
    env: &mut EnvParser,
) -> Result<LoadedConfig, ConfigError> {
    let mut loaded = match path {
        Some(path) => load_file(path)?,
        None => match default_config_path() {
            Some(path) if path.exists() => load_file(&path)?,
            _ => LoadedConfig {
                config: AphConfig::default(),
                path: None,
                sources: BTreeMap::new(),
            },
        },
    };

    apply_env(&mut loaded, env);
    let env_errors = env.take_errors();
    if !env_errors.is_empty() {
        return Err(ConfigError::Env(env_errors));
    }

    let problems = validate_config(&loaded.config);
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems));
    }
    debug!(
        "Configuration loaded from {:?} ({} explicit keys)",
        loaded.path,
        loaded.sources.len()
    );
    Ok(loaded)
}

fn load_file(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    };
    let config: AphConfig = toml::from_str(&content).map_err(parse_err)?;
    let table: toml::Table = toml::from_str(&content).map_err(parse_err)?;

    let mut sources = BTreeMap::new();
    let origin = ConfigSource::File(path.to_path_buf());
    record_keys(&table, "", &origin, &mut sources);

    Ok(LoadedConfig {
        config,
        path: Some(path.to_path_buf()),
        sources,
    })
}

fn record_keys(
    table: &toml::Table,
    prefix: &str,
    origin: &ConfigSource,
    sources: &mut BTreeMap<String, ConfigSource>,
) {
    for (key, value) in table {
        let dotted = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => record_keys(inner, &dotted, origin, sources),
            _ => {
                sources.insert(dotted, origin.clone());
            }
        }
    }
}

fn apply_env(loaded: &mut LoadedConfig, env: &mut EnvParser) {
    let config = &mut loaded.config;
    let sources = &mut loaded.sources;

    if let Some(v) = env.get_parsed::<Transport>("TRANSPORT", "9p or mount") {
        config.acme.transport = v.value;
        sources.insert("acme.transport".into(), v.source);
    }
    if let Some(v) = env.get_path("NAMESPACE") {
        config.acme.namespace = Some(v.value);
        sources.insert("acme.namespace".into(), v.source);
    }
    if let Some(v) = env.get_path("MOUNT") {
        config.acme.mount = v.value;
        sources.insert("acme.mount".into(), v.source);
    }
    if let Some(v) = env.get_opt_string("IGNORE_MARKER") {
        config.watch.ignore_marker = v.value;
        sources.insert("watch.ignore_marker".into(), v.source);
    }
    if let Some(v) = env.get_opt_string("LOG_WINDOW") {
        config.watch.log_window = v.value;
        sources.insert("watch.log_window".into(), v.source);
    }
    if let Some(v) = env.get_parsed::<RewriteStrategy>("REWRITE", "reload or replace") {
        config.watch.rewrite = v.value;
        sources.insert("watch.rewrite".into(), v.source);
    }
    if let Some(v) = env.get_command("RESOLVER") {
        let mut words = v.value.into_iter();
        config.resolver.command = words.next().unwrap_or_default();
        config.resolver.args = words.collect();
        sources.insert("resolver.command".into(), v.source);
    }

    for stage in Stage::ORDER {
        let Some(v) = env.get_command(stage.env_name()) else {
            continue;
        };
        let cfg = config.stages.get_mut(stage);
        let mut words = v.value.into_iter();
        match words.next() {
            Some(command) => {
                cfg.command = command;
                cfg.args = words.collect();
                cfg.enabled = true;
            }
            None => cfg.enabled = false,
        }
        sources.insert(format!("stages.{}.command", stage.name()), v.source);
    }
}
