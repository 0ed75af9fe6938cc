//! Logging setup shared by `aph` and `aphd`.
//!
//! ```ignore
//! let mut log_config = LogConfig::from_env("info").with_stderr();
//! if !cli.no_console {
//!     log_config = log_config.with_console(acme.clone());
//! }
//! let _logging_guards = init_logging(&log_config)?;
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::EnvParser;
use crate::errors::{Coded, ErrorCode};
use crate::fsys::{Acme, AcmeError};
use crate::sink::Console;

/// Logging could not be set up.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{0}'")]
    Level(String),

    #[error("log file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Console(AcmeError),

    #[error("installing tracing subscriber: {0}")]
    Install(String),
}

impl Coded for LoggingError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Console(e) => e.code(),
            _ => ErrorCode::InternalLoggingError,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Where and how to log.
#[derive(Clone, Default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub stderr: bool,
    console: Option<Acme>,
}

impl std::fmt::Debug for LogConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogConfig")
            .field("level", &self.level)
            .field("format", &self.format)
            .field("file", &self.file)
            .field("stderr", &self.stderr)
            .field("console", &self.console.is_some())
            .finish()
    }
}

impl LogConfig {
    /// Read `APH_LOG_LEVEL`, `APH_LOG_FORMAT` and `APH_LOG_FILE`. Invalid
    /// values fall back to the defaults.
    pub fn from_env(default_level: &str) -> Self {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    pub fn from_parser(env: &mut EnvParser, default_level: &str) -> Self {
        let level = env.get_log_level("LOG_LEVEL", default_level).value;
        let format = env
            .get_parsed::<LogFormat>("LOG_FORMAT", "pretty, compact or json")
            .map(|v| v.value)
            .unwrap_or_default();
        let file = env.get_path("LOG_FILE").map(|v| v.value);
        Self {
            level,
            format,
            file,
            stderr: false,
            console: None,
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }

    /// Also write records to acme's console.
    pub fn with_console(mut self, acme: Acme) -> Self {
        self.console = Some(acme);
        self
    }
}

/// Keeps background log writers alive; drop to flush.
#[must_use]
#[derive(Debug)]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber described by `config`.
///
/// With a console configured, fails unless acme's console can be opened.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.stderr {
        layers.push(fmt_layer(config.format, io::stderr, true));
    }

    if let Some(path) = &config.file {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_error = |source| LoggingError::File {
            path: path.clone(),
            source,
        };
        let name = path.file_name().ok_or_else(|| {
            file_error(io::Error::new(io::ErrorKind::InvalidInput, "no file name"))
        })?;
        std::fs::create_dir_all(&dir).map_err(file_error)?;
        let appender = tracing_appender::rolling::never(&dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(fmt_layer(config.format, writer, false));
    }

    if let Some(acme) = &config.console {
        // Open the console before the subscriber exists: opening it logs.
        acme.console().map_err(LoggingError::Console)?;
        layers.push(fmt_layer(
            LogFormat::Compact,
            ConsoleWriter { acme: acme.clone() },
            false,
        ));
    }

    let filter =
        EnvFilter::try_new(&config.level).map_err(|_| LoggingError::Level(config.level.clone()))?;
    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(LoggingGuards { _guards: guards })
}

/// `MakeWriter` over acme's console.
struct ConsoleWriter {
    acme: Acme,
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleHandle;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleHandle(self.acme.console_if_open())
    }
}

struct ConsoleHandle(Option<Arc<Console>>);

impl Write for ConsoleHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.0 {
            Some(console) => (&**console).write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
