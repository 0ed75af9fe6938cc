//! Shared library for Acme Put Helper.
//!
//! Everything the `aph` CLI and the `aphd` daemon have in common: acme's
//! file system (over 9P or a mount), window sessions, the project root
//! resolver, error sinks, the save pipeline, configuration and logging.

pub mod config;
pub mod errors;
pub mod events;
pub mod fsys;
pub mod handler;
pub mod logging;
pub mod ninep;
pub mod pipeline;
pub mod root;
pub mod sink;
pub mod testing;
pub mod types;
pub mod util;
pub mod window;

pub use config::{AphConfig, ConfigError, LoadedConfig};
pub use errors::{Coded, ErrorCategory, ErrorCode, ErrorEntry};
pub use events::EventLog;
pub use fsys::{Acme, AcmeError, Conn};
pub use handler::{HandlerError, SaveHandler};
pub use logging::{LogConfig, LogFormat, LoggingError, LoggingGuards, init_logging};
pub use pipeline::{PipelineError, PipelineExecutor, PipelineReport, Stage};
pub use root::RootResolver;
pub use sink::{Console, ErrorSink};
pub use types::{Addr, LogEvent, LogOp, WindowId};
pub use window::{Session, SessionError};
