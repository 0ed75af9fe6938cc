//! Handling of one save.
//!
//! The daemon and `aph do` share this path: open the window, find the
//! project root and its error sink, run the pipeline, release everything.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::config::AphConfig;
use crate::errors::{Coded, ErrorCode};
use crate::fsys::{Acme, AcmeError};
use crate::pipeline::{PipelineError, PipelineExecutor, PipelineReport};
use crate::root::RootResolver;
use crate::sink::ErrorSink;
use crate::types::WindowId;
use crate::window::{Session, SessionError, WindowAttrs};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Acme(#[from] AcmeError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("log window for {root}: {source}")]
    Sink {
        root: PathBuf,
        #[source]
        source: AcmeError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl Coded for HandlerError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Acme(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Sink { .. } => ErrorCode::LogWindowFailed,
            Self::Pipeline(e) => e.code(),
        }
    }
}

/// Runs the pipeline for saved windows.
#[derive(Clone)]
pub struct SaveHandler {
    acme: Acme,
    resolver: RootResolver,
    executor: PipelineExecutor,
    log_window: String,
}

impl SaveHandler {
    pub fn new(
        acme: Acme,
        resolver: RootResolver,
        executor: PipelineExecutor,
        log_window: impl Into<String>,
    ) -> Self {
        Self {
            acme,
            resolver,
            executor,
            log_window: log_window.into(),
        }
    }

    pub fn from_config(acme: Acme, config: &AphConfig) -> Self {
        Self::new(
            acme,
            RootResolver::from_config(&config.resolver),
            PipelineExecutor::from_config(config),
            config.watch.log_window.clone(),
        )
    }

    pub fn acme(&self) -> &Acme {
        &self.acme
    }

    pub fn resolver(&self) -> &RootResolver {
        &self.resolver
    }

    /// Handle a save of `name` in window `id`.
    ///
    /// Errors reaching acme are returned; a failing stage is recorded in the
    /// report.
    pub fn handle(&self, id: WindowId, name: &str) -> Result<PipelineReport, HandlerError> {
        let file = std::path::absolute(Path::new(name)).unwrap_or_else(|_| PathBuf::from(name));
        let conn = self.acme.connect()?;
        let mut session = Session::open(&conn, id)?;
        if session.name() != name {
            debug!(
                "Window {} is now named {}; handling {}",
                id,
                session.name(),
                name
            );
        }

        let root = self.resolver.resolve(&file);
        let mut sink =
            ErrorSink::open(&conn, &root, &self.log_window).map_err(|source| HandlerError::Sink {
                root: root.clone(),
                source,
            })?;

        let report = self.executor.run(&mut session, &file, &root, &mut sink);
        session.close();
        if report.is_success() && !report.ignored {
            info!(
                "Pipeline for {} finished ({} stages)",
                file.display(),
                report.ran().len()
            );
        }
        Ok(report)
    }
}
