//! Access to acme's file system.
//!
//! acme exposes everything as files: `index`, `log`, `cons`, `new/ctl` and
//! a directory per window (`<id>/ctl`, `addr`, `data`, `body`, `tag`,
//! `errors`). [`Fsys`] abstracts how those files are reached: over 9P on
//! the plan9port namespace socket, through a mounted directory, or an
//! in-memory fake in tests. [`Acme`] is the service handle built once at
//! startup and handed to every component that talks to the editor.

use std::fs::OpenOptions;
use std::io::{self, Read, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::debug;

use crate::config::{AcmeConfig, Transport};
use crate::errors::{Coded, ErrorCode};
use crate::ninep::{self, Client, Fid, NinepError};
use crate::sink::Console;
use crate::types::{ParseError, WindowId, WindowInfo};

/// Errors talking to acme.
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("cannot connect to acme at {path}: {reason}")]
    Connect { path: PathBuf, reason: String },

    #[error("{0}: file does not exist")]
    NotFound(String),

    #[error("window {0} does not exist")]
    WindowNotFound(WindowId),

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Malformed(#[from] ParseError),

    #[error("acme event log closed")]
    LogClosed,

    #[error("acme console unavailable: {0}")]
    Console(String),
}

impl AcmeError {
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn from_ninep(path: &str, err: NinepError) -> Self {
        if err.is_not_found() {
            Self::NotFound(path.to_string())
        } else {
            Self::io(path, io::Error::other(err))
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::WindowNotFound(_))
    }
}

impl Coded for AcmeError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Connect { .. } | Self::Console(_) => ErrorCode::AcmeConnectFailed,
            Self::NotFound(_) | Self::WindowNotFound(_) => ErrorCode::WindowNotFound,
            Self::Io { .. } => ErrorCode::AcmeProtocolError,
            Self::Malformed(_) => ErrorCode::WindowMalformed,
            Self::LogClosed => ErrorCode::EventLogClosed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl OpenMode {
    fn ninep(self) -> u8 {
        match self {
            Self::Read => ninep::fcall::OREAD,
            Self::Write => ninep::fcall::OWRITE,
            Self::ReadWrite => ninep::fcall::ORDWR,
        }
    }
}

/// An open acme file.
///
/// acme interprets each write as one unit (a batch of ctl commands, one
/// address, one block of text), so writers hand over complete buffers.
pub trait AcmeFile: Read + Write + Send {
    /// Read at `offset` without moving the file position.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

/// A view of acme's file tree.
pub trait Fsys: Send + Sync {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn AcmeFile>, AcmeError>;
}

/// Establishes new [`Fsys`] connections.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn Fsys>, AcmeError>;
}

/// Read an acme file to the end.
pub fn read_to_end(file: &mut dyn AcmeFile, path: &str) -> Result<Vec<u8>, AcmeError> {
    let mut out = Vec::new();
    file.read_to_end(&mut out)
        .map_err(|e| AcmeError::io(path, e))?;
    Ok(out)
}

/// One connection to acme, shared by the handles a single task opens.
#[derive(Clone)]
pub struct Conn {
    fs: Arc<dyn Fsys>,
}

impl Conn {
    pub fn new(fs: Arc<dyn Fsys>) -> Self {
        Self { fs }
    }

    pub fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn AcmeFile>, AcmeError> {
        self.fs.open(path, mode)
    }

    /// Open and read a whole file.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, AcmeError> {
        let mut file = self.open(path, OpenMode::Read)?;
        read_to_end(file.as_mut(), path)
    }

    /// All open windows, from the `index` file.
    pub fn windows(&self) -> Result<Vec<WindowInfo>, AcmeError> {
        let index = self.read_file("index")?;
        Ok(WindowInfo::parse_index(&String::from_utf8_lossy(&index))?)
    }
}

/// Service handle for the running acme.
///
/// Cloning is cheap; clones share the connector and the console.
#[derive(Clone)]
pub struct Acme {
    connector: Arc<dyn Connector>,
    console: Arc<OnceLock<Result<Arc<Console>, String>>>,
}

impl Acme {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            console: Arc::new(OnceLock::new()),
        }
    }

    pub fn from_config(config: &AcmeConfig) -> Self {
        match config.transport {
            Transport::NineP => {
                let socket = config
                    .namespace
                    .clone()
                    .unwrap_or_else(ninep::namespace)
                    .join("acme");
                Self::new(Arc::new(NinepConnector::new(socket)))
            }
            Transport::Mount => Self::new(Arc::new(MountConnector::new(config.mount.clone()))),
        }
    }

    /// Open a new connection for one task.
    pub fn connect(&self) -> Result<Conn, AcmeError> {
        self.connector.connect().map(Conn::new)
    }

    /// The process-wide console, connected on first use.
    ///
    /// The first attempt's outcome is kept: later calls neither reconnect
    /// after a failure nor open a second console.
    pub fn console(&self) -> Result<Arc<Console>, AcmeError> {
        self.console
            .get_or_init(|| {
                let conn = self.connect().map_err(|e| e.to_string())?;
                Console::open(&conn).map(Arc::new).map_err(|e| e.to_string())
            })
            .clone()
            .map_err(AcmeError::Console)
    }

    /// The console, if an earlier [`Acme::console`] call opened it.
    pub fn console_if_open(&self) -> Option<Arc<Console>> {
        self.console.get().and_then(|r| r.as_ref().ok().cloned())
    }
}

/// Dials acme's posted 9P socket; every connection is a new session.
pub struct NinepConnector {
    socket: PathBuf,
}

impl NinepConnector {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }
}

impl Connector for NinepConnector {
    fn connect(&self) -> Result<Arc<dyn Fsys>, AcmeError> {
        let client = Client::dial(&self.socket).map_err(|e| AcmeError::Connect {
            path: self.socket.clone(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(NinepFs { client }))
    }
}

struct NinepFs {
    client: Arc<Client>,
}

impl Fsys for NinepFs {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn AcmeFile>, AcmeError> {
        let fid = self
            .client
            .open(path, mode.ninep())
            .map_err(|e| AcmeError::from_ninep(path, e))?;
        Ok(Box::new(fid))
    }
}

impl AcmeFile for Fid {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        Fid::read_at(self, buf, offset).map_err(io::Error::other)
    }
}

/// acme mounted as a directory (`/mnt/acme` on Plan 9, or via 9pfuse).
pub struct MountConnector {
    root: PathBuf,
}

impl MountConnector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Connector for MountConnector {
    fn connect(&self) -> Result<Arc<dyn Fsys>, AcmeError> {
        if !self.root.join("index").exists() {
            return Err(AcmeError::Connect {
                path: self.root.clone(),
                reason: "no acme index file".to_string(),
            });
        }
        debug!("Using acme mounted at {:?}", self.root);
        Ok(Arc::new(MountFs {
            root: self.root.clone(),
        }))
    }
}

struct MountFs {
    root: PathBuf,
}

impl MountFs {
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path.trim_start_matches('/')))
    }
}

impl Fsys for MountFs {
    fn open(&self, path: &str, mode: OpenMode) -> Result<Box<dyn AcmeFile>, AcmeError> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true),
            OpenMode::ReadWrite => options.read(true).write(true),
        };
        match options.open(self.resolve(path)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AcmeError::NotFound(path.to_string()))
            }
            Err(e) => Err(AcmeError::io(path, e)),
        }
    }
}

impl AcmeFile for std::fs::File {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        FileExt::read_at(self, buf, offset)
    }
}
