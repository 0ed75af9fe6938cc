//! acme's event log.
//!
//! Reading `log` blocks until acme has something to report, then yields one
//! `id op name` line per event.

use std::io::Read;

use tracing::{trace, warn};

use crate::fsys::{AcmeError, AcmeFile, Conn, OpenMode};
use crate::types::LogEvent;

/// A blocking reader over acme's `log` file.
///
/// Opens its own file; give it a dedicated connection so its blocked reads
/// do not hold up other requests.
pub struct EventLog {
    file: Box<dyn AcmeFile>,
    pending: Vec<u8>,
}

impl EventLog {
    pub fn open(conn: &Conn) -> Result<Self, AcmeError> {
        Ok(Self {
            file: conn.open("log", OpenMode::Read)?,
            pending: Vec::new(),
        })
    }

    /// Block until the next event.
    ///
    /// Returns [`AcmeError::LogClosed`] when acme closes the log. Lines that
    /// do not parse are logged and skipped.
    pub fn next_event(&mut self) -> Result<LogEvent, AcmeError> {
        loop {
            let line = self.next_line()?;
            match LogEvent::parse(&line) {
                Ok(event) => {
                    trace!("acme log: {}", event);
                    return Ok(event);
                }
                Err(e) => warn!("Skipping malformed log line {:?}: {}", line, e),
            }
        }
    }

    fn next_line(&mut self) -> Result<String, AcmeError> {
        let mut buf = [0u8; 8192];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            let n = self
                .file
                .read(&mut buf)
                .map_err(|e| AcmeError::io("log", e))?;
            if n == 0 {
                return Err(AcmeError::LogClosed);
            }
            self.pending.extend_from_slice(&buf[..n]);
        }
    }
}
