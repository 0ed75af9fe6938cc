//! Control sessions on acme windows.
//!
//! A [`Session`] wraps one open window: its `ctl` file is held for the
//! session's lifetime and the `addr` and `data` files are opened on first
//! use. Attributes are read once, when the session opens. Every operation
//! is one synchronous exchange with acme; nothing is retried.

use std::io::Write;

use thiserror::Error;
use tracing::{debug, trace};

use crate::errors::{Coded, ErrorCode};
use crate::fsys::{AcmeError, AcmeFile, Conn, OpenMode};
use crate::types::{Addr, CtlInfo, WindowId, name_from_tag};
use crate::util::same_path;

/// Errors from a control session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("window {0} does not exist")]
    NotFound(WindowId),

    #[error("window {id}: {source}")]
    Control {
        id: WindowId,
        #[source]
        source: AcmeError,
    },
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl Coded for SessionError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::WindowNotFound,
            Self::Control { source, .. } => source.code(),
        }
    }
}

/// Read-only window attributes, as of when the session opened.
pub trait WindowAttrs {
    fn id(&self) -> WindowId;
    fn info(&self) -> &CtlInfo;
    fn tag(&self) -> &str;
    /// First token of the tag.
    fn name(&self) -> &str;

    fn is_directory(&self) -> bool {
        self.info().is_directory
    }

    fn is_modified(&self) -> bool {
        self.info().is_modified
    }
}

/// Body contents.
pub trait BodyAccess {
    fn read_body(&mut self) -> Result<Vec<u8>, SessionError>;

    /// Replace `range` (the whole body when `None`) with `text`.
    fn write_body(&mut self, range: Option<Addr>, text: &[u8]) -> Result<(), SessionError>;
}

/// The window's selection (dot).
pub trait SelectionControl {
    /// Current value of the `addr` register.
    fn read_addr(&mut self) -> Result<Addr, SessionError>;

    fn read_selection(&mut self) -> Result<Addr, SessionError>;

    /// Select `addr` in the window.
    fn set_selection(&mut self, addr: Addr) -> Result<(), SessionError>;

    /// Scroll the window so the selection is visible.
    fn show_selection(&mut self) -> Result<(), SessionError>;
}

/// Commands written to the window's `ctl` file.
pub trait WindowControl {
    /// Write one or more newline-terminated commands.
    fn ctl(&mut self, commands: &str) -> Result<(), SessionError>;

    fn set_clean(&mut self) -> Result<(), SessionError> {
        self.ctl("clean\n")
    }

    /// Start recording body changes for undo again.
    fn mark(&mut self) -> Result<(), SessionError> {
        self.ctl("mark\n")
    }

    /// Stop recording body changes for undo.
    fn nomark(&mut self) -> Result<(), SessionError> {
        self.ctl("nomark\n")
    }

    /// Reload the body from the file.
    fn get(&mut self) -> Result<(), SessionError> {
        self.ctl("get\n")
    }

    /// Write the body to the file.
    fn put(&mut self) -> Result<(), SessionError> {
        self.ctl("put\n")
    }
}

/// Everything a save handler needs from a window.
pub trait Window: WindowAttrs + BodyAccess + SelectionControl + WindowControl {}

impl<T: WindowAttrs + BodyAccess + SelectionControl + WindowControl> Window for T {}

/// An open window.
pub struct Session {
    conn: Conn,
    id: WindowId,
    info: CtlInfo,
    tag: String,
    ctl: Box<dyn AcmeFile>,
    addr: Option<Box<dyn AcmeFile>>,
    data: Option<Box<dyn AcmeFile>>,
}

impl Session {
    /// Open window `id`, reading its `ctl` and `tag` files.
    pub fn open(conn: &Conn, id: WindowId) -> Result<Self, SessionError> {
        let control = |source: AcmeError| {
            if source.is_not_found() {
                SessionError::NotFound(id)
            } else {
                SessionError::Control { id, source }
            }
        };

        let ctl_path = format!("{id}/ctl");
        let mut ctl = conn.open(&ctl_path, OpenMode::ReadWrite).map_err(control)?;
        let line = read_all_at(ctl.as_mut(), &ctl_path).map_err(control)?;
        let info = CtlInfo::parse(&String::from_utf8_lossy(&line))
            .map_err(|e| control(AcmeError::from(e)))?;

        let tag = conn.read_file(&format!("{id}/tag")).map_err(control)?;
        let tag = String::from_utf8_lossy(&tag).into_owned();

        debug!("Opened window {} ({})", id, name_from_tag(&tag));
        Ok(Self {
            conn: conn.clone(),
            id,
            info,
            tag,
            ctl,
            addr: None,
            data: None,
        })
    }

    /// Release the window's files.
    pub fn close(self) {
        trace!("Closing window {}", self.id);
    }

    fn err(&self, source: AcmeError) -> SessionError {
        if source.is_not_found() {
            SessionError::NotFound(self.id)
        } else {
            SessionError::Control {
                id: self.id,
                source,
            }
        }
    }

    fn addr_file(&mut self) -> Result<&mut Box<dyn AcmeFile>, SessionError> {
        let file = match self.addr.take() {
            Some(file) => file,
            None => self
                .conn
                .open(&format!("{}/addr", self.id), OpenMode::ReadWrite)
                .map_err(|e| self.err(e))?,
        };
        Ok(self.addr.insert(file))
    }

    fn data_file(&mut self) -> Result<&mut Box<dyn AcmeFile>, SessionError> {
        let file = match self.data.take() {
            Some(file) => file,
            None => self
                .conn
                .open(&format!("{}/data", self.id), OpenMode::ReadWrite)
                .map_err(|e| self.err(e))?,
        };
        Ok(self.data.insert(file))
    }

    fn write_addr(&mut self, expr: &str) -> Result<(), SessionError> {
        let id = self.id;
        let file = self.addr_file()?;
        file.write_all(expr.as_bytes())
            .map_err(|e| SessionError::Control {
                id,
                source: AcmeError::io(format!("{id}/addr"), e),
            })
    }
}

/// Read a whole file with positioned reads, leaving its offset alone.
fn read_all_at(file: &mut dyn AcmeFile, path: &str) -> Result<Vec<u8>, AcmeError> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = file
            .read_at(&mut buf, out.len() as u64)
            .map_err(|e| AcmeError::io(path, e))?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

impl WindowAttrs for Session {
    fn id(&self) -> WindowId {
        self.id
    }

    fn info(&self) -> &CtlInfo {
        &self.info
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn name(&self) -> &str {
        name_from_tag(&self.tag)
    }
}

impl BodyAccess for Session {
    fn read_body(&mut self) -> Result<Vec<u8>, SessionError> {
        self.conn
            .read_file(&format!("{}/body", self.id))
            .map_err(|e| self.err(e))
    }

    fn write_body(&mut self, range: Option<Addr>, text: &[u8]) -> Result<(), SessionError> {
        let expr = range.map_or_else(|| "0,$".to_string(), |addr| addr.to_expr());
        self.write_addr(&expr)?;
        let id = self.id;
        let data = self.data_file()?;
        data.write_all(text).map_err(|e| SessionError::Control {
            id,
            source: AcmeError::io(format!("{id}/data"), e),
        })?;
        trace!("Wrote {} bytes to window {} at {}", text.len(), id, expr);
        Ok(())
    }
}

impl SelectionControl for Session {
    fn read_addr(&mut self) -> Result<Addr, SessionError> {
        let id = self.id;
        let path = format!("{id}/addr");
        let file = self.addr_file()?;
        let mut buf = [0u8; 64];
        let n = file.read_at(&mut buf, 0).map_err(|e| SessionError::Control {
            id,
            source: AcmeError::io(path, e),
        })?;
        Addr::parse_file(&String::from_utf8_lossy(&buf[..n])).map_err(|e| SessionError::Control {
            id,
            source: e.into(),
        })
    }

    fn read_selection(&mut self) -> Result<Addr, SessionError> {
        // The first read after opening addr reports 0,0 regardless of dot.
        self.read_addr()?;
        self.ctl("addr=dot\n")?;
        self.read_addr()
    }

    fn set_selection(&mut self, addr: Addr) -> Result<(), SessionError> {
        self.write_addr(&addr.to_expr())?;
        self.ctl("dot=addr\n")
    }

    fn show_selection(&mut self) -> Result<(), SessionError> {
        self.ctl("show\n")
    }
}

impl WindowControl for Session {
    fn ctl(&mut self, commands: &str) -> Result<(), SessionError> {
        trace!("ctl {}: {:?}", self.id, commands);
        let id = self.id;
        self.ctl
            .write_all(commands.as_bytes())
            .map_err(|e| SessionError::Control {
                id,
                source: AcmeError::io(format!("{id}/ctl"), e),
            })
    }
}

/// Find an open window whose name is the same path as `name`.
pub fn find_window(conn: &Conn, name: &str) -> Result<Option<WindowId>, AcmeError> {
    Ok(conn
        .windows()?
        .into_iter()
        .find(|w| same_path(&w.name, name))
        .map(|w| w.id()))
}

/// Create a window named `name`.
pub fn create_window(conn: &Conn, name: &str) -> Result<WindowId, AcmeError> {
    let mut ctl = conn.open("new/ctl", OpenMode::ReadWrite)?;
    let line = read_all_at(ctl.as_mut(), "new/ctl")?;
    let info = CtlInfo::parse(&String::from_utf8_lossy(&line))?;
    ctl.write_all(format!("name {name}\n").as_bytes())
        .map_err(|e| AcmeError::io("new/ctl", e))?;
    debug!("Created window {} for {}", info.id, name);
    Ok(info.id)
}

/// Find the window named `name`, creating it if there is none.
pub fn ensure_window(conn: &Conn, name: &str) -> Result<WindowId, AcmeError> {
    match find_window(conn, name)? {
        Some(id) => Ok(id),
        None => create_window(conn, name),
    }
}
