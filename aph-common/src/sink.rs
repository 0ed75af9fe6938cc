//! Output channels shown inside acme.
//!
//! Tool output for a project goes to the `errors` file of the project's log
//! window; acme appends it to that directory's `+Errors` window. Messages
//! that belong to no project go to the process-wide console (`cons`).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::fsys::{AcmeError, AcmeFile, Conn, OpenMode};
use crate::types::WindowId;
use crate::window::ensure_window;

/// acme's `cons` file, shared by everything in the process.
pub struct Console {
    file: Mutex<Box<dyn AcmeFile>>,
}

impl Console {
    pub fn open(conn: &Conn) -> Result<Self, AcmeError> {
        let file = conn.open("cons", OpenMode::Write)?;
        debug!("Opened acme console");
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Write for &Console {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Name of the log window for `root`: the root's directory window, or
/// `log_window` inside the root.
pub fn log_window_name(root: &Path, log_window: &str) -> String {
    if log_window.is_empty() {
        let dir = root.to_string_lossy();
        let dir = dir.trim_end_matches('/');
        format!("{dir}/")
    } else {
        root.join(log_window).to_string_lossy().into_owned()
    }
}

/// The per-project error channel.
pub struct ErrorSink {
    window: WindowId,
    root: PathBuf,
    file: Box<dyn AcmeFile>,
}

impl ErrorSink {
    /// Open the `errors` file of `root`'s log window, creating the window
    /// when acme has none by that name.
    pub fn open(conn: &Conn, root: &Path, log_window: &str) -> Result<Self, AcmeError> {
        let name = log_window_name(root, log_window);
        let window = ensure_window(conn, &name)?;
        let file = conn.open(&format!("{window}/errors"), OpenMode::Write)?;
        debug!("Error sink for {:?} is window {} ({})", root, window, name);
        Ok(Self {
            window,
            root: root.to_path_buf(),
            file,
        })
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Write for ErrorSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAcme;

    #[test]
    fn test_log_window_name() {
        assert_eq!(log_window_name(Path::new("/repo"), ""), "/repo/");
        assert_eq!(log_window_name(Path::new("/repo/"), ""), "/repo/");
        assert_eq!(log_window_name(Path::new("/"), ""), "/");
        assert_eq!(
            log_window_name(Path::new("/repo"), ".guide"),
            "/repo/.guide"
        );
    }

    #[test]
    fn test_sink_reuses_existing_window() {
        let acme = FakeAcme::new();
        let dir = acme.add_window("/repo/", "");
        let conn = acme.handle().connect().unwrap();

        let mut sink = ErrorSink::open(&conn, Path::new("/repo"), "").unwrap();
        assert_eq!(sink.window(), dir);
        sink.write_all(b"a.x:1: oops\n").unwrap();
        assert_eq!(acme.errors(dir), "a.x:1: oops\n");
    }

    #[test]
    fn test_sink_creates_missing_window() {
        let acme = FakeAcme::new();
        let conn = acme.handle().connect().unwrap();

        let mut sink = ErrorSink::open(&conn, Path::new("/repo"), ".guide").unwrap();
        assert_eq!(acme.window_named("/repo/.guide"), Some(sink.window()));
        write!(sink, "done").unwrap();
        assert_eq!(acme.errors(sink.window()), "done");
    }

    #[test]
    fn test_console_appends() {
        let acme = FakeAcme::new();
        let console = acme.handle().console().unwrap();
        (&*console).write_all(b"one\n").unwrap();
        writeln!(&*console, "two").unwrap();
        assert_eq!(acme.cons(), "one\ntwo\n");
    }
}
