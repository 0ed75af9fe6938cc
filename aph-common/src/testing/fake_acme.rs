//! An in-memory acme.
//!
//! [`FakeAcme`] serves the same file tree the real editor does and keeps
//! enough window state to exercise sessions, sinks and the pipeline:
//! bodies, dot, the `addr` register (reset to 0,0 whenever `addr` is
//! opened), dirty flags, `errors` and `cons` buffers and a blocking `log`.
//! `get` and `put` read and write the file named by the window on the real
//! file system.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::fsys::{Acme, AcmeError, AcmeFile, Connector, Fsys, OpenMode};
use crate::types::{Addr, WindowId};
use crate::util::same_path;

const DEFAULT_TAG: &str = " Del Snarf | Look Get Put ";

struct FakeWindow {
    name: String,
    tag_extra: String,
    body: String,
    addr: (usize, usize),
    dot: (usize, usize),
    dirty: bool,
    is_directory: bool,
    errors: Vec<u8>,
    ctl_log: Vec<String>,
}

impl FakeWindow {
    fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            tag_extra: DEFAULT_TAG.to_string(),
            body: body.to_string(),
            addr: (0, 0),
            dot: (0, 0),
            dirty: false,
            is_directory: false,
            errors: Vec::new(),
            ctl_log: Vec::new(),
        }
    }

    fn tag(&self) -> String {
        format!("{}{}", self.name, self.tag_extra)
    }

    fn body_len(&self) -> usize {
        self.body.chars().count()
    }

    fn fields(&self, id: u32) -> String {
        format!(
            "{:>11} {:>11} {:>11} {:>11} {:>11} ",
            id,
            self.tag().chars().count(),
            self.body_len(),
            u8::from(self.is_directory),
            u8::from(self.dirty)
        )
    }

    fn ctl_line(&self, id: u32) -> String {
        format!(
            "{}{:>11} /lib/font/bit/lucsans/euro.8.font {:>11} ",
            self.fields(id),
            640,
            4
        )
    }

    /// Replace the characters in `q0..q1` with `text`.
    fn replace(&mut self, q0: usize, q1: usize, text: &str) {
        let start = char_to_byte(&self.body, q0);
        let end = char_to_byte(&self.body, q1);
        self.body.replace_range(start..end, text);
    }
}

fn char_to_byte(s: &str, q: usize) -> usize {
    s.char_indices().nth(q).map_or(s.len(), |(i, _)| i)
}

/// Parse the address forms acme clients write: `#n`, `#n,#m`, `0`, `$`,
/// `,` and `0,$`.
fn parse_addr(expr: &str, len: usize) -> Option<(usize, usize)> {
    let expr = expr.trim();
    let point = |s: &str, default: usize| -> Option<usize> {
        match s.trim() {
            "" => Some(default),
            "$" => Some(len),
            "0" => Some(0),
            other => other.strip_prefix('#')?.parse().ok(),
        }
    };
    let (q0, q1) = match expr.split_once(',') {
        Some((left, right)) => (point(left, 0)?, point(right, len)?),
        None => {
            let q = point(expr, 0)?;
            (q, q)
        }
    };
    (q0 <= q1 && q1 <= len).then_some((q0, q1))
}

#[derive(Default)]
struct State {
    windows: BTreeMap<u32, FakeWindow>,
    next_id: u32,
    cons: Vec<u8>,
    log: VecDeque<Vec<u8>>,
    log_closed: bool,
    connections: usize,
    fail_connections: bool,
}

impl State {
    fn add(&mut self, window: FakeWindow) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.windows.insert(id, window);
        id
    }

    fn window(&mut self, id: u32) -> io::Result<&mut FakeWindow> {
        self.windows.get_mut(&id).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("window {id} deleted"))
        })
    }

    fn push_log(&mut self, id: u32, op: &str, name: &str) {
        self.log.push_back(format!("{id} {op} {name}\n").into_bytes());
    }

    fn ctl(&mut self, id: u32, cmd: &str) -> io::Result<()> {
        let win = self.window(id)?;
        win.ctl_log.push(cmd.to_string());
        match cmd {
            "addr=dot" => win.addr = win.dot,
            "dot=addr" => win.dot = win.addr,
            "show" | "mark" | "nomark" => {}
            "clean" => win.dirty = false,
            "dirty" => win.dirty = true,
            "get" => {
                let text = std::fs::read_to_string(&win.name)?;
                win.body = text;
                win.dirty = false;
                win.addr = (0, 0);
                win.dot = (0, 0);
            }
            "put" => {
                std::fs::write(&win.name, win.body.as_bytes())?;
                win.dirty = false;
                let name = win.name.clone();
                self.push_log(id, "put", &name);
            }
            "del" | "delete" => {
                if let Some(win) = self.windows.remove(&id) {
                    self.push_log(id, "del", &win.name);
                }
            }
            _ => match cmd.strip_prefix("name ") {
                Some(name) => win.name = name.to_string(),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("unknown ctl command '{cmd}'"),
                    ));
                }
            },
        }
        Ok(())
    }
}

struct Shared {
    state: Mutex<State>,
    log_ready: Condvar,
}

/// In-memory acme. Clones share state.
#[derive(Clone)]
pub struct FakeAcme {
    shared: Arc<Shared>,
}

impl Default for FakeAcme {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAcme {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                log_ready: Condvar::new(),
            }),
        }
    }

    /// A service handle connected to this fake.
    pub fn handle(&self) -> Acme {
        Acme::new(Arc::new(self.clone()))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.shared)
    }

    fn with_window<T: Default>(&self, id: WindowId, f: impl FnOnce(&mut FakeWindow) -> T) -> T {
        self.lock()
            .windows
            .get_mut(&id.get())
            .map(f)
            .unwrap_or_default()
    }

    /// Open a window on `name` with `body`.
    pub fn add_window(&self, name: &str, body: &str) -> WindowId {
        WindowId(self.lock().add(FakeWindow::new(name, body)))
    }

    /// Open a directory window listing `entries`.
    pub fn add_directory(&self, name: &str, entries: &[&str]) -> WindowId {
        let mut window = FakeWindow::new(name, &entries.join("\n"));
        window.is_directory = true;
        WindowId(self.lock().add(window))
    }

    pub fn delete_window(&self, id: WindowId) {
        self.lock().windows.remove(&id.get());
    }

    pub fn windows(&self) -> Vec<WindowId> {
        self.lock().windows.keys().copied().map(WindowId).collect()
    }

    /// The window whose name is the same path as `name`.
    pub fn window_named(&self, name: &str) -> Option<WindowId> {
        self.lock()
            .windows
            .iter()
            .find(|(_, w)| same_path(&w.name, name))
            .map(|(id, _)| WindowId(*id))
    }

    pub fn set_dot(&self, id: WindowId, q0: usize, q1: usize) {
        self.with_window(id, |w| w.dot = (q0.min(q1), q0.max(q1)));
    }

    pub fn dot(&self, id: WindowId) -> Addr {
        self.with_window(id, |w| Addr::new(w.dot.0, w.dot.1))
    }

    pub fn set_dirty(&self, id: WindowId, dirty: bool) {
        self.with_window(id, |w| w.dirty = dirty);
    }

    pub fn is_dirty(&self, id: WindowId) -> bool {
        self.with_window(id, |w| w.dirty)
    }

    /// Replace everything in the tag after the name.
    pub fn set_tag_extra(&self, id: WindowId, extra: &str) {
        self.with_window(id, |w| w.tag_extra = extra.to_string());
    }

    pub fn tag(&self, id: WindowId) -> String {
        self.with_window(id, |w| w.tag())
    }

    pub fn body(&self, id: WindowId) -> String {
        self.with_window(id, |w| w.body.clone())
    }

    /// Text written to the window's `errors` file.
    pub fn errors(&self, id: WindowId) -> String {
        self.with_window(id, |w| String::from_utf8_lossy(&w.errors).into_owned())
    }

    /// ctl commands the window received, one per entry, without newlines.
    pub fn ctl_log(&self, id: WindowId) -> Vec<String> {
        self.with_window(id, |w| w.ctl_log.clone())
    }

    /// Text written to `cons`.
    pub fn cons(&self) -> String {
        String::from_utf8_lossy(&self.lock().cons).into_owned()
    }

    /// Append an event to the log.
    pub fn emit(&self, id: WindowId, op: &str, name: &str) {
        self.lock().push_log(id.get(), op, name);
        self.shared.log_ready.notify_all();
    }

    /// Append raw bytes to the log.
    pub fn emit_raw(&self, line: &str) {
        self.lock().log.push_back(line.as_bytes().to_vec());
        self.shared.log_ready.notify_all();
    }

    /// End the log: readers get end-of-file once it is drained.
    pub fn close_log(&self) {
        self.lock().log_closed = true;
        self.shared.log_ready.notify_all();
    }

    /// Successful connections so far.
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Make new connections fail (or succeed again).
    pub fn fail_connections(&self, fail: bool) {
        self.lock().fail_connections = fail;
    }
}

fn lock(shared: &Shared) -> MutexGuard<'_, State> {
    shared
        .state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Connector for FakeAcme {
    fn connect(&self) -> Result<Arc<dyn Fsys>, AcmeError> {
        let mut state = self.lock();
        if state.fail_connections {
            return Err(AcmeError::Connect {
                path: "fake".into(),
                reason: "connection refused".to_string(),
            });
        }
        state.connections += 1;
        Ok(Arc::new(FakeFs {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeFs {
    shared: Arc<Shared>,
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Index,
    Log,
    Cons,
    Ctl(u32),
    Addr(u32),
    Data(u32),
    Body(u32),
    Tag(u32),
    Errors(u32),
}

impl Fsys for FakeFs {
    fn open(&self, path: &str, _mode: OpenMode) -> Result<Box<dyn AcmeFile>, AcmeError> {
        let not_found = || AcmeError::NotFound(path.to_string());
        let mut state = lock(&self.shared);
        let node = match path.trim_start_matches('/') {
            "index" => Node::Index,
            "log" => Node::Log,
            "cons" => Node::Cons,
            "new/ctl" => {
                let id = state.add(FakeWindow::new("", ""));
                state.push_log(id, "new", "");
                self.shared.log_ready.notify_all();
                Node::Ctl(id)
            }
            other => {
                let (dir, file) = other.split_once('/').ok_or_else(not_found)?;
                let id: u32 = dir.parse().map_err(|_| not_found())?;
                let window = state.windows.get_mut(&id).ok_or_else(not_found)?;
                match file {
                    "ctl" => Node::Ctl(id),
                    "addr" => {
                        window.addr = (0, 0);
                        Node::Addr(id)
                    }
                    "data" => Node::Data(id),
                    "body" => Node::Body(id),
                    "tag" => Node::Tag(id),
                    "errors" => Node::Errors(id),
                    _ => return Err(not_found()),
                }
            }
        };
        Ok(Box::new(FakeFile {
            shared: Arc::clone(&self.shared),
            node,
            offset: 0,
            pending: Vec::new(),
        }))
    }
}

struct FakeFile {
    shared: Arc<Shared>,
    node: Node,
    offset: u64,
    pending: Vec<u8>,
}

impl FakeFile {
    fn snapshot(&self) -> io::Result<Vec<u8>> {
        let mut state = lock(&self.shared);
        let text = match self.node {
            Node::Index => state
                .windows
                .iter()
                .map(|(id, w)| format!("{}{}\n", w.fields(*id), w.tag()))
                .collect::<String>(),
            Node::Log | Node::Cons => String::new(),
            Node::Ctl(id) => state.window(id)?.ctl_line(id),
            Node::Addr(id) => {
                let (q0, q1) = state.window(id)?.addr;
                format!("{q0:>11} {q1:>11} ")
            }
            Node::Data(id) => {
                let win = state.window(id)?;
                win.body.chars().skip(win.addr.0).collect()
            }
            Node::Body(id) => state.window(id)?.body.clone(),
            Node::Tag(id) => state.window(id)?.tag(),
            Node::Errors(id) => String::from_utf8_lossy(&state.window(id)?.errors).into_owned(),
        };
        Ok(text.into_bytes())
    }

    fn read_log(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            let mut state = lock(&self.shared);
            loop {
                if let Some(line) = state.log.pop_front() {
                    self.pending = line;
                    break;
                }
                if state.log_closed {
                    return Ok(0);
                }
                state = self
                    .shared
                    .log_ready
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn copy_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let content = self.snapshot()?;
        let start = (offset as usize).min(content.len());
        let n = buf.len().min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        Ok(n)
    }
}

impl Read for FakeFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Node::Log = self.node {
            return self.read_log(buf);
        }
        let n = self.copy_at(buf, self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl Write for FakeFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let mut state = lock(&self.shared);
        match self.node {
            Node::Index | Node::Log => {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "permission denied",
                ));
            }
            Node::Cons => state.cons.extend_from_slice(buf),
            Node::Ctl(id) => {
                for cmd in text.lines().filter(|l| !l.is_empty()) {
                    state.ctl(id, cmd)?;
                }
                drop(state);
                self.shared.log_ready.notify_all();
            }
            Node::Addr(id) => {
                let win = state.window(id)?;
                win.addr = parse_addr(&text, win.body_len()).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "address out of range")
                })?;
            }
            Node::Data(id) => {
                let win = state.window(id)?;
                let (q0, q1) = win.addr;
                win.replace(q0, q1, &text);
                win.addr = (q0, q0 + text.chars().count());
                win.dirty = true;
            }
            Node::Body(id) => {
                let win = state.window(id)?;
                win.body.push_str(&text);
                win.dirty = true;
            }
            Node::Tag(id) => state.window(id)?.tag_extra.push_str(&text),
            Node::Errors(id) => state.window(id)?.errors.extend_from_slice(buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AcmeFile for FakeFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if let Node::Log = self.node {
            return self.read_log(buf);
        }
        self.copy_at(buf, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsys::read_to_end;

    #[test]
    fn test_parse_addr_forms() {
        assert_eq!(parse_addr("#2,#5", 10), Some((2, 5)));
        assert_eq!(parse_addr("0,$", 10), Some((0, 10)));
        assert_eq!(parse_addr(",", 4), Some((0, 4)));
        assert_eq!(parse_addr("#3", 10), Some((3, 3)));
        assert_eq!(parse_addr("$", 7), Some((7, 7)));
        assert_eq!(parse_addr("#5,#2", 10), None);
        assert_eq!(parse_addr("#2,#50", 10), None);
        assert_eq!(parse_addr("/regex/", 10), None);
    }

    #[test]
    fn test_index_round_trips_through_parser() {
        let acme = FakeAcme::new();
        let id = acme.add_window("/repo/a.x", "abc");
        acme.set_dirty(id, true);
        let conn = acme.handle().connect().unwrap();
        let windows = conn.windows().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id(), id);
        assert_eq!(windows[0].name, "/repo/a.x");
        assert_eq!(windows[0].ctl.body_size, 3);
        assert!(windows[0].ctl.is_modified);
    }

    #[test]
    fn test_get_and_put_use_the_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "disk").unwrap();
        let acme = FakeAcme::new();
        let id = acme.add_window(&path.to_string_lossy(), "memory");
        let conn = acme.handle().connect().unwrap();

        let mut ctl = conn.open(&format!("{id}/ctl"), OpenMode::Write).unwrap();
        ctl.write_all(b"put\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "memory");

        std::fs::write(&path, "changed").unwrap();
        ctl.write_all(b"get\n").unwrap();
        assert_eq!(acme.body(id), "changed");

        let mut log = conn.open("log", OpenMode::Read).unwrap();
        let mut buf = [0u8; 128];
        let n = log.read(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf[..n]),
            format!("{id} put {}\n", path.display())
        );
    }

    #[test]
    fn test_unknown_ctl_command_fails() {
        let acme = FakeAcme::new();
        let id = acme.add_window("/a", "");
        let conn = acme.handle().connect().unwrap();
        let mut ctl = conn.open(&format!("{id}/ctl"), OpenMode::Write).unwrap();
        assert!(ctl.write_all(b"frobnicate\n").is_err());
    }

    #[test]
    fn test_new_ctl_creates_window() {
        let acme = FakeAcme::new();
        let conn = acme.handle().connect().unwrap();
        let mut ctl = conn.open("new/ctl", OpenMode::ReadWrite).unwrap();
        let line = read_to_end(ctl.as_mut(), "new/ctl").unwrap();
        assert!(String::from_utf8_lossy(&line).trim_start().starts_with('1'));
        ctl.write_all(b"name /repo/\n").unwrap();
        assert_eq!(acme.window_named("/repo"), Some(WindowId(1)));
    }

    #[test]
    fn test_deleted_window_is_not_found() {
        let acme = FakeAcme::new();
        let id = acme.add_window("/a", "");
        acme.delete_window(id);
        let conn = acme.handle().connect().unwrap();
        assert!(conn.open(&format!("{id}/ctl"), OpenMode::Read).err().unwrap().is_not_found());
    }
}
