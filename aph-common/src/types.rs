//! Common types used across APH components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an acme window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub u32);

impl WindowId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WindowId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A range of the window body, in the character offsets acme uses for
/// addresses. `q0 <= q1` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Addr {
    pub q0: usize,
    pub q1: usize,
}

impl Addr {
    /// Build an address, ordering the endpoints.
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            q0: a.min(b),
            q1: a.max(b),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.q0 == self.q1
    }

    /// Clamp both ends to a body of `len` characters.
    pub fn clamp_to(self, len: usize) -> Self {
        Self::new(self.q0.min(len), self.q1.min(len))
    }

    /// The address expression acme understands for this range.
    pub fn to_expr(&self) -> String {
        format!("#{},#{}", self.q0, self.q1)
    }

    /// Parse the contents of a window's `addr` file (`%11d %11d `).
    pub fn parse_file(s: &str) -> Result<Self, ParseError> {
        let mut fields = s.split_whitespace();
        let q0 = parse_field(fields.next(), "addr", "q0")?;
        let q1 = parse_field(fields.next(), "addr", "q1")?;
        if q0 > q1 {
            return Err(ParseError::new("addr", format!("q0 {q0} > q1 {q1}")));
        }
        Ok(Self { q0, q1 })
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{},#{}", self.q0, self.q1)
    }
}

/// Malformed data read from one of acme's files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {file} data: {reason}")]
pub struct ParseError {
    pub file: &'static str,
    pub reason: String,
}

impl ParseError {
    fn new(file: &'static str, reason: impl Into<String>) -> Self {
        Self {
            file,
            reason: reason.into(),
        }
    }
}

fn parse_field<T: FromStr>(
    field: Option<&str>,
    file: &'static str,
    what: &str,
) -> Result<T, ParseError> {
    let raw = field.ok_or_else(|| ParseError::new(file, format!("missing {what}")))?;
    raw.parse()
        .map_err(|_| ParseError::new(file, format!("bad {what} '{raw}'")))
}

/// The leading numeric fields of a window's `ctl` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtlInfo {
    pub id: WindowId,
    pub tag_size: usize,
    pub body_size: usize,
    pub is_directory: bool,
    pub is_modified: bool,
}

impl CtlInfo {
    /// Parse a ctl line. Newer acme versions append more fields (tag width,
    /// font, tab width); only the first five are read.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let mut fields = line.split_whitespace();
        let id = parse_field(fields.next(), "ctl", "id")?;
        let tag_size = parse_field(fields.next(), "ctl", "tag size")?;
        let body_size = parse_field(fields.next(), "ctl", "body size")?;
        let is_directory = parse_flag(fields.next(), "isdir")?;
        let is_modified = parse_flag(fields.next(), "isdirty")?;
        Ok(Self {
            id: WindowId(id),
            tag_size,
            body_size,
            is_directory,
            is_modified,
        })
    }
}

fn parse_flag(field: Option<&str>, what: &str) -> Result<bool, ParseError> {
    match field {
        Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(other) => Err(ParseError::new("ctl", format!("bad {what} '{other}'"))),
        None => Err(ParseError::new("ctl", format!("missing {what}"))),
    }
}

/// First whitespace-delimited token of a tag, which acme treats as the
/// window's file name.
pub fn name_from_tag(tag: &str) -> &str {
    tag.split_whitespace().next().unwrap_or("")
}

/// Whether `token` appears as a whole word in `tag`.
pub fn tag_has_token(tag: &str, token: &str) -> bool {
    !token.is_empty() && tag.split_whitespace().any(|word| word == token)
}

/// One line of acme's `index` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub ctl: CtlInfo,
    pub tag: String,
    pub name: String,
}

impl WindowInfo {
    pub fn id(&self) -> WindowId {
        self.ctl.id
    }

    /// Parse one index line: five fixed-width numeric fields followed by the tag.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let ctl = CtlInfo::parse(line)?;
        let tag = skip_fields(line, 5).to_string();
        let name = name_from_tag(&tag).to_string();
        Ok(Self { ctl, tag, name })
    }

    /// Parse the whole index file, one window per non-empty line.
    pub fn parse_index(index: &str) -> Result<Vec<Self>, ParseError> {
        index
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

fn skip_fields(line: &str, n: usize) -> &str {
    let mut rest = line;
    for _ in 0..n {
        rest = rest.trim_start();
        match rest.find(char::is_whitespace) {
            Some(end) => rest = &rest[end..],
            None => return "",
        }
    }
    rest.trim_start()
}

/// Operation recorded in acme's `log` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOp {
    New,
    Zerox,
    Get,
    /// The window was written to disk.
    Put,
    Del,
    Focus,
    Other(String),
}

impl LogOp {
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Zerox => "zerox",
            Self::Get => "get",
            Self::Put => "put",
            Self::Del => "del",
            Self::Focus => "focus",
            Self::Other(op) => op,
        }
    }
}

impl From<&str> for LogOp {
    fn from(op: &str) -> Self {
        match op {
            "new" => Self::New,
            "zerox" => Self::Zerox,
            "get" => Self::Get,
            "put" => Self::Put,
            "del" => Self::Del,
            "focus" => Self::Focus,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LogOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event from acme's `log` file: `<id> <op> <name>\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: WindowId,
    pub op: LogOp,
    pub name: String,
}

impl LogEvent {
    pub fn new(id: u32, op: &str, name: impl Into<String>) -> Self {
        Self {
            id: WindowId(id),
            op: LogOp::from(op),
            name: name.into(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches('\n');
        let mut parts = line.splitn(3, ' ');
        let id = parse_field(parts.next().map(str::trim), "log", "id")?;
        let op = parts
            .next()
            .filter(|op| !op.is_empty())
            .ok_or_else(|| ParseError::new("log", "missing op"))?;
        let name = parts.next().unwrap_or("").to_string();
        Ok(Self {
            id: WindowId(id),
            op: LogOp::from(op),
            name,
        })
    }

    /// A save of a named window: the only kind of event the watcher acts on.
    pub fn is_actionable(&self) -> bool {
        self.op == LogOp::Put && !self.name.is_empty()
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.op, self.name)
    }
}
