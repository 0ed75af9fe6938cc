//! The environment acme gives commands run from a window.
//!
//! acme sets `winid` to the window's id and `%` to its file name.

use aph_common::errors::{Coded, ErrorCode};
use aph_common::window::WindowAttrs;
use aph_common::{Session, WindowId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditorEnvError {
    #[error("winid is not set; run aph from an acme window")]
    MissingWinid,

    #[error("winid {0:?} is not a window id")]
    InvalidWinid(String),
}

impl Coded for EditorEnvError {
    fn code(&self) -> ErrorCode {
        ErrorCode::EditorEnvMissing
    }
}

/// The window a one-shot command acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorEnv {
    pub winid: WindowId,
    /// `%`, when acme set it.
    pub name: Option<String>,
}

impl EditorEnv {
    pub fn from_env() -> Result<Self, EditorEnvError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EditorEnvError> {
        let raw = lookup("winid").ok_or(EditorEnvError::MissingWinid)?;
        let winid = raw
            .trim()
            .parse::<u32>()
            .map(WindowId::new)
            .map_err(|_| EditorEnvError::InvalidWinid(raw.clone()))?;
        let name = lookup("%").filter(|n| !n.is_empty());
        Ok(Self { winid, name })
    }

    /// The file name, falling back to the window's own name.
    pub fn file_name(&self, session: &Session) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| session.name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_reads_winid_and_name() {
        let env = EditorEnv::from_lookup(lookup(&[("winid", "12"), ("%", "/src/a.go")])).unwrap();
        assert_eq!(env.winid, WindowId::new(12));
        assert_eq!(env.name.as_deref(), Some("/src/a.go"));
    }

    #[test]
    fn test_empty_name_is_absent() {
        let env = EditorEnv::from_lookup(lookup(&[("winid", " 3\n"), ("%", "")])).unwrap();
        assert_eq!(env.winid, WindowId::new(3));
        assert_eq!(env.name, None);
    }

    #[test]
    fn test_missing_or_bad_winid() {
        let err = EditorEnv::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, EditorEnvError::MissingWinid));
        assert_eq!(err.code(), ErrorCode::EditorEnvMissing);

        let err = EditorEnv::from_lookup(lookup(&[("winid", "abc")])).unwrap_err();
        assert!(matches!(err, EditorEnvError::InvalidWinid(_)));
    }
}
