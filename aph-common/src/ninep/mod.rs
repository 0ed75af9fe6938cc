//! Minimal 9P2000 client for talking to acme's file server.
//!
//! plan9port's acme posts its file system as a Unix socket in the user's
//! namespace directory (`$NAMESPACE/acme`). The client here dials that
//! socket, attaches, and exposes walk+open, read, write and clunk.

mod client;
pub mod fcall;

pub use client::{Client, Fid};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the 9P transport.
#[derive(Debug, Error)]
pub enum NinepError {
    #[error("9P I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed 9P message: {0}")]
    Malformed(String),

    #[error("unknown 9P message type {0}")]
    UnknownType(u8),

    /// Error string returned by the server in an Rerror.
    #[error("{0}")]
    Remote(String),

    #[error("unexpected 9P reply: expected {expected}, got {got}")]
    Unexpected {
        expected: &'static str,
        got: &'static str,
    },

    #[error("9P tag mismatch: sent {sent}, got {got}")]
    TagMismatch { sent: u16, got: u16 },

    #[error("server speaks {0}, not 9P2000")]
    Version(String),

    #[error("{0}: file does not exist")]
    NotFound(String),
}

impl NinepError {
    /// Whether the server reported that a walked-to file is missing.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Remote(msg) => msg.contains("does not exist") || msg.contains("not found"),
            _ => false,
        }
    }
}

/// The plan9port namespace directory.
///
/// `$NAMESPACE` wins; otherwise `/tmp/ns.$USER.$DISPLAY`, with a trailing
/// `.0` screen number dropped from the display and slashes mapped to `_`.
pub fn namespace() -> PathBuf {
    if let Ok(ns) = std::env::var("NAMESPACE")
        && !ns.is_empty()
    {
        return PathBuf::from(ns);
    }
    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".to_string());
    PathBuf::from(format!(
        "/tmp/ns.{}.{}",
        username(),
        canonical_display(&display)
    ))
}

pub(crate) fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "none".to_string())
}

fn canonical_display(display: &str) -> String {
    let mut disp = display.to_string();
    if let Some(colon) = disp.rfind(':') {
        let digits = disp[colon + 1..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(disp.len(), |n| colon + 1 + n);
        if &disp[digits..] == ".0" {
            disp.truncate(digits);
        }
    }
    disp.replace('/', "_")
}
