//! Error catalog for Acme Put Helper.
//!
//! Failures fall into three families, each with its own code range:
//! control-channel errors (window vanished, malformed data), external-process
//! errors (non-zero exit, spawn failure) and resolution errors (root lookup,
//! window lookup or creation). Configuration and internal errors get their
//! own ranges.

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

/// Errors that map onto a catalog entry.
pub trait Coded {
    fn code(&self) -> ErrorCode;

    fn category(&self) -> ErrorCategory {
        self.code().category()
    }
}
