//! Error Catalog for Acme Put Helper
//!
//! Every failure the helper reports maps to a unique code and a category.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                                   |
//! |------------|-------------|-----------------------------------------------|
//! | E001-E099  | Config      | Configuration and environment errors          |
//! | E100-E199  | Control     | acme control-channel and 9P errors            |
//! | E200-E299  | Process     | External tool (format/check/build/test) errors |
//! | E300-E399  | Resolution  | Project root, window lookup and creation      |
//! | E500-E599  | Internal    | Internal/unexpected errors                    |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all APH error scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Configuration file could not be read
    ConfigReadError,
    /// Configuration file contains invalid TOML syntax
    ConfigParseError,
    /// Configuration contains invalid values
    ConfigValidationError,
    /// Environment variable has invalid value
    ConfigEnvError,

    // =========================================================================
    // Control Errors (E100-E199)
    // =========================================================================
    /// Could not reach acme's file server
    AcmeConnectFailed,
    /// acme answered with an error or an unexpected message
    AcmeProtocolError,
    /// The window id no longer refers to a live window
    WindowNotFound,
    /// A window file held data that could not be parsed
    WindowMalformed,
    /// The event log stream ended or failed
    EventLogClosed,

    // =========================================================================
    // Process Errors (E200-E299)
    // =========================================================================
    /// A pipeline tool exited with a non-zero status
    StageFailed,
    /// A pipeline tool could not be started
    StageSpawnFailed,
    /// The saved file could not be read around the format stage
    FormatFileUnreadable,

    // =========================================================================
    // Resolution Errors (E300-E399)
    // =========================================================================
    /// The project's log window could not be found or created
    LogWindowFailed,
    /// The one-shot environment (`winid`, `%`) is missing or invalid
    EditorEnvMissing,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// A handling task panicked
    InternalTaskPanicked,
    /// Logging system error
    InternalLoggingError,
}

impl ErrorCode {
    /// Returns the numeric error code (without prefix).
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            Self::ConfigReadError => 1,
            Self::ConfigParseError => 2,
            Self::ConfigValidationError => 3,
            Self::ConfigEnvError => 4,

            Self::AcmeConnectFailed => 100,
            Self::AcmeProtocolError => 101,
            Self::WindowNotFound => 102,
            Self::WindowMalformed => 103,
            Self::EventLogClosed => 104,

            Self::StageFailed => 200,
            Self::StageSpawnFailed => 201,
            Self::FormatFileUnreadable => 202,

            Self::LogWindowFailed => 300,
            Self::EditorEnvMissing => 301,

            Self::InternalTaskPanicked => 500,
            Self::InternalLoggingError => 501,
        }
    }

    /// Returns the formatted error code string (e.g., "APH-E001").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("APH-E{:03}", self.code_number())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Control,
            200..=299 => ErrorCategory::Process,
            300..=399 => ErrorCategory::Resolution,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns the full error entry with all metadata.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Returns the error message template.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigReadError => "Failed to read configuration file",
            Self::ConfigParseError => "Configuration file contains invalid TOML syntax",
            Self::ConfigValidationError => "Configuration contains invalid values",
            Self::ConfigEnvError => "Environment variable has invalid value",

            Self::AcmeConnectFailed => "Could not connect to acme",
            Self::AcmeProtocolError => "acme rejected a request",
            Self::WindowNotFound => "Window no longer exists",
            Self::WindowMalformed => "Window data could not be parsed",
            Self::EventLogClosed => "acme event log closed",

            Self::StageFailed => "Pipeline tool exited with an error",
            Self::StageSpawnFailed => "Pipeline tool could not be started",
            Self::FormatFileUnreadable => "Saved file could not be read",

            Self::LogWindowFailed => "Project log window could not be opened",
            Self::EditorEnvMissing => "acme did not provide winid or file name",

            Self::InternalTaskPanicked => "Save handler panicked",
            Self::InternalLoggingError => "Logging could not be initialized",
        }
    }

    /// Returns remediation steps for this error.
    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigReadError => &[
                "Check the file permissions of the configuration file",
                "Pass --config to point at a readable file",
            ],
            Self::ConfigParseError => &["Fix the TOML syntax reported above"],
            Self::ConfigValidationError => &[
                "Every enabled stage needs a non-empty command",
                "The ignore marker must not be empty",
            ],
            Self::ConfigEnvError => &["Unset or correct the APH_* variable named above"],

            Self::AcmeConnectFailed => &[
                "Make sure acme is running",
                "Check $NAMESPACE or pass --namespace",
                "With a mounted acme, pass --mount /mnt/acme",
            ],
            Self::AcmeProtocolError => &["Retry the save; report the message if it persists"],
            Self::WindowNotFound => &["The window was closed before the save was handled"],
            Self::WindowMalformed => {
                &["Check that the acme version exposes the standard ctl format"]
            }
            Self::EventLogClosed => &["acme exited; restart aphd after restarting acme"],

            Self::StageFailed => &["Read the tool output in the project's +Errors window"],
            Self::StageSpawnFailed => &[
                "Install the tool or put it on $PATH",
                "Point the stage at another command in the configuration",
            ],
            Self::FormatFileUnreadable => &["Check that the saved file still exists"],

            Self::LogWindowFailed => &["Check that acme can create a window for the project root"],
            Self::EditorEnvMissing => &["Run the command from an acme tag or body (middle click)"],

            Self::InternalTaskPanicked => &["Report the panic message above"],
            Self::InternalLoggingError => &["Check APH_LOG_FILE points at a writable location"],
        }
    }

    /// Returns all defined error codes.
    #[must_use]
    pub fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigValidationError,
            Self::ConfigEnvError,
            Self::AcmeConnectFailed,
            Self::AcmeProtocolError,
            Self::WindowNotFound,
            Self::WindowMalformed,
            Self::EventLogClosed,
            Self::StageFailed,
            Self::StageSpawnFailed,
            Self::FormatFileUnreadable,
            Self::LogWindowFailed,
            Self::EditorEnvMissing,
            Self::InternalTaskPanicked,
            Self::InternalLoggingError,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Configuration and environment errors (E001-E099)
    Config,
    /// acme control-channel errors (E100-E199)
    Control,
    /// External tool errors (E200-E299)
    Process,
    /// Root, window lookup and creation errors (E300-E399)
    Resolution,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable name for the category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Control => "Control",
            Self::Process => "Process",
            Self::Resolution => "Resolution",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "APH-E001")
    pub code: String,
    /// Error category
    pub category: ErrorCategory,
    /// Human-readable error message
    pub message: String,
    /// Steps to remediate the error
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("Remediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numbers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ErrorCode::all() {
            let num = code.code_number();
            assert!(
                seen.insert(num),
                "Duplicate error code number: {} for {:?}",
                num,
                code
            );
        }
    }

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigReadError.code_string(), "APH-E001");
        assert_eq!(ErrorCode::AcmeConnectFailed.code_string(), "APH-E100");
        assert_eq!(ErrorCode::StageFailed.code_string(), "APH-E200");
        assert_eq!(ErrorCode::LogWindowFailed.code_string(), "APH-E300");
        assert_eq!(ErrorCode::InternalTaskPanicked.code_string(), "APH-E500");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::ConfigEnvError.category(), ErrorCategory::Config);
        assert_eq!(ErrorCode::WindowNotFound.category(), ErrorCategory::Control);
        assert_eq!(ErrorCode::StageSpawnFailed.category(), ErrorCategory::Process);
        assert_eq!(
            ErrorCode::EditorEnvMissing.category(),
            ErrorCategory::Resolution
        );
        assert_eq!(
            ErrorCode::InternalLoggingError.category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_every_code_has_remediation() {
        for code in ErrorCode::all() {
            assert!(
                !code.remediation().is_empty(),
                "{:?} has no remediation",
                code
            );
        }
    }

    #[test]
    fn test_format_full_numbers_steps() {
        let full = ErrorCode::StageSpawnFailed.entry().format_full();
        assert!(full.starts_with("[APH-E201] Pipeline tool could not be started"));
        assert!(full.contains("  1. Install the tool"));
        assert!(full.contains("  2. Point the stage"));
    }
}
