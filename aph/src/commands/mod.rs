//! Subcommand implementations.

pub mod env;
pub mod format;
pub mod root;
pub mod save;
pub mod show_config;

use aph_common::errors::{Coded, ErrorCode};
use aph_common::{
    AcmeError, ConfigError, HandlerError, LoggingError, PipelineError, SessionError,
};

use env::EditorEnvError;

/// The catalog code of the first coded error in `err`'s chain.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<HandlerError>()
            .map(Coded::code)
            .or_else(|| cause.downcast_ref::<PipelineError>().map(Coded::code))
            .or_else(|| cause.downcast_ref::<SessionError>().map(Coded::code))
            .or_else(|| cause.downcast_ref::<AcmeError>().map(Coded::code))
            .or_else(|| cause.downcast_ref::<ConfigError>().map(Coded::code))
            .or_else(|| cause.downcast_ref::<EditorEnvError>().map(Coded::code))
            .or_else(|| cause.downcast_ref::<LoggingError>().map(Coded::code))
    })
}

/// Error text for stderr: the message chain, then the catalog entry and
/// its remediation steps.
pub fn describe_error(err: &anyhow::Error) -> String {
    let mut out = format!("aph: {err:#}\n");
    if let Some(code) = error_code(err) {
        let entry = code.entry();
        out.push_str(&format!("  {}\n", entry.format_brief()));
        for step in &entry.remediation {
            out.push_str(&format!("  - {step}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_code_found_through_context() {
        let err = Err::<(), _>(EditorEnvError::MissingWinid)
            .context("reading acme environment")
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::EditorEnvMissing));

        let text = describe_error(&err);
        assert!(text.starts_with("aph: reading acme environment: winid is not set"));
        assert!(text.contains("[APH-E301]"));
    }

    #[test]
    fn test_uncoded_error() {
        let err = anyhow::anyhow!("plain failure");
        assert_eq!(error_code(&err), None);
        assert_eq!(describe_error(&err), "aph: plain failure\n");
    }

    #[test]
    fn test_logging_error_keeps_console_code() {
        let console = LoggingError::Console(AcmeError::Console("no acme".into()));
        let err = anyhow::Error::new(console).context("setting up logging");
        assert_eq!(error_code(&err), Some(ErrorCode::AcmeConnectFailed));

        let file = LoggingError::File {
            path: "/".into(),
            source: std::io::Error::other("no file name"),
        };
        let err = anyhow::Error::new(file).context("setting up logging");
        assert_eq!(error_code(&err), Some(ErrorCode::InternalLoggingError));
    }
}
