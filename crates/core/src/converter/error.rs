//! Error types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a conversion failure.
///
/// Callers branch on this and nothing else; the remaining error fields are
/// diagnostics for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No route exists for the requested pair.
    UnsupportedConversion,
    /// A subprocess or library reported an error.
    ExternalToolFailure,
    /// The tool exited cleanly but no artifact could be found.
    OutputNotFound,
    /// The source content or request is malformed.
    InvalidInput,
    /// An enforced wall-clock limit was exceeded.
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedConversion => "unsupported_conversion",
            Self::ExternalToolFailure => "external_tool_failure",
            Self::OutputNotFound => "output_not_found",
            Self::InvalidInput => "invalid_input",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during conversion.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// No rule in the conversion matrix matches.
    #[error("Unsupported conversion: {from} to {to} ({media_class})")]
    UnsupportedConversion {
        media_class: String,
        from: String,
        to: String,
    },

    /// Malformed request or source content.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// External process or library failed.
    #[error("{reason}")]
    ExternalToolFailure {
        reason: String,
        command: Option<String>,
        stderr: Option<String>,
    },

    /// Tool finished but its artifact is missing.
    #[error("Output not found: {expected}")]
    OutputNotFound {
        expected: String,
        command: Option<String>,
        /// First entries of the output directory, for debugging.
        directory_sample: Vec<String>,
    },

    /// Wall-clock limit exceeded.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout {
        timeout_secs: u64,
        command: Option<String>,
    },

    /// I/O error while writing an artifact.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConversionError {
    /// Creates an unsupported conversion error.
    pub fn unsupported(
        media_class: impl fmt::Display,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::UnsupportedConversion {
            media_class: media_class.to_string(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Creates an invalid input error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates an external tool failure without command details.
    pub fn external(reason: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            reason: reason.into(),
            command: None,
            stderr: None,
        }
    }

    /// Creates an external tool failure carrying the invocation and its stderr.
    pub fn tool_failed(
        reason: impl Into<String>,
        command: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self::ExternalToolFailure {
            reason: reason.into(),
            command: Some(command.into()),
            stderr: stderr.filter(|s| !s.trim().is_empty()),
        }
    }

    /// Creates an output not found error.
    pub fn output_not_found(expected: impl Into<String>) -> Self {
        Self::OutputNotFound {
            expected: expected.into(),
            command: None,
            directory_sample: Vec::new(),
        }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attaches the external command to errors that can carry one.
    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        match &mut self {
            Self::ExternalToolFailure { command, .. }
            | Self::OutputNotFound { command, .. }
            | Self::Timeout { command, .. } => *command = Some(cmd.into()),
            _ => {}
        }
        self
    }

    /// The error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::ExternalToolFailure { .. } | Self::Io { .. } => ErrorKind::ExternalToolFailure,
            Self::OutputNotFound { .. } => ErrorKind::OutputNotFound,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// The external invocation that produced this error, if any.
    pub fn underlying_command(&self) -> Option<&str> {
        match self {
            Self::ExternalToolFailure { command, .. }
            | Self::OutputNotFound { command, .. }
            | Self::Timeout { command, .. } => command.as_deref(),
            _ => None,
        }
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ExternalToolFailure | ErrorKind::Timeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            ConversionError::unsupported("document", "pdf", "mp4").kind(),
            ErrorKind::UnsupportedConversion
        );
        assert_eq!(
            ConversionError::invalid_input("bad").kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            ConversionError::io("/x", std::io::Error::other("disk full")).kind(),
            ErrorKind::ExternalToolFailure
        );
        assert_eq!(
            ConversionError::output_not_found("a.pdf").kind(),
            ErrorKind::OutputNotFound
        );
    }

    #[test]
    fn test_with_command() {
        let err = ConversionError::external("boom").with_command("soffice --headless");
        assert_eq!(err.underlying_command(), Some("soffice --headless"));

        let err = ConversionError::invalid_input("x").with_command("ignored");
        assert_eq!(err.underlying_command(), None);
    }

    #[test]
    fn test_tool_failed_drops_blank_stderr() {
        let err = ConversionError::tool_failed("exit 1", "python3 x.py", Some("  \n".into()));
        match err {
            ConversionError::ExternalToolFailure { stderr, .. } => assert!(stderr.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_retryable() {
        let timeout = ConversionError::Timeout {
            timeout_secs: 300,
            command: None,
        };
        assert!(timeout.is_retryable());
        assert!(!ConversionError::invalid_input("x").is_retryable());
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::OutputNotFound.to_string(), "output_not_found");
    }
}
