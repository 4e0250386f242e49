//! Domain-specific error types for rsansible.
//!
//! This module defines `RsansibleError`, a `thiserror`-based enum that
//! provides typed error variants for common failure modes. Public API
//! functions return `Result<T, RsansibleError>` for programmatic error
//! handling, while trait boundaries continue to use `anyhow::Result`.
//!
//! `RsansibleError` implements `Into<anyhow::Error>`, so the `?` operator
//! converts it automatically at trait boundaries that return `anyhow::Result`.

use std::io;

/// Formats an IO error kind into a human-readable message.
///
/// Provides consistent, user-friendly messages for common IO error kinds
/// (e.g., "I/O error: not found") instead of the OS-level messages
/// (e.g., "No such file or directory (os error 2)"). For unrecognized
/// error kinds, falls back to including the OS-level error message
/// directly (e.g., "I/O error: connection refused").
pub(crate) fn io_error_kind_message(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "I/O error: not found".to_string(),
        io::ErrorKind::PermissionDenied => "I/O error: permission denied".to_string(),
        io::ErrorKind::IsADirectory => "I/O error: is a directory".to_string(),
        _ => format!("I/O error: {}", err),
    }
}

/// Domain-specific error type for rsansible.
///
/// Provides typed variants for common failure modes, enabling callers
/// to match on error kinds programmatically rather than parsing error
/// message strings.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RsansibleError {
    /// A validation constraint was violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// A playbook-runner or installer invocation failed (non-zero exit,
    /// spawn failure, wait failure, thread panic, etc.).
    #[error("command execution failed: {command}: {status}")]
    Execution {
        /// The command that was executed, with secrets masked.
        command: String,
        /// Human-readable reason for the failure: exit code, signal information,
        /// or a description of the internal error (e.g., thread spawn failure).
        status: String,
    },

    /// The execution environment is unusable: the playbook runner is missing,
    /// resolves to an unresolvable version-manager shim, or hangs on probing.
    /// Messages carry remediation guidance.
    #[error("environment error: {0}")]
    Environment(String),

    /// A configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O operation failed with contextual information.
    #[error("{context}: {message}")]
    Io {
        /// What was being done when the error occurred.
        ///
        /// This is either a file path (e.g., `"/etc/profile.yml"`) or an
        /// operation description with a path (e.g., `"failed to read
        /// requirements file: /path/to/requirements.yml"`). Combined with
        /// `message` in the Display format: `"{context}: {message}"`.
        context: String,
        /// Human-readable description of the I/O failure, derived from
        /// [`io_error_kind_message`] for consistent formatting across the codebase.
        message: String,
        /// The underlying I/O error, preserved for programmatic inspection
        /// (e.g., `source.kind() == ErrorKind::NotFound`).
        #[source]
        source: std::io::Error,
    },
}

impl RsansibleError {
    /// Creates an `Io` variant with the `message` field automatically derived
    /// from the `source` via [`io_error_kind_message`].
    ///
    /// This is the preferred way to construct `Io` errors, ensuring that
    /// the `message` field is always consistent with the `source`.
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: io_error_kind_message(&source),
            source,
        }
    }

    /// Creates an `Execution` variant from a command description and status.
    pub(crate) fn execution(command: impl Into<String>, status: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            status: status.into(),
        }
    }

    /// Folds every problem found during profile validation into a single
    /// `Validation` report, so a user sees all of them in one pass.
    ///
    /// Returns `Ok(())` when `problems` is empty.
    pub(crate) fn validation_report(problems: Vec<String>) -> Result<(), Self> {
        match problems.len() {
            0 => Ok(()),
            1 => Err(Self::Validation(problems.into_iter().next().unwrap_or_default())),
            n => Err(Self::Validation(format!(
                "{} problems found in profile:\n  - {}",
                n,
                problems.join("\n  - ")
            ))),
        }
    }
}
