//! Command execution abstraction for rsansible.
//!
//! This module provides:
//! - [`CommandSpec`]: Specification for playbook-runner invocations
//! - [`ExecutionResult`]: Result of command execution
//! - [`OutputSink`]: Destination for streamed subprocess output
//! - [`CommandExecutor`]: Trait for command execution strategies
//! - [`LocalExecutor`]: Production implementation using `std::process::Command`
//! - [`RemoteExecutor`]: Implementation shipping commands over a [`Communicator`]
//!
//! Both executors honor the same contract: stdout and stderr are drained
//! concurrently and relayed line-by-line to the sink, the full command is
//! echoed once to the log with secrets masked, and the exit code is mapped
//! into an [`ExecutionResult`].

mod local;
mod pipe;
mod remote;

use anyhow::Result;
use camino::Utf8PathBuf;

use crate::error::RsansibleError;

pub use local::LocalExecutor;
pub use pipe::LogSink;
pub use remote::{Communicator, RemoteExecutor};

/// Fixed mask substituted for secret values in any UI-visible rendering.
pub const SECRET_MASK: &str = "*****";

/// Exit code shells report when the command does not exist on PATH.
const EXIT_NOT_FOUND: i32 = 127;

/// Formats string arguments into a space-separated, debug-quoted string.
///
/// Used by error messages and dry-run output to consistently format
/// command arguments (e.g., `"run" "--mode" "stdout" "site.yml"`).
pub(crate) fn format_command_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replaces every known secret value occurring in `text` with [`SECRET_MASK`].
///
/// Secrets never appear in the argument vector itself; they travel via the
/// environment or generated files. Masking the echoed command line anyway
/// keeps any future interpolation path from leaking them.
pub(crate) fn mask_secrets(text: &str, secrets: &[String]) -> String {
    let mut masked = text.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            masked = masked.replace(secret.as_str(), SECRET_MASK);
        }
    }
    masked
}

/// Specification for a command to be executed.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// The command to execute (e.g., "ansible-navigator")
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (optional, defaults to current directory)
    pub cwd: Option<Utf8PathBuf>,
    /// Environment overlay applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Secret values that must never appear in logged command lines
    pub secrets: Vec<String>,
}

impl CommandSpec {
    /// Creates a new CommandSpec with command and args.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: Vec::new(),
            secrets: Vec::new(),
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds multiple environment variables.
    ///
    /// Accepts any iterator of key-value pairs that can be converted into strings,
    /// such as `Vec<(String, String)>`, `&[(&str, &str)]`, or `HashMap<String, String>`.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Registers secret values to mask in logged command lines.
    ///
    /// Empty values are skipped; masking an empty string would corrupt
    /// the whole rendering.
    #[must_use]
    pub fn with_secrets<I, S>(mut self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets
            .extend(secrets.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()));
        self
    }

    /// Formats the full command for logging, with known secrets masked.
    pub fn display_line(&self) -> String {
        let line = format!("{} {}", self.command, format_command_args(&self.args));
        mask_secrets(&line, &self.secrets)
    }
}

/// Result of command execution.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Exit code of the command (None in dry-run mode).
    ///
    /// Signal-terminated processes are mapped to the conventional
    /// `128 + signal` code by [`LocalExecutor`].
    pub code: Option<i32>,
}

impl ExecutionResult {
    /// Returns true if the command executed successfully.
    ///
    /// In dry-run mode (code is None), this always returns true.
    pub fn success(&self) -> bool {
        self.code.is_none_or(|c| c == 0)
    }

    /// Returns true if the exit code indicates the command was not found
    /// on PATH.
    pub fn command_not_found(&self) -> bool {
        self.code == Some(EXIT_NOT_FOUND)
    }
}

/// Receives subprocess output lines as they are produced.
///
/// One line at a time, without the trailing newline. Implementations decide
/// whether to relay lines to the log or decode them as structured events.
pub trait OutputSink {
    /// Called for each stdout line.
    fn stdout_line(&mut self, line: &str);

    /// Called for each stderr line.
    fn stderr_line(&mut self, line: &str);
}

/// Trait for command execution.
///
/// Implementations must be `Send + Sync` to allow the executor to be shared
/// across threads (e.g., when used with `Arc<dyn CommandExecutor>` while
/// reader threads stream output during command execution).
pub trait CommandExecutor: Send + Sync {
    /// Executes the described command, feeding produced output lines to
    /// `output`.
    fn execute(&self, spec: &CommandSpec, output: &mut dyn OutputSink) -> Result<ExecutionResult>;
}

/// Checks the execution result and returns an error if the command failed.
///
/// Handles four cases:
/// - Exit code 127: returns an `Execution` error with a "command not found
///   on PATH" diagnostic, distinct from a generic failure
/// - Other non-zero exit code: returns an `Execution` error with the code
/// - No exit code in non-dry-run mode: returns an `Execution` error
///   (e.g., killed by a signal the executor could not map)
/// - Success or dry-run with no code: returns `Ok(())`
pub(crate) fn check_result(
    result: &ExecutionResult,
    spec: &CommandSpec,
    dry_run: bool,
) -> Result<(), RsansibleError> {
    match result.code {
        Some(0) => Ok(()),
        Some(EXIT_NOT_FOUND) => Err(RsansibleError::execution(
            spec.display_line(),
            format!(
                "exit status {}: '{}' was not found on PATH inside the execution context. \
                Verify the tool is installed there, or extend 'command_path' in the profile",
                EXIT_NOT_FOUND, spec.command
            ),
        )),
        Some(code) => Err(RsansibleError::execution(
            spec.display_line(),
            format!("exit status: {}", code),
        )),
        None if !dry_run => Err(RsansibleError::execution(
            spec.display_line(),
            "process exited without status (possibly killed by signal)",
        )),
        None => Ok(()),
    }
}
