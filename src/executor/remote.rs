//! Remote command executor implementation.
//!
//! This module provides [`RemoteExecutor`], which renders a [`CommandSpec`]
//! into a single POSIX shell line and hands it to a [`Communicator`] for
//! transport. The transport (SSH, WinRM, a container exec bridge) stays
//! behind the trait so the execution loop never needs to know which one
//! is in play.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use camino::Utf8Path;

use super::{CommandExecutor, CommandSpec, ExecutionResult, OutputSink};

/// Transport used by [`RemoteExecutor`] to reach the target machine.
///
/// `run` must stream output line by line into the sink as it arrives and
/// return the remote exit code. A remote shell reports `127` when the
/// command is not found, which callers surface with a dedicated message.
pub trait Communicator: Send + Sync {
    /// Runs a shell command on the remote machine, relaying output.
    fn run(&self, command: &str, output: &mut dyn OutputSink) -> Result<i32>;

    /// Uploads a local file to the given remote path.
    fn upload(&self, local: &Utf8Path, remote: &str) -> Result<()>;
}

/// Command executor that runs commands on a remote machine through a
/// [`Communicator`].
///
/// The spec's working directory and environment overlay are encoded into
/// the shell line itself since the transport only carries a single string.
pub struct RemoteExecutor {
    communicator: Arc<dyn Communicator>,
    pub dry_run: bool,
}

impl RemoteExecutor {
    pub fn new(communicator: Arc<dyn Communicator>, dry_run: bool) -> Self {
        Self { communicator, dry_run }
    }

    /// Renders the command as one POSIX shell line.
    ///
    /// Layout: `cd <cwd> && KEY=VALUE ... <command> <args>`. Every argv
    /// element and environment value is quoted so embedded spaces and
    /// shell metacharacters survive the trip through the remote shell.
    pub(crate) fn shell_command(spec: &CommandSpec) -> String {
        let mut parts: Vec<String> = Vec::new();

        for (key, value) in &spec.env {
            parts.push(format!("{}={}", key, quote(value)));
        }

        parts.push(quote(&spec.command).into_owned());
        for arg in &spec.args {
            parts.push(quote(arg).into_owned());
        }

        let invocation = parts.join(" ");
        match spec.cwd {
            Some(ref cwd) => format!("cd {} && {}", quote(cwd.as_str()), invocation),
            None => invocation,
        }
    }
}

fn quote(text: &str) -> Cow<'_, str> {
    shell_words::quote(text)
}

impl CommandExecutor for RemoteExecutor {
    fn execute(&self, spec: &CommandSpec, output: &mut dyn OutputSink) -> Result<ExecutionResult> {
        if self.dry_run {
            tracing::info!("dry run (remote): {}", spec.display_line());
            return Ok(ExecutionResult { code: None });
        }

        tracing::info!("executing (remote): {}", spec.display_line());

        let command = Self::shell_command(spec);
        let code = self.communicator.run(&command, output)?;

        tracing::trace!("executed remote command: {}: code={}", spec.command, code);

        Ok(ExecutionResult { code: Some(code) })
    }
}
