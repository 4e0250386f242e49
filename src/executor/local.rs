//! Local command executor implementation.
//!
//! This module provides [`LocalExecutor`], which executes commands
//! using `std::process::Command` with real-time output streaming.

use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use super::pipe::{StreamType, panic_message, read_pipe_to_channel};
use super::{CommandExecutor, CommandSpec, ExecutionResult, OutputSink};

/// Cleans up a child process and its associated reader threads.
///
/// This function kills the child process, waits for it to terminate,
/// and joins all reader threads to prevent resource leaks.
///
/// Called from error paths in [`LocalExecutor::execute()`] to ensure
/// proper cleanup when thread spawning or process waiting fails.
fn cleanup_child_process<I>(child: &mut Child, handles: I)
where
    I: IntoIterator<Item = JoinHandle<()>>,
{
    let pid = child.id();
    if let Err(e) = child.kill() {
        tracing::debug!(pid = pid, "kill returned error (process may have already exited): {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!(pid = pid, "failed to wait for child process after kill: {}", e);
    }
    for handle in handles {
        if let Err(e) = handle.join() {
            tracing::warn!("reader thread panicked during cleanup: {}", panic_message(&*e));
        }
    }
}

/// Maps an exit status to a numeric code.
///
/// Signal-terminated processes are mapped to the conventional `128 + signal`
/// code so callers can treat every outcome uniformly.
#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|s| 128 + s))
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Command executor that runs actual system commands.
///
/// When `dry_run` is true, commands are logged but not executed,
/// and `execute()` returns `Ok(ExecutionResult { code: None })`.
pub struct LocalExecutor {
    pub dry_run: bool,
}

impl CommandExecutor for LocalExecutor {
    fn execute(&self, spec: &CommandSpec, output: &mut dyn OutputSink) -> Result<ExecutionResult> {
        if self.dry_run {
            tracing::info!("dry run: {}", spec.display_line());
            return Ok(ExecutionResult { code: None });
        }

        tracing::info!("executing: {}", spec.display_line());

        let mut command = Command::new(&spec.command);
        command.args(&spec.args);

        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        for (key, value) in &spec.env {
            command.env(key, value);
        }

        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn command `{}`", spec.display_line()))?;

        tracing::trace!("spawned command: {}: pid={}", spec.command, child.id());

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        // Drain both streams in separate threads feeding one channel; the
        // parent relays lines to the sink until both senders hang up, so
        // neither pipe can block the other.
        let (tx, rx) = mpsc::channel::<(StreamType, String)>();
        let stderr_tx = tx.clone();

        let stdout_handle = match thread::Builder::new()
            .name("stdout-reader".to_string())
            .spawn(move || read_pipe_to_channel(stdout_pipe, StreamType::Stdout, tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(crate::error::RsansibleError::execution(
                    spec.display_line(),
                    format!("failed to spawn stdout reader thread: {}", e),
                )
                .into());
            }
        };

        let stderr_handle = match thread::Builder::new()
            .name("stderr-reader".to_string())
            .spawn(move || read_pipe_to_channel(stderr_pipe, StreamType::Stderr, stderr_tx))
        {
            Ok(handle) => handle,
            Err(e) => {
                // Clean up by killing the child process and joining the stdout thread
                cleanup_child_process(&mut child, [stdout_handle]);
                return Err(crate::error::RsansibleError::execution(
                    spec.display_line(),
                    format!("failed to spawn stderr reader thread: {}", e),
                )
                .into());
            }
        };

        // Relay lines until both reader threads hang up their senders
        for (stream, line) in rx {
            match stream {
                StreamType::Stdout => output.stdout_line(&line),
                StreamType::Stderr => output.stderr_line(&line),
            }
        }

        // Both drains are complete; join the readers (with error propagation
        // on panic), then wait for the child to exit
        let mut panicked_streams = Vec::new();
        let handles = [("stdout", stdout_handle), ("stderr", stderr_handle)];
        for (name, handle) in handles {
            if let Err(e) = handle.join() {
                let msg = panic_message(&*e);
                tracing::error!(stream = name, panic = msg, "reader thread panicked");
                panicked_streams.push(format!("{}: {}", name, msg));
            }
        }

        let status = match child.wait() {
            Ok(s) => s,
            Err(e) => {
                cleanup_child_process(&mut child, []);
                return Err(crate::error::RsansibleError::execution(
                    spec.display_line(),
                    format!("failed to wait for command: {}", e),
                )
                .into());
            }
        };

        if !panicked_streams.is_empty() {
            return Err(crate::error::RsansibleError::execution(
                spec.display_line(),
                format!(
                    "reader thread(s) panicked during command execution: {}",
                    panicked_streams.join(", ")
                ),
            )
            .into());
        }

        let code = exit_code(status);
        tracing::trace!("executed command: {}: code={:?}", spec.command, code);

        Ok(ExecutionResult { code })
    }
}
