//! Internal utilities for streaming command output.
//!
//! This module handles reading from stdout/stderr pipes and forwarding
//! complete lines to the parent thread, which feeds them to an
//! [`OutputSink`](super::OutputSink) in real time during command execution.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::Sender;

use super::OutputSink;

/// Type of output stream the relayed line originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum StreamType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Extracts a human-readable message from a thread panic.
///
/// The returned `&str` borrows from the panic payload, so it is valid
/// as long as the `err` reference is valid.
pub(super) fn panic_message(err: &(dyn std::any::Any + Send)) -> &str {
    err.downcast_ref::<&str>()
        .copied()
        .or_else(|| err.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// Reads from a pipe and forwards each line to the parent over `tx`.
///
/// - Lines are sent without the trailing newline; trailing CR is trimmed
///   to handle CRLF line endings
/// - Binary data uses lossy UTF-8 conversion
/// - I/O errors stop reading but don't fail command execution
///   (output streaming is best-effort; command success is determined by exit status)
/// - A closed receiver stops reading silently (the parent gave up first)
/// - `None` pipe logs an error and returns (unexpected if `Stdio::piped()` was set)
pub(super) fn read_pipe_to_channel<R: Read>(
    pipe: Option<R>,
    stream_type: StreamType,
    tx: Sender<(StreamType, String)>,
) {
    let Some(pipe) = pipe else {
        tracing::error!(
            stream = %stream_type,
            "pipe was None (unexpected: Stdio::piped() was set), no output will be captured"
        );
        return;
    };

    let mut reader = BufReader::new(pipe);
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break, // EOF
            Ok(_) => {
                let content = line_buf.strip_suffix(b"\n").unwrap_or(&line_buf);
                let text = String::from_utf8_lossy(content);
                let line = text.trim_end_matches('\r').to_string();
                if tx.send((stream_type, line)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!(stream = %stream_type, error = %e, "I/O error, stopping read");
                break;
            }
        }
    }
}

/// Default sink relaying subprocess output to the log.
///
/// Each stdout line is an informational message and each stderr line an
/// error-stream message, trimmed of trailing whitespace. INFO/WARN levels
/// are chosen so users can see playbook-runner progress output in real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn stdout_line(&mut self, line: &str) {
        tracing::info!(stream = "stdout", "{}", line.trim_end());
    }

    fn stderr_line(&mut self, line: &str) {
        tracing::warn!(stream = "stderr", "{}", line.trim_end());
    }
}
