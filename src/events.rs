//! Structured event stream parsing.
//!
//! When structured output is enabled the playbook runner emits JSON event
//! objects on stdout, one or more per line. This module decodes them,
//! aggregates a [`RunSummary`] and optionally persists the summary as
//! pretty-printed JSON after the run.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::RsansibleError;
use crate::executor::OutputSink;

/// One decoded event from the runner's stdout stream.
///
/// Only `event` is required; every other field is optional and unknown
/// fields are ignored so new runner versions do not break decoding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnsibleEvent {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Aggregated outcome of one structured run.
///
/// Mutated while events stream in, immutable once the subprocess exits.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub plays_run: u64,
    pub tasks_total: u64,
    pub tasks_failed: u64,
    pub failed_events: Vec<AnsibleEvent>,
}

impl RunSummary {
    /// Applies one event to the counters. Unrecognized kinds are ignored.
    pub fn record(&mut self, event: AnsibleEvent) {
        match event.event.as_str() {
            "playbook_on_start" => self.plays_run += 1,
            "runner_on_ok" | "runner_on_skipped" => self.tasks_total += 1,
            "runner_on_failed" | "runner_on_unreachable" => {
                self.tasks_total += 1;
                self.tasks_failed += 1;
                self.failed_events.push(event);
            }
            _ => {}
        }
    }

    /// Decodes every JSON object on one stdout line into the summary.
    ///
    /// Handles both newline-delimited and concatenated objects. A malformed
    /// object ends decoding of that line only; with `verbose` set the skip
    /// is logged, otherwise it is silent.
    pub fn consume_line(&mut self, line: &str, verbose: bool) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        let mut stream = serde_json::Deserializer::from_str(trimmed).into_iter::<AnsibleEvent>();
        loop {
            match stream.next() {
                Some(Ok(event)) => {
                    log_event(&event);
                    self.record(event);
                }
                Some(Err(e)) => {
                    if verbose {
                        tracing::warn!("skipping malformed event JSON: {}", e);
                    }
                    break;
                }
                None => break,
            }
        }
    }

    /// Persists the summary as pretty-printed JSON.
    ///
    /// Callers treat a failure here as a warning, not a run failure.
    pub fn write_json(&self, path: &Utf8Path) -> Result<(), RsansibleError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            RsansibleError::Config(format!("failed to serialize run summary: {}", e))
        })?;
        std::fs::write(path, json)
            .map_err(|e| RsansibleError::io(format!("failed to write run summary to {}", path), e))
    }
}

fn log_event(event: &AnsibleEvent) {
    let task = event.task.as_deref().unwrap_or("-");
    let host = event.host.as_deref().unwrap_or("-");
    match event.event.as_str() {
        "runner_on_failed" | "runner_on_unreachable" => {
            tracing::warn!(host = host, task = task, "{}", event.event);
        }
        "playbook_on_start" | "runner_on_ok" | "runner_on_skipped" => {
            tracing::info!(host = host, task = task, "{}", event.event);
        }
        _ => {
            tracing::debug!(host = host, task = task, "{}", event.event);
        }
    }
}

/// [`OutputSink`] that feeds stdout lines through the event decoder.
///
/// Stderr is not part of the event stream and is relayed as-is.
pub struct EventSink<'a> {
    summary: &'a mut RunSummary,
    verbose: bool,
}

impl<'a> EventSink<'a> {
    pub fn new(summary: &'a mut RunSummary, verbose: bool) -> Self {
        Self { summary, verbose }
    }
}

impl OutputSink for EventSink<'_> {
    fn stdout_line(&mut self, line: &str) {
        self.summary.consume_line(line, self.verbose);
    }

    fn stderr_line(&mut self, line: &str) {
        tracing::warn!("{}", line.trim_end());
    }
}
