//! Runner invocation construction.
//!
//! Assembles the argument vector for one `ansible-navigator run`
//! invocation in a fixed order, so command lines are reproducible across
//! runs and map iteration orders. Also renders the extra-vars
//! side-channel JSON, in real and masked forms.
//!
//! The ordering is: `run`, the enforced mode, the play's raw passthrough
//! args, generated play flags, exactly one `--extra-vars=@file`,
//! connection and inventory flags, and the playbook path last. Internal
//! variables always travel through the side-channel file; inline JSON on
//! the command line gets re-interpreted by shells and container
//! entrypoints.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{BuildContext, Connection};
use crate::executor::SECRET_MASK;
use crate::navigator::NavigatorMode;
use crate::play::Play;

/// Subcommand every playbook invocation starts with.
pub const RUN_SUBCOMMAND: &str = "run";

/// Password fields recognized by name, beyond the substring rule.
const KNOWN_PASSWORD_KEYS: &[&str] = &["password", "winrm_password"];

/// Defines how a flag and its value are rendered in command arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagValueStyle {
    /// Render flag and value as separate arguments: `--flag value`.
    Separate,
    /// Render flag and value as a single argument with equals: `--flag=value`.
    Equals,
}

/// Builder for assembling command arguments consistently.
#[derive(Debug, Default)]
pub struct CommandArgsBuilder {
    args: Vec<String>,
}

impl CommandArgsBuilder {
    /// Create a new, empty builder.
    pub fn new() -> Self {
        Self { args: Vec::new() }
    }

    /// Append a raw argument to the builder.
    pub fn push_arg<S: Into<String>>(&mut self, arg: S) {
        self.args.push(arg.into());
    }

    /// Append a flag with no value.
    pub fn push_flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
    }

    /// Append a flag with value if the value is not empty.
    pub fn push_flag_value(&mut self, flag: &str, value: &str, style: FlagValueStyle) {
        if value.is_empty() {
            return;
        }

        match style {
            FlagValueStyle::Separate => {
                self.args.push(flag.to_string());
                self.args.push(value.to_string());
            }
            FlagValueStyle::Equals => {
                self.args.push(format!("{}={}", flag, value));
            }
        }
    }

    /// Append a flag for each non-empty value in `values`.
    pub fn push_flag_values(&mut self, flag: &str, values: &[String], style: FlagValueStyle) {
        for value in values {
            self.push_flag_value(flag, value, style);
        }
    }

    /// Return the collected arguments.
    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

/// Builds the argument vector for one play invocation.
///
/// The enforced mode always lands immediately after `run`, ahead of the
/// play's own `extra_args`, and the playbook path is always the final
/// element. `vars_files` are the play's variable files as the runner
/// sees them, already staged by the caller.
pub fn build_play_args(
    play: &Play,
    mode: Option<NavigatorMode>,
    connection: &Connection,
    inventory: &Utf8Path,
    extra_vars_file: &Utf8Path,
    vars_files: &[Utf8PathBuf],
    playbook: &Utf8Path,
) -> Vec<String> {
    let mut builder = CommandArgsBuilder::new();

    builder.push_arg(RUN_SUBCOMMAND);
    if let Some(mode) = mode {
        builder.push_flag_value("--mode", &mode.to_string(), FlagValueStyle::Separate);
    }

    for arg in &play.extra_args {
        builder.push_arg(arg.clone());
    }

    if play.r#become {
        builder.push_flag("--become");
    }
    if let Some(ref user) = play.become_user {
        builder.push_flag_value("--become-user", user, FlagValueStyle::Separate);
    }
    builder.push_flag_values("--tags", &play.tags, FlagValueStyle::Separate);
    builder.push_flag_values("--skip-tags", &play.skip_tags, FlagValueStyle::Separate);
    // BTreeMap iteration gives ascending key order
    for (key, value) in &play.extra_vars {
        builder.push_flag_value("-e", &format!("{}={}", key, value), FlagValueStyle::Separate);
    }
    for file in vars_files {
        builder.push_flag_value("-e", &format!("@{}", file), FlagValueStyle::Separate);
    }

    builder.push_flag_value("--extra-vars", &format!("@{}", extra_vars_file), FlagValueStyle::Equals);

    if *connection == Connection::Local {
        builder.push_flag_value("-c", "local", FlagValueStyle::Separate);
    }
    builder.push_flag_value("-i", inventory.as_str(), FlagValueStyle::Separate);

    builder.push_arg(playbook.as_str());
    builder.into_args()
}

/// Returns true for keys whose values must be masked in UI renderings.
///
/// A key is secret when it names a recognized password field or contains
/// "password" case-insensitively. Key-file path fields are not secret;
/// the path itself reveals nothing.
fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    KNOWN_PASSWORD_KEYS.contains(&lower.as_str()) || lower.contains("password")
}

/// Renders the side-channel JSON written for the subprocess, with real
/// values.
pub fn render_side_channel(context: &BuildContext) -> Result<String> {
    let vars = context.side_channel_vars();
    serde_json::to_string_pretty(&vars).context("failed to render extra-vars file")
}

/// Renders the side-channel JSON for logs, with secret values masked.
pub fn render_side_channel_masked(context: &BuildContext) -> Result<String> {
    let vars: BTreeMap<String, String> = context
        .side_channel_vars()
        .into_iter()
        .map(|(key, value)| {
            let value = if is_secret_key(&key) { SECRET_MASK.to_string() } else { value };
            (key, value)
        })
        .collect();
    serde_json::to_string_pretty(&vars).context("failed to render extra-vars preview")
}
