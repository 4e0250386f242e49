//! Play definitions and target resolution.
//!
//! A play targets either a playbook file (`.yml`/`.yaml` suffix) or a
//! dotted role reference. Role targets get a minimal playbook synthesized
//! around them for the duration of one invocation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::config::resolve_path;

/// One unit of work: a playbook file or a role to apply, with its own
/// flags and variables.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Play {
    /// Display name; falls back to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Playbook file path or dotted role reference
    pub target: String,
    /// User-supplied variables, passed as `-e key=value` in sorted key order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_vars: BTreeMap<String, String>,
    /// Tags to run, one `--tags` flag per entry in declared order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Tags to skip, one `--skip-tags` flag per entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_tags: Vec<String>,
    /// Variable files, passed as `-e @file` in declared order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vars_files: Vec<Utf8PathBuf>,
    /// Escalate privileges for this play
    #[serde(default)]
    pub r#become: bool,
    /// User to escalate to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub become_user: Option<String>,
    /// Raw tokens appended to the runner invocation verbatim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

/// Classified play target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayTarget {
    /// A playbook file invoked directly
    Playbook(Utf8PathBuf),
    /// A role reference wrapped in a synthesized playbook
    Role(String),
}

impl PlayTarget {
    /// Classifies by filename suffix only; content is never inspected.
    pub fn classify(target: &str) -> Self {
        if target.ends_with(".yml") || target.ends_with(".yaml") {
            Self::Playbook(Utf8PathBuf::from(target))
        } else {
            Self::Role(target.to_string())
        }
    }
}

/// Serialization shape for a synthesized role playbook.
#[derive(Serialize)]
struct SynthesizedPlay {
    hosts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#become: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    become_user: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    vars_files: Vec<Utf8PathBuf>,
    roles: Vec<RoleEntry>,
}

#[derive(Serialize)]
struct RoleEntry {
    role: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    vars: BTreeMap<String, String>,
}

impl Play {
    /// Returns the display name for this play.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.target)
    }

    /// Classifies this play's target.
    pub fn target(&self) -> PlayTarget {
        PlayTarget::classify(&self.target)
    }

    /// Resolves relative paths against the profile directory. Role
    /// references are identifiers, not paths, and stay untouched.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let PlayTarget::Playbook(_) = self.target() {
            let mut target = Utf8PathBuf::from(&self.target);
            resolve_path(&mut target, base_dir);
            self.target = target.into_string();
        }
        for file in &mut self.vars_files {
            resolve_path(file, base_dir);
        }
    }

    /// Collects validation problems, labeled with the play's position.
    pub fn collect_problems(&self, index: usize, problems: &mut Vec<String>) {
        let label = format!("play {} ('{}')", index + 1, self.name());

        if self.target.trim().is_empty() {
            problems.push(format!("play {}: 'target' must not be empty", index + 1));
            return;
        }
        if let PlayTarget::Playbook(ref path) = self.target()
            && !path.is_file()
        {
            problems.push(format!("{}: playbook not found: {}", label, path));
        }
        for file in &self.vars_files {
            if !file.is_file() {
                problems.push(format!("{}: vars file not found: {}", label, file));
            }
        }
    }

    /// Renders the playbook text wrapping a role target: one play against
    /// all hosts, the play's flags and variables attached to the role
    /// entry. `vars_files` are the play's variable files as the runner
    /// sees them, already staged by the caller. Variable keys come out
    /// sorted so the output is reproducible.
    pub fn role_playbook_yaml(&self, role: &str, vars_files: &[Utf8PathBuf]) -> Result<String> {
        let play = SynthesizedPlay {
            hosts: "all".to_string(),
            r#become: self.r#become.then_some(true),
            become_user: self.become_user.clone(),
            vars_files: vars_files.to_vec(),
            roles: vec![RoleEntry {
                role: role.to_string(),
                vars: self.extra_vars.clone(),
            }],
        };

        let yaml = serde_yaml::to_string(&vec![play])
            .with_context(|| format!("failed to render playbook for role '{}'", role))?;
        Ok(format!("---\n{}", yaml))
    }
}
