//! Profile configuration loading and validation.
//!
//! A profile is a YAML document describing one provisioning run: the plays
//! to execute, how the playbook runner is located and invoked, dependency
//! installation, inventory shape and the navigator settings to generate.
//! Validation collects every problem into a single report so a user sees
//! all of them in one pass.

use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::RsansibleError;
use crate::galaxy::GalaxyConfig;
use crate::navigator::NavigatorConfig;
use crate::pathenv;
use crate::play::Play;

/// Runner command used when the profile does not name one.
pub const DEFAULT_RUNNER_COMMAND: &str = "ansible-navigator";

/// Host alias used in generated inventories.
pub const DEFAULT_HOST_ALIAS: &str = "default";

fn default_command() -> String {
    DEFAULT_RUNNER_COMMAND.to_string()
}

fn default_host_alias() -> String {
    DEFAULT_HOST_ALIAS.to_string()
}

fn default_probe_timeout() -> u64 {
    pathenv::DEFAULT_VERSION_PROBE_TIMEOUT_SECS
}

/// How the playbook runner reaches the machine being provisioned.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Connection {
    /// Provision the machine the runner executes on (`-c local` plus a
    /// localhost inventory entry)
    #[serde(alias = "")]
    #[default]
    Local,
    /// Reach targets through connection details carried by the inventory
    Ssh,
}

/// Build metadata injected into every play through the extra-vars
/// side-channel file.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildContext {
    /// Name of the build this run belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_name: Option<String>,
    /// Type of the builder that produced the machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder_type: Option<String>,
    /// HTTP callback address served to the machine, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_addr: Option<String>,
    /// SSH private key used to reach the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<Utf8PathBuf>,
    /// Target login password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// WinRM password, masked in logged command lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winrm_password: Option<String>,
}

impl BuildContext {
    /// Variables written to the extra-vars side-channel file, keyed
    /// deterministically.
    ///
    /// The private key file and the password are alternatives; when both
    /// are set the key file wins and the password stays out of the file.
    pub fn side_channel_vars(&self) -> std::collections::BTreeMap<String, String> {
        let mut vars = std::collections::BTreeMap::new();
        if let Some(ref name) = self.build_name {
            vars.insert("build_name".to_string(), name.clone());
        }
        if let Some(ref builder) = self.builder_type {
            vars.insert("builder_type".to_string(), builder.clone());
        }
        if let Some(ref addr) = self.http_addr {
            vars.insert("http_addr".to_string(), addr.clone());
        }
        if let Some(ref key) = self.private_key_file {
            vars.insert("ansible_ssh_private_key_file".to_string(), key.to_string());
        } else if let Some(ref password) = self.password {
            vars.insert("ansible_password".to_string(), password.clone());
        }
        vars
    }

    /// Secret values masked wherever a command line or file content is
    /// rendered for the UI.
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = Vec::new();
        if let Some(ref password) = self.password {
            secrets.push(password.clone());
        }
        if let Some(ref password) = self.winrm_password {
            secrets.push(password.clone());
        }
        secrets
    }
}

/// Inventory configuration: a user-supplied file or a generated one.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InventoryConfig {
    /// Existing inventory file to use as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Utf8PathBuf>,
    /// Groups to emit in a generated inventory, one section per group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    /// Host alias used in generated inventory entries
    #[serde(default = "default_host_alias")]
    pub host_alias: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            file: None,
            groups: Vec::new(),
            host_alias: default_host_alias(),
        }
    }
}

impl InventoryConfig {
    fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.file.is_some() && !self.groups.is_empty() {
            problems.push(
                "inventory 'file' and 'groups' are mutually exclusive; configure one or the other"
                    .to_string(),
            );
        }
        if self.host_alias.trim().is_empty() {
            problems.push("inventory 'host_alias' must not be empty".to_string());
        }
        if let Some(ref file) = self.file
            && !file.is_file()
        {
            problems.push(format!("inventory file not found: {}", file));
        }
    }
}

/// One provisioning run: plays plus the settings shared by all of them.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Playbook runner command (default: `ansible-navigator`)
    #[serde(default = "default_command")]
    pub command: String,
    /// Extra directories prepended to PATH for every invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_path: Vec<Utf8PathBuf>,
    /// How the runner reaches the machine being provisioned
    #[serde(default)]
    pub connection: Connection,
    /// Continue with remaining plays after a play fails
    #[serde(default)]
    pub keep_going: bool,
    /// Decode the runner's stdout as a JSON event stream
    #[serde(default)]
    pub structured_output: bool,
    /// Where to persist the run summary (requires `structured_output`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_file: Option<Utf8PathBuf>,
    /// Bound for the `--version` probe of the runner
    #[serde(default = "default_probe_timeout")]
    pub version_probe_timeout_secs: u64,
    /// Build metadata fed into every play
    #[serde(default)]
    pub context: BuildContext,
    /// Inventory shape
    #[serde(default)]
    pub inventory: InventoryConfig,
    /// Role/collection installation settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galaxy: Option<GalaxyConfig>,
    /// Navigator settings to generate or reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigator: Option<NavigatorConfig>,
    /// Plays executed in declaration order
    pub plays: Vec<Play>,
}

impl Profile {
    /// Resolves every relative path in the profile against `base_dir`,
    /// expanding a leading `~` first. Applied once after loading.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        for entry in &mut self.command_path {
            resolve_path(entry, base_dir);
        }
        if let Some(ref mut file) = self.inventory.file {
            resolve_path(file, base_dir);
        }
        if let Some(ref mut file) = self.summary_file {
            resolve_path(file, base_dir);
        }
        if let Some(ref mut key) = self.context.private_key_file {
            resolve_path(key, base_dir);
        }
        if let Some(ref mut galaxy) = self.galaxy {
            galaxy.resolve_paths(base_dir);
        }
        if let Some(ref mut navigator) = self.navigator {
            navigator.resolve_paths(base_dir);
        }
        for play in &mut self.plays {
            play.resolve_paths(base_dir);
        }
    }

    /// Validates the whole profile, collecting every problem into one
    /// report instead of stopping at the first.
    pub fn validate(&self) -> Result<(), RsansibleError> {
        let mut problems = Vec::new();

        if self.command.trim().is_empty() {
            problems.push("'command' must not be empty".to_string());
        }
        if self.version_probe_timeout_secs == 0 {
            problems.push("'version_probe_timeout_secs' must be greater than zero".to_string());
        }
        if self.plays.is_empty() {
            problems.push("at least one play is required".to_string());
        }
        for (index, play) in self.plays.iter().enumerate() {
            play.collect_problems(index, &mut problems);
        }
        self.inventory.collect_problems(&mut problems);
        if let Some(ref galaxy) = self.galaxy {
            galaxy.collect_problems(&mut problems);
        }
        if let Some(ref navigator) = self.navigator {
            navigator.collect_problems(&mut problems);
        }
        if self.summary_file.is_some() && !self.structured_output {
            problems.push("'summary_file' requires 'structured_output: true'".to_string());
        }

        RsansibleError::validation_report(problems)
    }

    /// Secret values masked in every UI-visible rendering.
    pub fn secrets(&self) -> Vec<String> {
        self.context.secrets()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.version_probe_timeout_secs)
    }
}

/// Expands a leading `~` and anchors relative paths at `base_dir`.
pub(crate) fn resolve_path(path: &mut Utf8PathBuf, base_dir: &Utf8Path) {
    let expanded = Utf8PathBuf::from(pathenv::expand_home(path.as_str()));
    *path = if expanded.is_relative() { base_dir.join(&expanded) } else { expanded };
}

/// Loads a profile from a YAML file.
pub fn load_profile(path: &Utf8Path) -> Result<Profile> {
    let file = File::open(path).with_context(|| format!("failed to load file: {}", path))?;
    let reader = BufReader::new(file);
    let profile: Profile = serde_yaml::from_reader(reader)
        .with_context(|| format!("failed to parse yaml: {}", path))?;
    Ok(profile)
}
