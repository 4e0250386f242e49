//! Navigator settings generation.
//!
//! The `navigator` profile section either references existing
//! configuration files or describes settings to generate: a navigator
//! YAML file (the tool's own schema, hyphenated keys) and an ansible.cfg
//! built from structured override sections. When an execution environment
//! is enabled, temp-directory defaults are filled in exactly once for
//! fields the user left unset.

pub mod ansible_cfg;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use strum::Display;

pub use ansible_cfg::AnsibleCfg;

use crate::config::resolve_path;

/// Temp directory used inside execution environments when the user sets
/// none. Container users often lack a writable HOME, which breaks
/// ansible's default of `~/.ansible/tmp`.
pub const EE_DEFAULT_TMP: &str = "/tmp/.ansible/tmp";

const ENV_REMOTE_TMP: &str = "ANSIBLE_REMOTE_TMP";
const ENV_LOCAL_TMP: &str = "ANSIBLE_LOCAL_TEMP";

/// Navigator output mode enforced with `--mode` on every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NavigatorMode {
    Stdout,
    Interactive,
}

/// `environment-variables` block of an execution environment.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentVariables {
    /// Variables passed through from the host
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pass: Vec<String>,
    /// Variables set inside the environment, emitted in sorted key order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PullSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// `execution-environment` settings block.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExecutionEnvironment {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<EnvironmentVariables>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Utf8PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PlaybookArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<Utf8PathBuf>,
}

/// Settings rendered into the generated navigator YAML file.
///
/// Keys follow the navigator's own schema, so this subtree is written in
/// the profile exactly as it will appear under `ansible-navigator:` in
/// the generated file. Paths inside it may point into the execution
/// environment and are never resolved against the profile directory.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct NavigatorSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_environment: Option<ExecutionEnvironment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playbook_artifact: Option<PlaybookArtifact>,
}

#[derive(Serialize)]
struct NavigatorDocument<'a> {
    #[serde(rename = "ansible-navigator")]
    settings: &'a NavigatorSettings,
}

impl NavigatorSettings {
    /// Returns true when an execution environment is enabled.
    pub fn ee_enabled(&self) -> bool {
        self.execution_environment.as_ref().is_some_and(|ee| ee.enabled)
    }

    /// Renders the full navigator YAML document.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&NavigatorDocument { settings: self })
            .context("failed to render navigator settings")
    }
}

/// The `navigator` profile section.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NavigatorConfig {
    /// Existing navigator settings file, exported via
    /// `ANSIBLE_NAVIGATOR_CONFIG`. Mutually exclusive with `settings`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<Utf8PathBuf>,
    /// Mode enforced with `--mode` on every invocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<NavigatorMode>,
    /// Settings to render into a generated navigator file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<NavigatorSettings>,
    /// Existing ansible.cfg, exported via `ANSIBLE_CONFIG`. Mutually
    /// exclusive with `ansible_cfg`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_config_file: Option<Utf8PathBuf>,
    /// Structured sections rendered into a generated ansible.cfg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ansible_cfg: Option<AnsibleCfg>,
}

impl NavigatorConfig {
    pub fn ee_enabled(&self) -> bool {
        self.settings.as_ref().is_some_and(NavigatorSettings::ee_enabled)
    }

    /// Resolves host-side file references. Paths inside `settings` stay
    /// untouched since they may be execution-environment paths.
    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let Some(ref mut file) = self.config_file {
            resolve_path(file, base_dir);
        }
        if let Some(ref mut file) = self.ansible_config_file {
            resolve_path(file, base_dir);
        }
    }

    pub fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.config_file.is_some() && self.settings.is_some() {
            problems.push(
                "navigator 'config_file' and 'settings' are mutually exclusive; \
                 reference an existing file or describe one to generate, not both"
                    .to_string(),
            );
        }
        if self.ansible_config_file.is_some() && self.ansible_cfg.is_some() {
            problems.push(
                "navigator 'ansible_config_file' and 'ansible_cfg' are mutually exclusive; \
                 reference an existing file or describe one to generate, not both"
                    .to_string(),
            );
        }
        if let Some(ref file) = self.config_file
            && !file.is_file()
        {
            problems.push(format!("navigator config file not found: {}", file));
        }
        if let Some(ref file) = self.ansible_config_file
            && !file.is_file()
        {
            problems.push(format!("ansible config file not found: {}", file));
        }
    }

    /// Fills execution-environment temp-directory defaults, once, at
    /// prepare time.
    ///
    /// Four slots are defaulted independently: `remote_tmp` and
    /// `local_tmp` in the generated ansible.cfg `[defaults]` section, and
    /// `ANSIBLE_REMOTE_TMP` / `ANSIBLE_LOCAL_TEMP` in the environment's
    /// set-variables. A slot is skipped when the user already set it or
    /// listed the corresponding variable as passed through from the host.
    pub fn apply_ee_defaults(&mut self) {
        if !self.ee_enabled() {
            return;
        }

        let passed: Vec<String> = self
            .settings
            .as_ref()
            .and_then(|s| s.execution_environment.as_ref())
            .and_then(|ee| ee.environment_variables.as_ref())
            .map(|vars| vars.pass.clone())
            .unwrap_or_default();
        let is_passed = |name: &str| passed.iter().any(|p| p == name);

        if self.ansible_config_file.is_none() {
            let cfg = self.ansible_cfg.get_or_insert_with(AnsibleCfg::default);
            if !is_passed(ENV_REMOTE_TMP) {
                cfg.set_if_unset("defaults", "remote_tmp", EE_DEFAULT_TMP);
            }
            if !is_passed(ENV_LOCAL_TMP) {
                cfg.set_if_unset("defaults", "local_tmp", EE_DEFAULT_TMP);
            }
        }

        if let Some(ref mut settings) = self.settings
            && let Some(ref mut ee) = settings.execution_environment
        {
            let vars = ee.environment_variables.get_or_insert_with(EnvironmentVariables::default);
            for name in [ENV_REMOTE_TMP, ENV_LOCAL_TMP] {
                if !vars.pass.iter().any(|p| p == name) && !vars.set.contains_key(name) {
                    vars.set.insert(name.to_string(), EE_DEFAULT_TMP.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(yaml: &str) -> NavigatorSettings {
        serde_yaml::from_str(yaml).expect("settings should parse")
    }

    fn ee_config(yaml: &str) -> NavigatorConfig {
        serde_yaml::from_str(yaml).expect("config should parse")
    }

    #[test]
    fn test_to_yaml_uses_navigator_schema_keys() {
        let settings = settings(
            "execution-environment:\n  enabled: true\n  image: quay.io/ansible/creator-ee\n  pull:\n    policy: missing\nlogging:\n  level: debug\n",
        );
        let yaml = settings.to_yaml().unwrap();

        assert!(yaml.contains("ansible-navigator:"));
        assert!(yaml.contains("execution-environment:"));
        assert!(yaml.contains("image: quay.io/ansible/creator-ee"));
        assert!(yaml.contains("policy: missing"));
        assert!(!yaml.contains("execution_environment"));
    }

    #[test]
    fn test_to_yaml_is_idempotent() {
        let settings = settings("logging:\n  level: debug\n");
        assert_eq!(settings.to_yaml().unwrap(), settings.to_yaml().unwrap());
    }

    #[test]
    fn test_to_yaml_round_trips_set_keys() {
        let settings = settings(
            "execution-environment:\n  enabled: true\n  environment-variables:\n    pass:\n      - SSH_AUTH_SOCK\n    set:\n      FOO: bar\nplaybook-artifact:\n  enable: false\n  save-as: /tmp/artifact.json\n",
        );
        let yaml = settings.to_yaml().unwrap();

        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let root = &value["ansible-navigator"];
        assert_eq!(root["execution-environment"]["enabled"], true);
        assert_eq!(
            root["execution-environment"]["environment-variables"]["pass"][0],
            "SSH_AUTH_SOCK"
        );
        assert_eq!(root["execution-environment"]["environment-variables"]["set"]["FOO"], "bar");
        assert_eq!(root["playbook-artifact"]["enable"], false);
        assert_eq!(root["playbook-artifact"]["save-as"], "/tmp/artifact.json");
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(NavigatorMode::Stdout.to_string(), "stdout");
        assert_eq!(NavigatorMode::Interactive.to_string(), "interactive");
    }

    #[test]
    fn test_config_file_and_settings_are_exclusive() {
        let config = NavigatorConfig {
            config_file: Some(Utf8PathBuf::from("/tmp/nav.yml")),
            settings: Some(NavigatorSettings::default()),
            ..Default::default()
        };
        let mut problems = Vec::new();
        config.collect_problems(&mut problems);
        assert!(problems.iter().any(|p| p.contains("'config_file' and 'settings'")));
    }

    #[test]
    fn test_ansible_file_and_sections_are_exclusive() {
        let config = NavigatorConfig {
            ansible_config_file: Some(Utf8PathBuf::from("/tmp/ansible.cfg")),
            ansible_cfg: Some(AnsibleCfg::default()),
            ..Default::default()
        };
        let mut problems = Vec::new();
        config.collect_problems(&mut problems);
        assert!(
            problems.iter().any(|p| p.contains("'ansible_config_file' and 'ansible_cfg'"))
        );
    }

    #[test]
    fn test_apply_ee_defaults_fills_unset_slots() {
        let mut config = ee_config("settings:\n  execution-environment:\n    enabled: true\n");
        config.apply_ee_defaults();

        let cfg = config.ansible_cfg.as_ref().unwrap();
        assert_eq!(cfg.get("defaults", "remote_tmp"), Some(EE_DEFAULT_TMP));
        assert_eq!(cfg.get("defaults", "local_tmp"), Some(EE_DEFAULT_TMP));

        let vars = config
            .settings
            .as_ref()
            .unwrap()
            .execution_environment
            .as_ref()
            .unwrap()
            .environment_variables
            .as_ref()
            .unwrap();
        assert_eq!(vars.set.get("ANSIBLE_REMOTE_TMP").map(String::as_str), Some(EE_DEFAULT_TMP));
        assert_eq!(vars.set.get("ANSIBLE_LOCAL_TEMP").map(String::as_str), Some(EE_DEFAULT_TMP));
    }

    #[test]
    fn test_apply_ee_defaults_respects_user_values() {
        let mut config = ee_config(
            "settings:\n  execution-environment:\n    enabled: true\n    environment-variables:\n      set:\n        ANSIBLE_REMOTE_TMP: /custom\nansible_cfg:\n  defaults:\n    local_tmp: /mine\n",
        );
        config.apply_ee_defaults();

        let cfg = config.ansible_cfg.as_ref().unwrap();
        assert_eq!(cfg.get("defaults", "local_tmp"), Some("/mine"));
        assert_eq!(cfg.get("defaults", "remote_tmp"), Some(EE_DEFAULT_TMP));

        let vars = config
            .settings
            .as_ref()
            .unwrap()
            .execution_environment
            .as_ref()
            .unwrap()
            .environment_variables
            .as_ref()
            .unwrap();
        assert_eq!(vars.set.get("ANSIBLE_REMOTE_TMP").map(String::as_str), Some("/custom"));
        assert_eq!(vars.set.get("ANSIBLE_LOCAL_TEMP").map(String::as_str), Some(EE_DEFAULT_TMP));
    }

    #[test]
    fn test_apply_ee_defaults_respects_pass_through() {
        let mut config = ee_config(
            "settings:\n  execution-environment:\n    enabled: true\n    environment-variables:\n      pass:\n        - ANSIBLE_REMOTE_TMP\n",
        );
        config.apply_ee_defaults();

        let cfg = config.ansible_cfg.as_ref().unwrap();
        assert_eq!(cfg.get("defaults", "remote_tmp"), None);
        assert_eq!(cfg.get("defaults", "local_tmp"), Some(EE_DEFAULT_TMP));

        let vars = config
            .settings
            .as_ref()
            .unwrap()
            .execution_environment
            .as_ref()
            .unwrap()
            .environment_variables
            .as_ref()
            .unwrap();
        assert!(!vars.set.contains_key("ANSIBLE_REMOTE_TMP"));
        assert!(vars.set.contains_key("ANSIBLE_LOCAL_TEMP"));
    }

    #[test]
    fn test_apply_ee_defaults_noop_without_ee() {
        let mut config = ee_config("settings:\n  logging:\n    level: debug\n");
        config.apply_ee_defaults();
        assert!(config.ansible_cfg.is_none());
    }

    #[test]
    fn test_apply_ee_defaults_skips_cfg_when_file_referenced() {
        let mut config = ee_config(
            "ansible_config_file: /etc/ansible/ansible.cfg\nsettings:\n  execution-environment:\n    enabled: true\n",
        );
        config.apply_ee_defaults();
        // The referenced file cannot be amended; only the EE variables get defaults
        assert!(config.ansible_cfg.is_none());
        let vars = config
            .settings
            .as_ref()
            .unwrap()
            .execution_environment
            .as_ref()
            .unwrap()
            .environment_variables
            .as_ref()
            .unwrap();
        assert!(vars.set.contains_key("ANSIBLE_REMOTE_TMP"));
    }
}
