//! Role and collection installation via `ansible-galaxy`.
//!
//! Installs dependencies from a requirements file or inline name lists
//! before any play runs. The requirements file is never parsed as a
//! manifest here; the installer only sniffs which sections exist and
//! leaves schema validation to the galaxy tool itself.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::args::{CommandArgsBuilder, FlagValueStyle};
use crate::config::resolve_path;
use crate::error::RsansibleError;
use crate::executor::{CommandExecutor, CommandSpec, LogSink, check_result};

/// Installer command used when the profile does not name one.
pub const DEFAULT_GALAXY_COMMAND: &str = "ansible-galaxy";

static ROLES_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*roles:").expect("invalid roles regex"));
static COLLECTIONS_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*collections:").expect("invalid collections regex"));

fn default_galaxy_command() -> String {
    DEFAULT_GALAXY_COMMAND.to_string()
}

/// The `galaxy` profile section.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GalaxyConfig {
    /// Installer command (default: `ansible-galaxy`)
    #[serde(default = "default_galaxy_command")]
    pub command: String,
    /// Requirements file handed to the installer with `-r`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements_file: Option<Utf8PathBuf>,
    /// Roles installed directly by name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Collections installed directly by dotted name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    /// Install destination for roles, exported as `ANSIBLE_ROLES_PATH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles_path: Option<Utf8PathBuf>,
    /// Install destination for collections, exported as
    /// `ANSIBLE_COLLECTIONS_PATH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections_path: Option<Utf8PathBuf>,
    /// Never reach the network; a missing cached dependency fails the run
    #[serde(default)]
    pub offline: bool,
    /// Reinstall dependencies that are already present
    #[serde(default)]
    pub force: bool,
    /// Like `force`, including dependencies; wins over `force` when both
    /// are set
    #[serde(default)]
    pub force_with_deps: bool,
    /// Raw tokens appended to every installer invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
}

impl Default for GalaxyConfig {
    fn default() -> Self {
        Self {
            command: default_galaxy_command(),
            requirements_file: None,
            roles: Vec::new(),
            collections: Vec::new(),
            roles_path: None,
            collections_path: None,
            offline: false,
            force: false,
            force_with_deps: false,
            extra_args: Vec::new(),
        }
    }
}

impl GalaxyConfig {
    /// Returns true when there is nothing to install.
    pub fn is_empty(&self) -> bool {
        self.requirements_file.is_none() && self.roles.is_empty() && self.collections.is_empty()
    }

    /// Dependency-path variables consumed by the installer and by every
    /// play invocation after it.
    pub fn env_overlay(&self) -> Vec<(String, String)> {
        let mut env = Vec::new();
        if let Some(ref path) = self.roles_path {
            env.push(("ANSIBLE_ROLES_PATH".to_string(), path.to_string()));
        }
        if let Some(ref path) = self.collections_path {
            env.push(("ANSIBLE_COLLECTIONS_PATH".to_string(), path.to_string()));
        }
        env
    }

    pub fn resolve_paths(&mut self, base_dir: &Utf8Path) {
        if let Some(ref mut file) = self.requirements_file {
            resolve_path(file, base_dir);
        }
        if let Some(ref mut path) = self.roles_path {
            resolve_path(path, base_dir);
        }
        if let Some(ref mut path) = self.collections_path {
            resolve_path(path, base_dir);
        }
    }

    pub fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.command.trim().is_empty() {
            problems.push("galaxy 'command' must not be empty".to_string());
        }
        if let Some(ref file) = self.requirements_file
            && !file.is_file()
        {
            problems.push(format!("galaxy requirements file not found: {}", file));
        }
    }
}

/// Splits a dotted collection name into its two segments.
///
/// Names with any other number of segments cannot map to an install
/// directory and are treated as "not installed".
fn split_collection_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(namespace), Some(short), None) if !namespace.is_empty() && !short.is_empty() => {
            Some((namespace, short))
        }
        _ => None,
    }
}

enum DependencyKind {
    Role,
    Collection,
}

impl DependencyKind {
    fn subcommand(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Collection => "collection",
        }
    }

    fn install_path<'c>(&self, config: &'c GalaxyConfig) -> Option<&'c Utf8Path> {
        match self {
            Self::Role => config.roles_path.as_deref(),
            Self::Collection => config.collections_path.as_deref(),
        }
    }
}

/// Runs `ansible-galaxy` installs for one profile.
pub struct GalaxyInstaller<'a> {
    config: &'a GalaxyConfig,
    executor: Arc<dyn CommandExecutor>,
    env: Vec<(String, String)>,
    secrets: Vec<String>,
    dry_run: bool,
}

impl<'a> GalaxyInstaller<'a> {
    /// Creates an installer. `base_env` is the PATH overlay shared by all
    /// external invocations; the dependency-path variables are layered on
    /// top of it.
    pub fn new(
        config: &'a GalaxyConfig,
        executor: Arc<dyn CommandExecutor>,
        base_env: &[(String, String)],
        secrets: &[String],
        dry_run: bool,
    ) -> Self {
        let mut env = base_env.to_vec();
        env.extend(config.env_overlay());
        Self {
            config,
            executor,
            env,
            secrets: secrets.to_vec(),
            dry_run,
        }
    }

    /// Installs everything the profile asks for. A no-op when neither a
    /// requirements file nor inline lists are configured.
    pub fn install(&self) -> Result<()> {
        if self.config.is_empty() {
            return Ok(());
        }

        if let Some(ref file) = self.config.requirements_file {
            self.install_from_requirements(file)?;
        }

        for role in &self.config.roles {
            tracing::info!("installing role: {}", role);
            self.run_install(self.install_args(DependencyKind::Role, role))?;
        }

        for collection in &self.config.collections {
            if self.collection_installed(collection) {
                tracing::info!("collection already installed, skipping: {}", collection);
                continue;
            }
            tracing::info!("installing collection: {}", collection);
            self.run_install(self.install_args(DependencyKind::Collection, collection))?;
        }

        Ok(())
    }

    /// Installs from the requirements file, sniffing which sections it
    /// carries. A file with neither section is treated as the legacy
    /// roles-only list format, with a warning.
    fn install_from_requirements(&self, file: &Utf8Path) -> Result<()> {
        let content = std::fs::read_to_string(file).map_err(|e| {
            RsansibleError::io(format!("failed to read requirements file: {}", file), e)
        })?;

        let has_roles = ROLES_SECTION.is_match(&content);
        let has_collections = COLLECTIONS_SECTION.is_match(&content);

        if !has_roles && !has_collections {
            tracing::warn!(
                "requirements file {} has neither a 'roles:' nor a 'collections:' section; \
                 treating it as a legacy role list",
                file
            );
        }

        if has_roles || !has_collections {
            tracing::info!("installing roles from {}", file);
            self.run_install(self.requirements_args(DependencyKind::Role, file))?;
        }
        if has_collections {
            tracing::info!("installing collections from {}", file);
            self.run_install(self.requirements_args(DependencyKind::Collection, file))?;
        }

        Ok(())
    }

    /// Checks the manifest marker of an installed collection.
    fn collection_installed(&self, name: &str) -> bool {
        if self.config.force || self.config.force_with_deps {
            return false;
        }
        let Some(ref collections_path) = self.config.collections_path else {
            return false;
        };
        let Some((namespace, short_name)) = split_collection_name(name) else {
            return false;
        };
        collections_path
            .join("ansible_collections")
            .join(namespace)
            .join(short_name)
            .join("MANIFEST.json")
            .is_file()
    }

    fn requirements_args(&self, kind: DependencyKind, file: &Utf8Path) -> Vec<String> {
        let mut builder = CommandArgsBuilder::new();
        builder.push_arg(kind.subcommand());
        builder.push_arg("install");
        builder.push_flag_value("-r", file.as_str(), FlagValueStyle::Separate);
        self.push_common_flags(&mut builder, &kind);
        builder.into_args()
    }

    fn install_args(&self, kind: DependencyKind, name: &str) -> Vec<String> {
        let mut builder = CommandArgsBuilder::new();
        builder.push_arg(kind.subcommand());
        builder.push_arg("install");
        builder.push_arg(name);
        self.push_common_flags(&mut builder, &kind);
        builder.into_args()
    }

    fn push_common_flags(&self, builder: &mut CommandArgsBuilder, kind: &DependencyKind) {
        if let Some(path) = kind.install_path(self.config) {
            builder.push_flag_value("-p", path.as_str(), FlagValueStyle::Separate);
        }
        if self.config.offline {
            builder.push_flag("--offline");
        }
        // force-with-deps subsumes force; never emit both
        if self.config.force_with_deps {
            builder.push_flag("--force-with-deps");
        } else if self.config.force {
            builder.push_flag("--force");
        }
        for arg in &self.config.extra_args {
            builder.push_arg(arg.clone());
        }
    }

    fn run_install(&self, args: Vec<String>) -> Result<()> {
        let spec = CommandSpec::new(&self.config.command, args)
            .with_envs(self.env.iter().cloned())
            .with_secrets(self.secrets.iter().cloned());
        let result = self.executor.execute(&spec, &mut LogSink)?;
        check_result(&result, &spec, self.dry_run)?;
        Ok(())
    }
}
