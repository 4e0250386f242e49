//! Per-run staging of generated artifacts.
//!
//! Every run owns one scratch directory holding the inventory, generated
//! tool configs and per-play files. Local runs read the artifacts in
//! place; remote runs ship them through a [`FileStager`] first. The
//! directory and its contents never outlive the run.

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{Connection, InventoryConfig, Profile};
use crate::error::RsansibleError;
use crate::executor::{Communicator, LogSink};

/// Makes artifacts visible to the runner.
pub trait FileStager: Send + Sync {
    /// Stages a local file under `name`, returning the path the runner
    /// should reference.
    fn stage(&self, local: &Utf8Path, name: &str) -> Result<Utf8PathBuf>;

    /// Removes a previously staged copy.
    fn remove(&self, staged: &Utf8Path) -> Result<()>;
}

/// Local runs read artifacts where they were written.
pub struct LocalStager;

impl FileStager for LocalStager {
    fn stage(&self, local: &Utf8Path, _name: &str) -> Result<Utf8PathBuf> {
        Ok(local.to_owned())
    }

    // Local artifacts are cleaned up by their guards, not the stager.
    fn remove(&self, _staged: &Utf8Path) -> Result<()> {
        Ok(())
    }
}

/// Remote runs upload artifacts into a scratch directory on the target.
pub struct RemoteStager {
    communicator: Arc<dyn Communicator>,
    remote_dir: String,
}

impl RemoteStager {
    pub fn new(communicator: Arc<dyn Communicator>, remote_dir: impl Into<String>) -> Self {
        let remote_dir = remote_dir.into();
        Self {
            communicator,
            remote_dir: remote_dir.trim_end_matches('/').to_string(),
        }
    }
}

impl FileStager for RemoteStager {
    fn stage(&self, local: &Utf8Path, name: &str) -> Result<Utf8PathBuf> {
        let remote = format!("{}/{}", self.remote_dir, name);
        tracing::debug!("uploading {} to {}", local, remote);
        self.communicator.upload(local, &remote)?;
        Ok(Utf8PathBuf::from(remote))
    }

    fn remove(&self, staged: &Utf8Path) -> Result<()> {
        let command = format!("rm -f {}", shell_words::quote(staged.as_str()));
        let code = self.communicator.run(&command, &mut LogSink)?;
        if code != 0 {
            return Err(RsansibleError::Execution {
                command,
                status: format!("exit status: {}", code),
            }
            .into());
        }
        Ok(())
    }
}

/// Per-run scratch directory. Removed with everything in it when dropped.
pub struct StagingDir {
    // Held for its Drop.
    _dir: tempfile::TempDir,
    path: Utf8PathBuf,
}

impl StagingDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("rsansible-")
            .tempdir()
            .map_err(|e| RsansibleError::io("failed to create staging directory", e))?;
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|p| {
            RsansibleError::Environment(format!(
                "staging directory path is not valid UTF-8: {}",
                p.display()
            ))
        })?;
        tracing::debug!("staging directory: {}", path);
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Writes an artifact into the staging directory.
    pub fn write(&self, name: &str, content: &str) -> Result<Utf8PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, content)
            .map_err(|e| RsansibleError::io(format!("failed to write staging artifact: {}", path), e))?;
        Ok(path)
    }
}

/// RAII guard for a staged artifact: removes the staged copy, and for
/// generated files the local original, once the invocation or run that
/// used them finishes, success or failure.
pub struct ArtifactGuard {
    local: Utf8PathBuf,
    staged: Option<Utf8PathBuf>,
    stager: Arc<dyn FileStager>,
    remove_local: bool,
}

impl ArtifactGuard {
    /// Guards a generated file; both the staged copy and the local file
    /// are removed on drop.
    pub fn new(local: Utf8PathBuf, stager: Arc<dyn FileStager>) -> Self {
        Self {
            local,
            staged: None,
            stager,
            remove_local: true,
        }
    }

    /// Guards a user-supplied file; only the staged copy is removed on
    /// drop, the source stays in place.
    pub fn for_source(local: Utf8PathBuf, stager: Arc<dyn FileStager>) -> Self {
        Self {
            local,
            staged: None,
            stager,
            remove_local: false,
        }
    }

    /// Stages the artifact, remembering any distinct staged copy for
    /// cleanup.
    pub fn stage(&mut self, name: &str) -> Result<Utf8PathBuf> {
        let staged = self.stager.stage(&self.local, name)?;
        if staged != self.local {
            self.staged = Some(staged.clone());
        }
        Ok(staged)
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if let Some(ref staged) = self.staged
            && let Err(e) = self.stager.remove(staged)
        {
            tracing::error!(path = %staged, "failed to remove staged artifact: {}", e);
        }
        if !self.remove_local {
            return;
        }
        match fs::remove_file(&self.local) {
            Ok(()) => tracing::debug!("cleaned up staging artifact: {}", self.local),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("staging artifact already removed: {}", self.local);
            }
            Err(e) => {
                tracing::error!(
                    path = %self.local,
                    error_kind = ?e.kind(),
                    "failed to cleanup staging artifact: {}",
                    e,
                );
            }
        }
    }
}

/// Renders the inventory for profiles that do not supply a file.
///
/// The local connection pins the host alias to `ansible_connection=local`;
/// other connections emit the bare alias. Group sections come out in
/// declared order.
pub fn render_inventory(inventory: &InventoryConfig, connection: &Connection) -> String {
    let host_line = match connection {
        Connection::Local => format!("{} ansible_connection=local", inventory.host_alias),
        Connection::Ssh => inventory.host_alias.clone(),
    };
    if inventory.groups.is_empty() {
        return format!("{}\n", host_line);
    }
    let sections: Vec<String> = inventory
        .groups
        .iter()
        .map(|group| format!("[{}]\n{}\n", group, host_line))
        .collect();
    sections.join("\n")
}

/// Artifacts created once per run and shared by every play, with the
/// environment exports that point the runner at them.
///
/// The guards own every staged copy; dropping this struct at run end
/// removes them from the target, success or failure.
pub struct RunArtifacts {
    /// Inventory path as the runner sees it
    pub inventory: Utf8PathBuf,
    pub navigator_config: Option<Utf8PathBuf>,
    pub ansible_cfg: Option<Utf8PathBuf>,
    /// `ANSIBLE_NAVIGATOR_CONFIG` / `ANSIBLE_CONFIG` exports
    pub env: Vec<(String, String)>,
    _guards: Vec<ArtifactGuard>,
}

fn stage_and_guard(
    mut guard: ArtifactGuard,
    name: &str,
    guards: &mut Vec<ArtifactGuard>,
) -> Result<Utf8PathBuf> {
    let staged = guard.stage(name)?;
    guards.push(guard);
    Ok(staged)
}

/// Creates the once-per-run artifacts: the inventory plus any referenced
/// or generated tool configs.
pub fn prepare_run_artifacts(
    profile: &Profile,
    staging: &StagingDir,
    stager: &Arc<dyn FileStager>,
) -> Result<RunArtifacts> {
    let mut guards = Vec::new();

    let inventory = match profile.inventory.file {
        Some(ref file) => stage_and_guard(
            ArtifactGuard::for_source(file.clone(), stager.clone()),
            "inventory",
            &mut guards,
        )?,
        None => {
            let content = render_inventory(&profile.inventory, &profile.connection);
            let local = staging.write("inventory", &content)?;
            stage_and_guard(ArtifactGuard::new(local, stager.clone()), "inventory", &mut guards)?
        }
    };

    let mut env = Vec::new();
    let mut navigator_config = None;
    let mut ansible_cfg = None;

    if let Some(ref navigator) = profile.navigator {
        if let Some(ref file) = navigator.ansible_config_file {
            let staged = stage_and_guard(
                ArtifactGuard::for_source(file.clone(), stager.clone()),
                "ansible.cfg",
                &mut guards,
            )?;
            env.push(("ANSIBLE_CONFIG".to_string(), staged.to_string()));
            ansible_cfg = Some(staged);
        } else if let Some(ref cfg) = navigator.ansible_cfg
            && !cfg.is_empty()
        {
            let local = staging.write("ansible.cfg", &cfg.to_ini())?;
            let staged = stage_and_guard(
                ArtifactGuard::new(local, stager.clone()),
                "ansible.cfg",
                &mut guards,
            )?;
            env.push(("ANSIBLE_CONFIG".to_string(), staged.to_string()));
            ansible_cfg = Some(staged);
        }

        if let Some(ref file) = navigator.config_file {
            let staged = stage_and_guard(
                ArtifactGuard::for_source(file.clone(), stager.clone()),
                "navigator.yml",
                &mut guards,
            )?;
            env.push(("ANSIBLE_NAVIGATOR_CONFIG".to_string(), staged.to_string()));
            navigator_config = Some(staged);
        } else if let Some(ref settings) = navigator.settings {
            let local = staging.write("navigator.yml", &settings.to_yaml()?)?;
            let staged = stage_and_guard(
                ArtifactGuard::new(local, stager.clone()),
                "navigator.yml",
                &mut guards,
            )?;
            env.push(("ANSIBLE_NAVIGATOR_CONFIG".to_string(), staged.to_string()));
            navigator_config = Some(staged);
        }
    }

    Ok(RunArtifacts {
        inventory,
        navigator_config,
        ansible_cfg,
        env,
        _guards: guards,
    })
}
