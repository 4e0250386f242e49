//! Run orchestrator: prepares the environment, installs dependencies and
//! executes plays in declaration order.
//!
//! One run walks a fixed sequence:
//!
//! 1. **Prepare**: build the PATH overlay, resolve the runner command
//!    (shims included) and probe its version.
//! 2. **Install**: run the galaxy installer when dependencies are
//!    configured.
//! 3. **Stage**: create the per-run staging directory, the inventory and
//!    any generated tool configs.
//! 4. **Execute**: invoke the runner once per play, fail-fast or
//!    keep-going per the profile.
//!
//! Plays never run in parallel. Each play's temporary artifacts are
//! removed when its invocation finishes, success or failure.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use tracing::{debug, info, warn};

use crate::args;
use crate::config::Profile;
use crate::events::{EventSink, RunSummary};
use crate::executor::{CommandExecutor, CommandSpec, LogSink, check_result};
use crate::galaxy::GalaxyInstaller;
use crate::navigator::NavigatorConfig;
use crate::pathenv::{self, ManagerShimProbe};
use crate::play::{Play, PlayTarget};
use crate::staging::{ArtifactGuard, FileStager, RunArtifacts, StagingDir, prepare_run_artifacts};

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Per-run state shared by every play invocation.
///
/// Field order matters: the artifact guards must drop before the staging
/// directory they point into.
struct RunState {
    /// Resolved runner command
    command: Utf8PathBuf,
    artifacts: RunArtifacts,
    staging: StagingDir,
    /// Environment overlay: PATH, dependency paths, config exports
    env: Vec<(String, String)>,
    secrets: Vec<String>,
}

/// Orchestrates one run of a validated profile.
pub struct Pipeline<'a> {
    profile: &'a Profile,
    executor: Arc<dyn CommandExecutor>,
    stager: Arc<dyn FileStager>,
    dry_run: bool,
    verbose: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        profile: &'a Profile,
        executor: Arc<dyn CommandExecutor>,
        stager: Arc<dyn FileStager>,
        dry_run: bool,
        verbose: bool,
    ) -> Self {
        Self {
            profile,
            executor,
            stager,
            dry_run,
            verbose,
        }
    }

    /// Executes the full run.
    pub fn run(&self) -> Result<()> {
        let state = self.prepare()?;

        if let Some(ref navigator) = self.profile.navigator
            && navigator.ee_enabled()
            && tracing::enabled!(tracing::Level::DEBUG)
        {
            ee_preflight(navigator);
        }

        let total = self.profile.plays.len();
        info!("starting run with {} play(s)", total);

        let mut summary = RunSummary::default();
        let mut failures: Vec<(String, anyhow::Error)> = Vec::new();

        for (index, play) in self.profile.plays.iter().enumerate() {
            info!("running play {}/{}: {}", index + 1, total, play.name());
            match self.run_play(play, &state, &mut summary) {
                Ok(()) => {}
                Err(e) if self.profile.keep_going => {
                    warn!("play '{}' failed, continuing: {:#}", play.name(), e);
                    failures.push((play.name().to_string(), e));
                }
                Err(e) => {
                    return Err(e.context(format!("play '{}' failed", play.name())));
                }
            }
        }

        if self.profile.structured_output {
            info!(
                "run summary: plays={} tasks={} failed={}",
                summary.plays_run, summary.tasks_total, summary.tasks_failed
            );
            // Best effort; a failed write never fails the run.
            if let Some(ref path) = self.profile.summary_file
                && let Err(e) = summary.write_json(path)
            {
                warn!("failed to write run summary: {:#}", e);
            }
        }

        if !failures.is_empty() {
            let count = failures.len();
            let (name, error) = failures.swap_remove(0);
            return Err(error.context(format!(
                "play '{}' failed ({} of {} play(s) failed)",
                name, count, total
            )));
        }

        info!("run completed successfully");
        Ok(())
    }

    /// Resolves the runner, installs dependencies and stages the
    /// once-per-run artifacts.
    fn prepare(&self) -> Result<RunState> {
        let base_env = pathenv::build_env(&self.profile.command_path);

        // In dry-run mode nothing is spawned, so the runner need not exist.
        let command = if self.dry_run {
            Utf8PathBuf::from(&self.profile.command)
        } else {
            let resolved =
                pathenv::locate_command(&self.profile.command, &base_env, &ManagerShimProbe)?;
            pathenv::probe_version(&resolved, &base_env, self.profile.probe_timeout())?;
            resolved
        };

        let secrets = self.profile.secrets();
        if let Some(ref galaxy) = self.profile.galaxy {
            GalaxyInstaller::new(galaxy, self.executor.clone(), &base_env, &secrets, self.dry_run)
                .install()
                .context("dependency installation failed")?;
        }

        let staging = StagingDir::new()?;
        let artifacts = prepare_run_artifacts(self.profile, &staging, &self.stager)?;

        let mut env = base_env;
        if let Some(ref galaxy) = self.profile.galaxy {
            env.extend(galaxy.env_overlay());
        }
        env.extend(artifacts.env.iter().cloned());

        Ok(RunState {
            command,
            artifacts,
            staging,
            env,
            secrets,
        })
    }

    /// Runs one play: resolve its target, stage its artifacts, invoke the
    /// runner, evaluate the result. Staged artifacts are cleaned up when
    /// the guards drop, on every exit path.
    fn run_play(&self, play: &Play, state: &RunState, summary: &mut RunSummary) -> Result<()> {
        let run_id = uuid::Uuid::new_v4();

        let vars_json = args::render_side_channel(&self.profile.context)?;
        debug!(
            "side-channel variables: {}",
            args::render_side_channel_masked(&self.profile.context)?
        );
        let vars_name = format!("extra-vars-{}.json", run_id);
        let vars_local = state.staging.write(&vars_name, &vars_json)?;
        let mut vars_guard = ArtifactGuard::new(vars_local, self.stager.clone());
        let extra_vars_file = vars_guard.stage(&vars_name)?;

        // Variable files are user-supplied; only their staged copies are
        // cleaned up.
        let mut vars_files = Vec::with_capacity(play.vars_files.len());
        let mut vars_file_guards = Vec::with_capacity(play.vars_files.len());
        for (index, file) in play.vars_files.iter().enumerate() {
            let name = format!("vars-{}-{}", index, file.file_name().unwrap_or("vars.yml"));
            let mut guard = ArtifactGuard::for_source(file.clone(), self.stager.clone());
            vars_files.push(guard.stage(&name)?);
            vars_file_guards.push(guard);
        }

        // Playbook targets are staged as-is; role targets get a synthesized
        // playbook wrapping the role.
        let mut playbook_guard;
        let playbook = match play.target() {
            PlayTarget::Playbook(path) => {
                let name = path.file_name().unwrap_or("playbook.yml").to_string();
                playbook_guard = ArtifactGuard::for_source(path, self.stager.clone());
                playbook_guard.stage(&name)?
            }
            PlayTarget::Role(role) => {
                let name = format!("role-{}.yml", run_id);
                let local =
                    state.staging.write(&name, &play.role_playbook_yaml(&role, &vars_files)?)?;
                playbook_guard = ArtifactGuard::new(local, self.stager.clone());
                playbook_guard.stage(&name)?
            }
        };

        let mode = self.profile.navigator.as_ref().and_then(|n| n.mode);
        let play_args = args::build_play_args(
            play,
            mode,
            &self.profile.connection,
            &state.artifacts.inventory,
            &extra_vars_file,
            &vars_files,
            &playbook,
        );

        let spec = CommandSpec::new(state.command.as_str(), play_args)
            .with_envs(state.env.iter().cloned())
            .with_secrets(state.secrets.iter().cloned());

        let result = if self.profile.structured_output {
            let mut sink = EventSink::new(summary, self.verbose);
            self.executor.execute(&spec, &mut sink)?
        } else {
            self.executor.execute(&spec, &mut LogSink)?
        };

        check_result(&result, &spec, self.dry_run)?;
        Ok(())
    }
}

/// Advisory container-runtime diagnostics, logged when the execution
/// environment is enabled and debug logging is on. Never fails the run.
fn ee_preflight(navigator: &NavigatorConfig) {
    let engine = navigator
        .settings
        .as_ref()
        .and_then(|s| s.execution_environment.as_ref())
        .and_then(|ee| ee.container_engine.as_deref())
        .unwrap_or("docker");

    if std::path::Path::new(DOCKER_SOCKET).exists() {
        debug!("container runtime socket present: {}", DOCKER_SOCKET);
    } else {
        debug!("container runtime socket not found: {}", DOCKER_SOCKET);
    }

    if std::env::var_os("DOCKER_HOST").is_some() {
        debug!("DOCKER_HOST is set (value redacted)");
    } else {
        debug!("DOCKER_HOST is not set");
    }

    match which::which(engine) {
        Ok(path) => debug!("container engine client found: {}", path.display()),
        Err(_) => debug!("container engine client '{}' not found on PATH", engine),
    }

    if dockerd_running() {
        warn!(
            "a dockerd process is running on this host; if this build itself runs inside a \
             container, nested execution environments may fail"
        );
    }
}

/// Heuristic scan for a dockerd process.
fn dockerd_running() -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.flatten() {
        let comm = entry.path().join("comm");
        if let Ok(name) = std::fs::read_to_string(&comm)
            && name.trim() == "dockerd"
        {
            return true;
        }
    }
    false
}
