//! Path and environment resolution.
//!
//! This module expands home-relative paths from the profile, builds the
//! PATH overlay applied to every external invocation, and resolves
//! version-manager shims (asdf, mise, rtx) to the real executable before
//! the playbook runner is probed and invoked.

use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::RsansibleError;

/// Default bound for the `--version` probe of the playbook runner.
pub const DEFAULT_VERSION_PROBE_TIMEOUT_SECS: u64 = 60;

/// How many leading lines of an executable are inspected for shim markers.
const SHIM_SCAN_LINES: usize = 10;

/// Poll interval while waiting for the version probe to exit.
const PROBE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Version-manager invocation markers. A script containing the marker in
/// its first lines is a shim for that manager, not the real tool.
const SHIM_MARKERS: &[(&str, &str)] = &[
    ("asdf", "asdf exec"),
    ("mise", "mise x"),
    ("rtx", "rtx x"),
];

/// Expands a leading `~` or `~/...` to the user's home directory.
///
/// `~user/...` forms and paths without a leading tilde are returned
/// unchanged, as is empty input.
pub fn expand_home(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Builds the environment overlay for external invocations.
///
/// With a non-empty `base_path`, the overlay carries a single `PATH`
/// entry of `join(base_path, ":")` prefixed onto the current process
/// `PATH`. All other variables reach the child untouched through normal
/// inheritance, so the ambient environment is never mutated. An empty
/// `base_path` yields an empty overlay.
pub fn build_env(base_path: &[Utf8PathBuf]) -> Vec<(String, String)> {
    if base_path.is_empty() {
        return Vec::new();
    }

    let joined = base_path.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(":");
    let path = match std::env::var("PATH") {
        Ok(original) if !original.is_empty() => format!("{}:{}", joined, original),
        _ => joined,
    };

    vec![("PATH".to_string(), path)]
}

/// Resolves a version-manager shim to the real executable it fronts.
///
/// Kept behind a trait so tests can stub the external `which` call.
pub trait ShimProbe {
    /// Runs `<manager> which <command>` and returns the captured path.
    fn resolve(&self, manager: &str, command: &str) -> Result<String>;
}

/// [`ShimProbe`] implementation that invokes the version manager itself.
pub struct ManagerShimProbe;

impl ShimProbe for ManagerShimProbe {
    fn resolve(&self, manager: &str, command: &str) -> Result<String> {
        let output = Command::new(manager)
            .args(["which", command])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RsansibleError::io(format!("failed to run `{} which {}`", manager, command), e))?;

        if !output.status.success() {
            return Err(RsansibleError::execution(
                format!("{} which {}", manager, command),
                format!("exit status: {:?}", output.status.code()),
            )
            .into());
        }

        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path.is_empty() {
            return Err(RsansibleError::execution(
                format!("{} which {}", manager, command),
                "produced no output".to_string(),
            )
            .into());
        }

        Ok(path)
    }
}

/// Returns the version manager whose marker appears in the executable's
/// first lines, or `None` for a regular binary or script.
fn detect_shim(path: &Utf8Path) -> Option<&'static str> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();

    for _ in 0..SHIM_SCAN_LINES {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                for (manager, marker) in SHIM_MARKERS {
                    if line.contains(marker) {
                        return Some(manager);
                    }
                }
            }
            // Non-UTF-8 content means a real binary, not a shim script
            Err(_) => break,
        }
    }

    None
}

/// Replaces a shim path with the real executable it points at.
///
/// Non-shim paths pass through unchanged. A shim that the manager cannot
/// resolve is a fatal environment error; silently running the shim would
/// execute the wrong binary inside a rewritten PATH.
pub fn resolve_shim(
    path: Utf8PathBuf,
    command: &str,
    probe: &dyn ShimProbe,
) -> Result<Utf8PathBuf, RsansibleError> {
    let Some(manager) = detect_shim(&path) else {
        return Ok(path);
    };

    tracing::debug!("`{}` is a {} shim, resolving the real executable", path, manager);

    match probe.resolve(manager, command) {
        Ok(real) => {
            tracing::debug!("resolved {} shim: {} -> {}", manager, path, real);
            Ok(Utf8PathBuf::from(real))
        }
        Err(e) => Err(RsansibleError::Environment(format!(
            "`{}` resolves to a {} shim at `{}` but `{} which {}` failed ({}); \
             install the tool for the active {} version or point 'command_path' at the real executable",
            command, manager, path, manager, command, e, manager
        ))),
    }
}

/// Locates the runner command on the (possibly rewritten) PATH and
/// resolves any version-manager shim in front of it.
pub fn locate_command(
    command: &str,
    env: &[(String, String)],
    probe: &dyn ShimProbe,
) -> Result<Utf8PathBuf, RsansibleError> {
    let cwd = std::env::current_dir()
        .map_err(|e| RsansibleError::io("failed to determine current directory", e))?;

    let overlay_path = env.iter().find(|(key, _)| key == "PATH").map(|(_, value)| value.clone());
    let found = match overlay_path {
        Some(paths) => which::which_in(command, Some(paths), &cwd),
        None => which::which(command),
    }
    .map_err(|_| {
        RsansibleError::Environment(format!(
            "`{}` not found on PATH; install it or add its directory to 'command_path'",
            command
        ))
    })?;

    let found = Utf8PathBuf::from_path_buf(found).map_err(|p| {
        RsansibleError::Environment(format!(
            "resolved path for `{}` is not valid UTF-8: {}",
            command,
            p.display()
        ))
    })?;

    tracing::trace!("command found: {}: {}", command, found);

    resolve_shim(found, command, probe)
}

/// Probes `<path> --version` under a deadline.
///
/// A probe that exceeds the timeout is killed and reported as a hung or
/// misconfigured tool, which is a different failure from the command not
/// being found at all.
pub fn probe_version(
    path: &Utf8Path,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<(), RsansibleError> {
    let mut command = Command::new(path);
    command.arg("--version");
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }

    let mut child = command
        .spawn()
        .map_err(|e| RsansibleError::io(format!("failed to run `{} --version`", path), e))?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    if let Err(e) = child.kill() {
                        tracing::debug!("kill returned error for version probe: {}", e);
                    }
                    let _ = child.wait();
                    return Err(RsansibleError::Environment(format!(
                        "`{} --version` did not complete within {}s; the tool may be hung or \
                         waiting for input. Verify the executable works by hand, or raise \
                         'version_probe_timeout_secs'",
                        path,
                        timeout.as_secs()
                    )));
                }
                std::thread::sleep(PROBE_POLL_INTERVAL);
            }
            Err(e) => {
                return Err(RsansibleError::io(
                    format!("failed to wait for `{} --version`", path),
                    e,
                ));
            }
        }
    };

    let mut stdout = String::new();
    if let Some(mut pipe) = child.stdout.take() {
        let _ = pipe.read_to_string(&mut stdout);
    }
    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr);
    }

    if !status.success() {
        let detail = stderr.trim();
        return Err(RsansibleError::Environment(format!(
            "`{} --version` exited with {:?}{}{}; the resolved executable does not look like a \
             working playbook runner",
            path,
            status.code(),
            if detail.is_empty() { "" } else { ": " },
            detail
        )));
    }

    if let Some(first_line) = stdout.lines().next() {
        tracing::debug!("version probe: {}: {}", path, first_line.trim());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct StaticProbe(Option<String>);

    impl ShimProbe for StaticProbe {
        fn resolve(&self, _manager: &str, _command: &str) -> Result<String> {
            match &self.0 {
                Some(path) => Ok(path.clone()),
                None => anyhow::bail!("probe failed"),
            }
        }
    }

    #[cfg(unix)]
    fn write_executable(dir: &std::path::Path, name: &str, contents: &str) -> Utf8PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Utf8PathBuf::from_path_buf(path).unwrap()
    }

    #[test]
    fn test_expand_home_leaves_plain_paths_alone() {
        assert_eq!(expand_home(""), "");
        assert_eq!(expand_home("/usr/bin/ansible-navigator"), "/usr/bin/ansible-navigator");
        assert_eq!(expand_home("relative/play.yml"), "relative/play.yml");
        assert_eq!(expand_home("~user/play.yml"), "~user/play.yml");
    }

    #[test]
    fn test_expand_home_rewrites_leading_tilde() {
        let expanded = expand_home("~/plays/site.yml");
        assert!(expanded.ends_with("/plays/site.yml"));
        assert!(!expanded.starts_with('~'));
    }

    #[test]
    fn test_build_env_empty_base_is_empty_overlay() {
        assert!(build_env(&[]).is_empty());
    }

    #[test]
    fn test_build_env_prefixes_path() {
        let overlay = build_env(&[Utf8PathBuf::from("/opt/ansible/bin"), Utf8PathBuf::from("/extra")]);
        assert_eq!(overlay.len(), 1);
        let (key, value) = &overlay[0];
        assert_eq!(key, "PATH");
        assert!(value.starts_with("/opt/ansible/bin:/extra"));
        if let Ok(original) = std::env::var("PATH") {
            assert!(value.ends_with(&original));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_detect_shim_finds_markers() {
        let dir = tempfile::tempdir().unwrap();
        let shim = write_executable(dir.path(), "shim", "#!/bin/sh\nexec asdf exec ansible-navigator \"$@\"\n");
        assert_eq!(detect_shim(&shim), Some("asdf"));

        let mise = write_executable(dir.path(), "mise-shim", "#!/bin/sh\nexec mise x -- ansible-navigator \"$@\"\n");
        assert_eq!(detect_shim(&mise), Some("mise"));

        let plain = write_executable(dir.path(), "plain", "#!/bin/sh\necho hello\n");
        assert_eq!(detect_shim(&plain), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_shim_uses_probe_result() {
        let dir = tempfile::tempdir().unwrap();
        let shim = write_executable(dir.path(), "shim", "#!/bin/sh\nexec rtx x -- ansible-navigator \"$@\"\n");

        let probe = StaticProbe(Some("/real/ansible-navigator".to_string()));
        let resolved = resolve_shim(shim, "ansible-navigator", &probe).unwrap();
        assert_eq!(resolved, Utf8PathBuf::from("/real/ansible-navigator"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_shim_failure_is_fatal_with_remediation() {
        let dir = tempfile::tempdir().unwrap();
        let shim = write_executable(dir.path(), "shim", "#!/bin/sh\nexec asdf exec ansible-navigator \"$@\"\n");

        let probe = StaticProbe(None);
        let err = resolve_shim(shim, "ansible-navigator", &probe).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("asdf"));
        assert!(message.contains("command_path"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_shim_passes_regular_executable_through() {
        let dir = tempfile::tempdir().unwrap();
        let plain = write_executable(dir.path(), "runner", "#!/bin/sh\necho 1.0\n");

        let probe = StaticProbe(None);
        let resolved = resolve_shim(plain.clone(), "runner", &probe).unwrap();
        assert_eq!(resolved, plain);
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_command_uses_overlay_path() {
        let dir = tempfile::tempdir().unwrap();
        write_executable(dir.path(), "fake-navigator", "#!/bin/sh\necho 1.0\n");

        let env = vec![("PATH".to_string(), dir.path().to_str().unwrap().to_string())];
        let probe = StaticProbe(None);
        let found = locate_command("fake-navigator", &env, &probe).unwrap();
        assert!(found.as_str().ends_with("fake-navigator"));
    }

    #[test]
    fn test_locate_command_not_found_names_command_path() {
        let env = vec![("PATH".to_string(), "/nonexistent-dir-for-test".to_string())];
        let probe = StaticProbe(None);
        let err = locate_command("definitely-not-here", &env, &probe).unwrap_err();
        assert!(err.to_string().contains("command_path"));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_version_accepts_working_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_executable(dir.path(), "tool", "#!/bin/sh\necho 'tool 1.2.3'\n");

        probe_version(&tool, &[], Duration::from_secs(5)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_version_reports_failing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_executable(dir.path(), "tool", "#!/bin/sh\necho 'broken' >&2\nexit 3\n");

        let err = probe_version(&tool, &[], Duration::from_secs(5)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("--version"));
        assert!(message.contains("broken"));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_version_times_out_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let tool = write_executable(dir.path(), "tool", "#!/bin/sh\nsleep 30\n");

        let err = probe_version(&tool, &[], Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("version_probe_timeout_secs"));
    }
}
