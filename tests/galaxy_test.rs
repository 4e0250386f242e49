//! Tests for dependency installation.

mod helpers;

use std::sync::Arc;

use camino::Utf8PathBuf;
use helpers::MockExecutor;
use rsansible::galaxy::{GalaxyConfig, GalaxyInstaller};

fn utf8_dir(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("tempdir should be UTF-8")
}

fn install(config: &GalaxyConfig, mock: &Arc<MockExecutor>) -> anyhow::Result<()> {
    GalaxyInstaller::new(config, mock.clone(), &[], &[], true).install()
}

// =============================================================================
// Requirements file section sniffing
// =============================================================================

#[test]
fn test_requirements_with_both_sections_installs_roles_then_collections() {
    let dir = tempfile::tempdir().unwrap();
    let file = utf8_dir(&dir).join("requirements.yml");
    std::fs::write(
        &file,
        "roles:\n  - name: geerlingguy.nginx\ncollections:\n  - name: community.general\n",
    )
    .unwrap();

    let config = GalaxyConfig {
        requirements_file: Some(file.clone()),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 2);
    assert_eq!(argv[0], vec!["ansible-galaxy", "role", "install", "-r", file.as_str()]);
    assert_eq!(argv[1], vec!["ansible-galaxy", "collection", "install", "-r", file.as_str()]);
}

#[test]
fn test_requirements_with_roles_only_skips_collection_install() {
    let dir = tempfile::tempdir().unwrap();
    let file = utf8_dir(&dir).join("requirements.yml");
    std::fs::write(&file, "roles:\n  - name: geerlingguy.nginx\n").unwrap();

    let config = GalaxyConfig {
        requirements_file: Some(file),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 1);
    assert_eq!(argv[0][1], "role");
}

#[test]
fn test_requirements_with_collections_only_skips_role_install() {
    let dir = tempfile::tempdir().unwrap();
    let file = utf8_dir(&dir).join("requirements.yml");
    std::fs::write(&file, "collections:\n  - name: community.general\n").unwrap();

    let config = GalaxyConfig {
        requirements_file: Some(file),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 1);
    assert_eq!(argv[0][1], "collection");
}

#[test]
fn test_legacy_requirements_without_sections_installs_as_roles() {
    let dir = tempfile::tempdir().unwrap();
    let file = utf8_dir(&dir).join("requirements.yml");
    std::fs::write(&file, "- src: geerlingguy.nginx\n- src: geerlingguy.docker\n").unwrap();

    let config = GalaxyConfig {
        requirements_file: Some(file),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 1);
    assert_eq!(argv[0][1], "role");
}

// =============================================================================
// Inline name lists
// =============================================================================

#[test]
fn test_inline_roles_and_collections_install_in_order() {
    let config = GalaxyConfig {
        roles: vec!["geerlingguy.nginx".to_string(), "geerlingguy.docker".to_string()],
        collections: vec!["community.general".to_string()],
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 3);
    assert_eq!(argv[0], vec!["ansible-galaxy", "role", "install", "geerlingguy.nginx"]);
    assert_eq!(argv[1], vec!["ansible-galaxy", "role", "install", "geerlingguy.docker"]);
    assert_eq!(argv[2], vec!["ansible-galaxy", "collection", "install", "community.general"]);
}

#[test]
fn test_empty_config_invokes_nothing() {
    let mock = Arc::new(MockExecutor::new());
    install(&GalaxyConfig::default(), &mock).unwrap();
    assert_eq!(mock.call_count(), 0);
}

// =============================================================================
// Flags
// =============================================================================

#[test]
fn test_install_flag_order() {
    let config = GalaxyConfig {
        roles: vec!["geerlingguy.nginx".to_string()],
        roles_path: Some(Utf8PathBuf::from("/deps/roles")),
        offline: true,
        extra_args: vec!["--timeout".to_string(), "60".to_string()],
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    assert_eq!(
        mock.argv()[0],
        vec![
            "ansible-galaxy",
            "role",
            "install",
            "geerlingguy.nginx",
            "-p",
            "/deps/roles",
            "--offline",
            "--timeout",
            "60",
        ]
    );
}

#[test]
fn test_force_with_deps_wins_over_force() {
    let config = GalaxyConfig {
        collections: vec!["community.general".to_string()],
        force: true,
        force_with_deps: true,
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let args = &mock.argv()[0];
    assert!(args.iter().any(|a| a == "--force-with-deps"));
    assert!(!args.iter().any(|a| a == "--force"), "plain --force must be dropped: {:?}", args);
}

#[test]
fn test_install_paths_are_scoped_per_kind() {
    let config = GalaxyConfig {
        roles: vec!["geerlingguy.nginx".to_string()],
        collections: vec!["community.general".to_string()],
        roles_path: Some(Utf8PathBuf::from("/deps/roles")),
        collections_path: Some(Utf8PathBuf::from("/deps/collections")),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert!(argv[0].windows(2).any(|w| w == ["-p", "/deps/roles"]));
    assert!(argv[1].windows(2).any(|w| w == ["-p", "/deps/collections"]));
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_installed_collection_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let collections_path = utf8_dir(&dir);
    let manifest_dir = collections_path
        .join("ansible_collections")
        .join("community")
        .join("general");
    std::fs::create_dir_all(&manifest_dir).unwrap();
    std::fs::write(manifest_dir.join("MANIFEST.json"), "{}").unwrap();

    let config = GalaxyConfig {
        collections: vec!["community.general".to_string(), "community.docker".to_string()],
        collections_path: Some(collections_path),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    let argv = mock.argv();
    assert_eq!(argv.len(), 1, "installed collection must be skipped");
    assert!(argv[0].iter().any(|a| a == "community.docker"));
}

#[test]
fn test_force_reinstalls_installed_collection() {
    let dir = tempfile::tempdir().unwrap();
    let collections_path = utf8_dir(&dir);
    let manifest_dir = collections_path
        .join("ansible_collections")
        .join("community")
        .join("general");
    std::fs::create_dir_all(&manifest_dir).unwrap();
    std::fs::write(manifest_dir.join("MANIFEST.json"), "{}").unwrap();

    let config = GalaxyConfig {
        collections: vec!["community.general".to_string()],
        collections_path: Some(collections_path),
        force: true,
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    assert_eq!(mock.call_count(), 1, "force must bypass the manifest check");
}

#[test]
fn test_malformed_collection_name_is_never_treated_as_installed() {
    let dir = tempfile::tempdir().unwrap();
    let config = GalaxyConfig {
        collections: vec!["community.general.extra".to_string()],
        collections_path: Some(utf8_dir(&dir)),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    install(&config, &mock).unwrap();

    assert_eq!(mock.call_count(), 1);
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_dependency_paths_exported_to_installer() {
    let config = GalaxyConfig {
        roles: vec!["geerlingguy.nginx".to_string()],
        roles_path: Some(Utf8PathBuf::from("/deps/roles")),
        collections_path: Some(Utf8PathBuf::from("/deps/collections")),
        ..GalaxyConfig::default()
    };
    let mock = Arc::new(MockExecutor::new());
    let base_env = vec![("PATH".to_string(), "/opt/bin:/usr/bin".to_string())];
    GalaxyInstaller::new(&config, mock.clone(), &base_env, &[], true)
        .install()
        .unwrap();

    let env = &mock.specs()[0].env;
    assert_eq!(env[0], ("PATH".to_string(), "/opt/bin:/usr/bin".to_string()));
    assert!(env.contains(&("ANSIBLE_ROLES_PATH".to_string(), "/deps/roles".to_string())));
    assert!(env.contains(&(
        "ANSIBLE_COLLECTIONS_PATH".to_string(),
        "/deps/collections".to_string()
    )));
}
