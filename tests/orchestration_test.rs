mod helpers;

use std::sync::Arc;

use helpers::MockExecutor;
use rsansible::{cli, run_apply, run_validate};

#[test]
fn run_apply_uses_executor_with_built_args() {
    let opts = cli::ApplyArgs {
        file: "demos/local_baseline.yml".into(),
        log_level: cli::LogLevel::Error,
        dry_run: true,
    };
    let mock = Arc::new(MockExecutor::new());

    run_apply(&opts, mock.clone()).expect("run_apply should succeed");

    let argv = mock.argv();
    assert_eq!(argv.len(), 1);
    assert_eq!(argv[0][0], "ansible-navigator");
    assert_eq!(argv[0][1], "run");
    assert!(
        argv[0].last().unwrap().ends_with("playbooks/baseline.yml"),
        "expected resolved playbook path, got: {:?}",
        argv[0]
    );
}

#[test]
fn run_apply_full_profile_installs_dependencies_first() {
    let opts = cli::ApplyArgs {
        file: "demos/image_build_full.yml".into(),
        log_level: cli::LogLevel::Error,
        dry_run: true,
    };
    let mock = Arc::new(MockExecutor::new());

    run_apply(&opts, mock.clone()).expect("run_apply should succeed");

    let argv = mock.argv();
    // Two galaxy installs from the requirements file, then two plays
    assert_eq!(argv.len(), 4);
    assert_eq!(argv[0][0], "ansible-galaxy");
    assert_eq!(argv[0][1], "role");
    assert_eq!(argv[1][0], "ansible-galaxy");
    assert_eq!(argv[1][1], "collection");
    assert_eq!(argv[2][0], "ansible-navigator");
    assert_eq!(argv[3][0], "ansible-navigator");

    // The hardening play carries its own flags
    let hardening = &argv[3];
    assert!(hardening.iter().any(|a| a == "--become"));
    let tag_pos = hardening.iter().position(|a| a == "--tags").expect("--tags expected");
    assert_eq!(hardening[tag_pos + 1], "ssh");
    assert!(hardening.last().unwrap().ends_with("playbooks/hardening.yml"));
}

#[test]
fn run_validate_succeeds_on_sample_profiles() {
    for file in ["demos/local_baseline.yml", "demos/image_build_full.yml"] {
        let opts = cli::ValidateArgs {
            file: file.into(),
            log_level: cli::LogLevel::Error,
        };
        run_validate(&opts)
            .unwrap_or_else(|e| panic!("{} should validate, got: {:#}", file, e));
    }
}

#[test]
fn run_validate_reports_missing_playbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yml");
    std::fs::write(&path, "plays:\n  - target: does-not-exist.yml\n").unwrap();

    let opts = cli::ValidateArgs {
        file: path.to_str().unwrap().into(),
        log_level: cli::LogLevel::Error,
    };
    let err = run_validate(&opts).expect_err("validation should fail");
    let err_string = format!("{:#}", err);
    assert!(
        err_string.contains("not found"),
        "Expected missing playbook report, got: {}",
        err_string
    );
}

#[test]
fn test_run_apply_propagates_play_failure() {
    let opts = cli::ApplyArgs {
        file: "demos/local_baseline.yml".into(),
        log_level: cli::LogLevel::Error,
        dry_run: true,
    };
    let executor = Arc::new(MockExecutor::failing_on(0));

    let result = run_apply(&opts, executor);

    assert!(result.is_err());
    let err_string = format!("{:#}", result.unwrap_err());
    assert!(
        err_string.contains("play 'baseline' failed"),
        "Expected play failure error, got: {}",
        err_string
    );
}
