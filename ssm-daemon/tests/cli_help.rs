use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;

#[test]
fn help_mentions_filesystem_roots() {
    let mut cmd = cargo_bin_cmd!("ssm-daemon");
    let output = cmd.arg("--help").assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("--config-root"), "help missing --config-root");
    assert!(text.contains("--sources-root"), "help missing --sources-root");
    assert!(text.contains("--override-root"), "help missing --override-root");
    assert!(text.contains("--merged-root"), "help missing --merged-root");
}

#[test]
fn help_mentions_once_flag() {
    let mut cmd = cargo_bin_cmd!("ssm-daemon");
    let output = cmd.arg("--help").assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("--once"), "help missing --once flag");
}

#[test]
fn malformed_settings_yml_fails_with_nonzero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let config_root = dir.path().join("config");
    fs::create_dir_all(&config_root).unwrap();
    // `poll_timeout_seconds` must be positive (ssm-config's own validation pass covers this case
    // directly; this confirms the daemon binary surfaces it as a nonzero exit rather than a panic).
    fs::write(config_root.join("settings.yml"), b"poll_timeout_seconds: 0\n").unwrap();

    let mut cmd = cargo_bin_cmd!("ssm-daemon");
    cmd.arg("--config-root")
        .arg(&config_root)
        .arg("--sources-root")
        .arg(dir.path().join("sources"))
        .arg("--override-root")
        .arg(dir.path().join("override"))
        .arg("--merged-root")
        .arg(dir.path().join("merged"))
        .arg("--once")
        .assert()
        .failure();
}
