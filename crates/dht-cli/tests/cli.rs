use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn setup_writes_a_manifest_in_a_fresh_project() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();

    cargo_bin_cmd!("dht")
        .current_dir(temp.path())
        .args(["setup"])
        .assert()
        .success();

    assert!(temp.path().join(".dhtconfig").exists());
}

#[test]
fn setup_twice_fails_with_a_user_error_exit_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();

    cargo_bin_cmd!("dht").current_dir(temp.path()).args(["setup"]).assert().success();

    cargo_bin_cmd!("dht").current_dir(temp.path()).args(["setup"]).assert().code(2);
}

#[test]
fn setup_emits_a_json_envelope_under_the_json_flag() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();

    let output = cargo_bin_cmd!("dht")
        .current_dir(temp.path())
        .args(["--json", "setup"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["command"], "setup");
}

#[test]
fn clean_on_a_project_with_no_environment_is_a_no_op() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();

    cargo_bin_cmd!("dht").current_dir(temp.path()).args(["clean"]).assert().success();
}

#[test]
fn missing_subcommand_exits_with_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    cargo_bin_cmd!("dht").current_dir(temp.path()).assert().failure();
}
