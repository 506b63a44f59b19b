use assert_cmd::Command;

#[test]
fn help_lists_flags() {
    let output = Command::cargo_bin("gesturecam")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--server-url"));
    assert!(stdout.contains("--list-cameras"));
    assert!(stdout.contains("--save-config"));
}

#[test]
fn version_prints_package_version() {
    let output = Command::cargo_bin("gesturecam")
        .unwrap()
        .arg("--version")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn rejects_out_of_range_quality() {
    Command::cargo_bin("gesturecam")
        .unwrap()
        .args(["--jpeg-quality", "0"])
        .assert()
        .failure();
}
