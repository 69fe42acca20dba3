//! CLI subprocess integration tests.
//!
//! These invoke the `tuxrun-exec` binary and check exit codes and output.
//! Only the null backend actually runs anything; container backends are
//! exercised through `--print-command`.

use std::process::Command;

fn tuxrun_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tuxrun-exec"));
    cmd.env_remove("TUXRUN_LOG");
    cmd
}

#[test]
fn cli_version_exits_zero() {
    let output = tuxrun_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tuxrun-exec"));
}

#[test]
fn null_runtime_forwards_exit_code() {
    let output = tuxrun_bin()
        .args(["--runtime", "null", "--", "/bin/sh", "-c", "exit 3"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn null_runtime_json_report() {
    let output = tuxrun_bin()
        .args(["--runtime", "null", "--json", "--", "true"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["runtime"], "null");
    assert_eq!(report["returncode"], 0);
}

#[test]
fn unknown_runtime_is_config_error() {
    let output = tuxrun_bin()
        .args(["--runtime", "lxc", "--", "true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown runtime 'lxc'"));
}

#[test]
fn missing_binary_fails() {
    let output = tuxrun_bin()
        .args(["--runtime", "null", "--", "tuxrun-definitely-missing-binary"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn print_command_for_podman() {
    let dir = tempfile::tempdir().unwrap();
    let output = tuxrun_bin()
        .args([
            "--runtime",
            "podman",
            "--image",
            "image",
            "--name",
            "name",
            "--bind",
            "/hello/world",
            "--dir",
            dir.path().to_str().unwrap(),
            "--print-command",
            "--",
            "hello",
            "world",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.trim();
    assert!(line.starts_with("podman run --log-driver=none --rm --hostname tuxrun"));
    let socket = dir.path().join("podman.sock");
    let expected_tail = format!(
        "-v /hello/world:/hello/world:rw -v {}:/run/podman/podman.sock:rw --name name image hello world",
        socket.display()
    );
    assert!(line.ends_with(&expected_tail), "unexpected command: {line}");
    // Nothing was started, so no socket exists.
    assert!(!socket.exists());
}

#[test]
fn print_command_for_docker_includes_engine_socket() {
    let output = tuxrun_bin()
        .args([
            "--runtime",
            "docker",
            "--image",
            "image",
            "--print-command",
            "--",
            "true",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout
        .trim()
        .ends_with("-v /var/run/docker.sock:/var/run/docker.sock:rw image true"));
}

#[test]
fn print_command_json_strips_launcher() {
    let output = tuxrun_bin()
        .args([
            "--runtime",
            "docker",
            "--image",
            "image",
            "--skip-http-server",
            "--host-network",
            "--print-command",
            "--json",
            "--",
            "lava-run",
            "--device",
            "qemu",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let argv: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(argv[0], "docker");
    let tail = &argv[argv.len() - 7..];
    assert_eq!(
        tail,
        [
            "--network",
            "host",
            "--entrypoint",
            "/usr/bin/lava-run",
            "image",
            "--device",
            "qemu"
        ]
    );
}

#[test]
fn duplicate_destination_is_reported() {
    let output = tuxrun_bin()
        .args([
            "--runtime",
            "null",
            "--bind",
            "/hello:/world",
            "--bind",
            "/hello2:/world",
            "--",
            "hello",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Duplicated mount destination '/world'"));
}

#[test]
fn config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runtime.toml");
    std::fs::write(&path, "runtime = \"null\"\n").unwrap();
    let output = tuxrun_bin()
        .args(["--config", path.to_str().unwrap(), "--", "/bin/sh", "-c", "exit 7"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
}
