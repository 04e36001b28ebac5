#![cfg(feature = "cli")]

use std::net::TcpListener;
use std::process::Command;

fn closed_port_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should work");
    let addr = listener.local_addr().expect("bound addr").to_string();
    drop(listener);
    addr
}

#[test]
fn call_against_closed_port_exits_3() {
    let output = Command::new(env!("CARGO_BIN_EXE_kvrpc"))
        .args(["--log-level", "error", "call", "--addr", &closed_port_addr()])
        .args(["read", "0", "--timeout", "1s"])
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: read failed"), "stderr: {stderr}");
}

#[test]
fn malformed_kwarg_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_kvrpc"))
        .args(["call", "--addr", &closed_port_addr(), "read", "--kwarg", "index"])
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn bench_rejects_zero_iterations() {
    let output = Command::new(env!("CARGO_BIN_EXE_kvrpc"))
        .args(["bench", "--iterations", "0"])
        .output()
        .expect("bench should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_kvrpc"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("kvrpc {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn extended_version_lists_methods() {
    let output = Command::new(env!("CARGO_BIN_EXE_kvrpc"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("methods: write, read"));
    assert!(stdout.contains("features: async=true"));
}
