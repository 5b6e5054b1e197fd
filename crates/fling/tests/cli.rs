// Numan Thabit 2025
use std::process::Command;

use tempfile::tempdir;

fn client() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fling_client"))
}

#[test]
fn unknown_scenario_exits_with_status_one() {
    let output = client()
        .args(["--scenario", "does-not-exist"])
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn fling_client");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported scenario 'does-not-exist'"));
    assert!(stderr.contains("ping-pong-request"));
    assert!(stderr.contains("ping-pong-stream"));
}

#[test]
fn zero_payload_is_rejected_before_connecting() {
    let output = client()
        .args(["--payload_size", "0", "--target", "127.0.0.1:1"])
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn fling_client");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("payload_size"));
}

#[test]
fn writes_json_report_against_live_server() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let config = fling_server::config::ServerConfig {
        bind: std::net::SocketAddr::from(([127, 0, 0, 1], 0)),
        ..Default::default()
    };
    let handle = rt
        .block_on(fling_server::launch_server(config))
        .expect("launch server");

    let dir = tempdir().expect("tempdir");
    let report_path = dir.path().join("report.json");
    let output = client()
        .args([
            "--target",
            &handle.local_addr().to_string(),
            "--scenario",
            "ping-pong-stream",
            "--warmup",
            "10",
            "--iterations",
            "100",
            "--secure",
            "--output_json",
        ])
        .arg(&report_path)
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn fling_client");
    assert!(output.status.success(), "client failed: {output:?}");
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("latency (50/95/99/99.9): "));

    let raw = std::fs::read_to_string(&report_path).expect("report written");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(json["scenario"], "ping-pong-stream");
    assert_eq!(json["samples"], 100);
    assert_eq!(json["calls_created"], 1);
    assert_eq!(json["secure"], true);

    rt.block_on(handle.shutdown()).expect("server shutdown");
}
