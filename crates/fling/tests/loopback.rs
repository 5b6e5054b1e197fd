// Numan Thabit 2025
//! End-to-end runs over TCP against the in-process reflector.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use fling::completion::CompletionQueue;
use fling::transport::Channel;
use fling::{CallContext, Driver, Histogram, RunPlan, Scenario, TcpChannel};
use fling_server::config::ServerConfig;
use fling_server::{launch_server, ServerHandle};
use tokio::runtime::Runtime;

fn start_server() -> (Runtime, ServerHandle) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = ServerConfig {
        bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..ServerConfig::default()
    };
    let handle = rt.block_on(launch_server(config)).expect("launch server");
    (rt, handle)
}

fn run(scenario: Scenario, payload_size: usize) -> fling::LatencyReport {
    let (rt, handle) = start_server();
    let channel = TcpChannel::connect(&handle.local_addr().to_string()).expect("connect");
    let ctx = CallContext::new(
        channel,
        Arc::new(CompletionQueue::new()),
        Bytes::from(vec![b'x'; payload_size]),
    );
    let histogram = Histogram::new(0.01, 60e9).expect("histogram");
    let report = Driver::new(ctx, histogram)
        .run(
            scenario,
            RunPlan {
                warmup: 20,
                measured: 200,
            },
        )
        .expect("benchmark run");
    rt.block_on(handle.shutdown()).expect("server shutdown");
    report
}

#[test]
fn unary_round_trips_over_tcp() {
    let report = run(Scenario::PingPongRequest, 1);
    assert_eq!(report.samples, 200);
    assert_eq!(report.calls_created, 220);
    assert_eq!(report.drained_events, 0);
    assert!(report.p50 > 0.0);
    assert!(report.p50 <= report.p95);
    assert!(report.p95 <= report.p99);
    assert!(report.p99 <= report.p999);
}

#[test]
fn stream_round_trips_over_tcp() {
    let report = run(Scenario::PingPongStream, 512);
    assert_eq!(report.samples, 200);
    assert_eq!(report.calls_created, 1);
    // The open call's finished tag is cancelled at teardown.
    assert_eq!(report.drained_events, 1);
    assert_eq!(report.payload_size, 512);
}

#[test]
fn finite_deadline_is_refused_by_tcp_transport() {
    let (rt, handle) = start_server();
    let channel = TcpChannel::connect(&handle.local_addr().to_string()).expect("connect");
    let result = channel.create_call(
        fling_wire::METHOD_REFLECT_UNARY,
        "localhost",
        fling::completion::Deadline::after(std::time::Duration::from_secs(1)),
    );
    assert!(matches!(
        result,
        Err(fling::transport::CallError::UnsupportedDeadline)
    ));
    drop(channel);
    rt.block_on(handle.shutdown()).expect("server shutdown");
}

#[test]
fn connect_failure_is_reported() {
    // Bind then drop to find a port with nothing listening.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("probe port")
        .port();
    match TcpChannel::connect(&format!("127.0.0.1:{port}")) {
        Ok(_) => panic!("nothing should be listening on port {port}"),
        Err(err) => assert!(err.to_string().contains("failed to connect")),
    }
}
