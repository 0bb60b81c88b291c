//! Probe Orchestrator Integration Tests
//!
//! Runs the full pipeline against loopback candidates.

mod integration_harness;

use fragprobe_probe::{Candidate, HttpConfig, Orchestrator, OrchestratorConfig, ThroughputProbe};
use integration_harness::{HttpServer, Route, dialer};
use std::time::Duration;
use url::Url;

fn orchestrator(server: &HttpServer, path: &str, config: OrchestratorConfig) -> Orchestrator<ThroughputProbe> {
    let http = HttpConfig {
        port: server.addr.port(),
        timeout: Duration::from_secs(2),
        ..HttpConfig::new(Url::parse(&format!("http://probe.test{path}")).unwrap())
    };
    let probe = ThroughputProbe::new(dialer(None, Duration::from_secs(1)), http);
    Orchestrator::new(probe, config)
}

/// 127.0.0.2 has nothing listening on the server's port
fn candidates() -> Vec<Candidate> {
    vec![
        Candidate::new("127.0.0.2".parse().unwrap(), Duration::from_millis(5)),
        Candidate::new("127.0.0.1".parse().unwrap(), Duration::from_millis(9)),
    ]
}

/// Test: the unreachable candidate is filtered out by the minimum speed
#[tokio::test]
async fn test_only_reachable_candidate_qualifies() {
    let server = HttpServer::start(vec![("/file", Route::ok(1024 * 1024))]).await;
    let config = OrchestratorConfig {
        count: 1,
        min_speed: 0.001,
        disabled: false,
    };

    let results = orchestrator(&server, "/file", config).run(candidates()).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ip.to_string(), "127.0.0.1");
    assert!(results[0].speed_mb() >= 0.001);
    assert_eq!(results[0].latency, Duration::from_millis(9));
}

/// Test: when nothing qualifies every probed candidate comes back
#[tokio::test]
async fn test_nothing_qualifies_returns_all_probed() {
    let server = HttpServer::start(vec![]).await;
    let config = OrchestratorConfig {
        count: 1,
        min_speed: 1.0,
        disabled: false,
    };

    let results = orchestrator(&server, "/missing", config).run(candidates()).await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|c| c.speed == 0.0));
    // Stable sort keeps latency order among equal speeds
    assert_eq!(results[0].ip.to_string(), "127.0.0.2");
}

/// Test: with no minimum speed, probing stops at the requested count
#[tokio::test]
async fn test_count_limits_attempts() {
    let server = HttpServer::start(vec![("/file", Route::ok(64 * 1024))]).await;
    let config = OrchestratorConfig {
        count: 1,
        min_speed: 0.0,
        disabled: false,
    };
    let mut input = candidates();
    input.reverse();

    let results = orchestrator(&server, "/file", config).run(input).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].ip.to_string(), "127.0.0.1");
    assert_eq!(server.requests().len(), 1);
}
