//! Integration tests for real session processes: spawning, the protocol
//! exchange, deadlines, and termination.

use std::ffi::OsString;
use std::time::{Duration, Instant};

use serde_json::json;
use serial_test::serial;

use relay_bench::config::TimeoutConfig;
use relay_bench::probe::{MemoryProbe, ProbeTarget};
use relay_bench::session::{SessionLauncher, SessionMode};
use relay_bench::AppError;

use super::test_helpers::{
    mock_config, quick_timeouts, ERROR_SERVER, EXITING_SERVER, MOCK_SERVER, SILENT_SERVER,
};

fn launcher(server: &str) -> SessionLauncher {
    SessionLauncher::new(&mock_config(server, MOCK_SERVER))
}

// ── Direct sessions ─────────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn direct_session_handshake_and_call() {
    let launcher = launcher(MOCK_SERVER);
    let mut session = launcher.open_direct().expect("spawn");
    assert_eq!(session.mode(), SessionMode::Direct);
    assert!(session.label().starts_with("direct#"));

    let done = session.handshake().await.expect("handshake");
    assert_eq!(done.response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(session.latencies().len(), 1);

    let ok = session
        .check_call("list_directory", &json!({ "path": "/tmp" }), 10)
        .await
        .expect("call");
    assert!(ok);
    assert!(session.is_ok());

    let status = launcher.close(session).await;
    assert!(status.is_some(), "closed session must be reaped");
}

/// Two live direct sessions measure as a non-empty union of trees.
#[tokio::test]
#[serial]
async fn two_direct_sessions_measured() {
    let launcher = launcher(MOCK_SERVER);
    let mut sessions = Vec::new();
    for id in [10, 11] {
        let mut session = launcher.open_direct().expect("spawn");
        session.handshake().await.expect("handshake");
        assert!(session
            .check_call("list_directory", &json!({}), id)
            .await
            .expect("call"));
        sessions.push(session);
    }

    let probe = MemoryProbe::for_platform(&quick_timeouts());
    let targets: Vec<ProbeTarget> = sessions.iter().map(|s| ProbeTarget::Tree(s.pid())).collect();
    let sample = probe.measure(&targets, false).await;

    assert!(sample.rss_kb > 0, "live sessions must have resident memory");
    assert!(sample.processes >= 2);

    let pids: Vec<u32> = sessions.iter().map(|s| s.pid()).collect();
    for session in sessions {
        launcher.close(session).await;
    }

    let after = probe
        .measure(&pids.iter().map(|p| ProbeTarget::Tree(*p)).collect::<Vec<_>>(), false)
        .await;
    assert_eq!(after.rss_kb, 0, "closed sessions must measure zero");
}

// ── Failure modes ───────────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn silent_server_times_out() {
    let mut config = mock_config(SILENT_SERVER, MOCK_SERVER);
    config.timeouts = TimeoutConfig {
        read_seconds: 1,
        ..quick_timeouts()
    };
    let launcher = SessionLauncher::new(&config);
    let mut session = launcher.open_direct().expect("spawn");

    let started = Instant::now();
    let err = session.handshake().await.expect_err("no reply");
    let elapsed = started.elapsed();

    assert!(matches!(err, AppError::Timeout(_)), "got {err}");
    assert!(elapsed >= Duration::from_secs(1), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overshot: {elapsed:?}");
    assert!(!session.is_ok());

    launcher.close(session).await;
}

#[tokio::test]
#[serial]
async fn exiting_server_fails_handshake() {
    let launcher = launcher(EXITING_SERVER);
    let mut session = launcher.open_direct().expect("spawn");

    let err = session.handshake().await.expect_err("server gone");
    assert!(
        matches!(err, AppError::StreamClosed(_) | AppError::Io(_)),
        "got {err}"
    );
    assert!(!session.is_ok());

    // Already exited: close must still reap without waiting out the grace.
    let started = Instant::now();
    assert!(launcher.close(session).await.is_some());
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
#[serial]
async fn error_reply_marks_session_incorrect() {
    let launcher = launcher(ERROR_SERVER);
    let mut session = launcher.open_direct().expect("spawn");
    session.handshake().await.expect("handshake");

    let ok = session
        .check_call("list_directory", &json!({}), 10)
        .await
        .expect("transport still fine");
    assert!(!ok);
    assert!(!session.is_ok());

    let err = session
        .invoke("list_directory", &json!({}), 11)
        .await
        .expect_err("error reply");
    assert!(matches!(err, AppError::CallFailed(ref m) if m == "no such tool"), "got {err}");

    launcher.close(session).await;
}

/// A server that ignores the stop signal is killed after the grace window.
#[tokio::test]
#[serial]
async fn stubborn_server_killed_after_grace() {
    let launcher = launcher("trap '' TERM; cat > /dev/null; sleep 3");
    let session = launcher.open_direct().expect("spawn");

    let started = Instant::now();
    let status = launcher.close(session).await;
    let elapsed = started.elapsed();

    assert!(status.is_some(), "process must be reaped");
    assert!(elapsed < Duration::from_secs(3), "kill took {elapsed:?}");
}

// ── Relayed sessions ────────────────────────────────────────────────────────

#[tokio::test]
#[serial]
async fn relayed_session_receives_env_overrides() {
    let script = r#"printf '{"jsonrpc":"2.0","id":1,"result":{"dir":"%s"}}\n' "$BENCH_MARKER"; cat > /dev/null"#;
    let launcher = SessionLauncher::new(&mock_config(MOCK_SERVER, script));
    let env: Vec<(String, OsString)> = vec![("BENCH_MARKER".to_owned(), "/tmp/marker".into())];

    let mut session = launcher.open_relayed(&env).expect("spawn relay");
    assert_eq!(session.mode(), SessionMode::Relayed);

    let done = session.handshake().await.expect("handshake");
    assert_eq!(done.response["result"]["dir"], "/tmp/marker");

    launcher.close(session).await;
}

#[tokio::test]
async fn missing_relay_binary_is_spawn_error() {
    let mut config = mock_config(MOCK_SERVER, MOCK_SERVER);
    config.relay_binary = "/nonexistent/relay".into();
    let launcher = SessionLauncher::new(&config);

    let err = launcher.open_relayed(&[]).expect_err("no relay");
    assert!(matches!(err, AppError::Spawn(_)), "got {err}");
}
