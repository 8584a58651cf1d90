//! Unit tests for console rendering and JSON export.

use std::time::Duration;

use relay_bench::models::{Calibration, ExperimentReport, PhaseResult, SurvivalResult};
use relay_bench::probe::MemorySample;
use relay_bench::report::{export_json, format_mb, format_secs, ConsoleReport};

fn measured(sessions: usize, rss_kb: u64, dirty_kb: u64, times: &[f64]) -> PhaseResult {
    PhaseResult::measured(
        sessions,
        MemorySample {
            rss_kb,
            dirty_kb,
            processes: sessions,
        },
        times.iter().copied().map(Duration::from_secs_f64).collect(),
        true,
    )
}

fn report(calibrated: bool) -> ExperimentReport {
    let mut report = ExperimentReport::new(vec![2, 5]);
    report.direct = vec![
        measured(2, 204_800, 0, &[1.8, 1.9]),
        measured(5, 512_000, 0, &[1.8, 1.9, 1.9, 2.0, 2.1]),
    ];
    report.shared = vec![
        measured(2, 102_400, 0, &[1.9, 0.05]),
        PhaseResult::failed(5, "timeout: relayed#9"),
    ];
    report.survival = SurvivalResult {
        survival_ok: true,
        reconnect_ok: false,
        reconnect_time: Some(Duration::from_millis(60)),
        error: None,
    };
    if calibrated {
        report.calibration = Some(Calibration {
            sessions: 2,
            direct: measured(2, 204_800, 102_400, &[1.8, 1.8]),
            shared: measured(2, 102_400, 92_160, &[0.1, 0.1]),
        });
    }
    report
}

#[test]
fn formats_megabytes_and_seconds() {
    assert_eq!(format_mb(204_800), "200 MB");
    assert_eq!(format_mb(0), "0 MB");
    assert_eq!(format_secs(Duration::from_millis(1250), 2), "1.25s");
    assert_eq!(format_secs(Duration::from_millis(60), 3), "0.060s");
}

#[test]
fn renders_rss_table_with_ratio() {
    let text = ConsoleReport::new(&report(false), "npx server").to_string();

    assert!(text.contains("Memory: resident set"));
    assert!(text.contains("200 MB"));
    assert!(text.contains("100 MB"));
    assert!(text.contains("2.0x"));
    assert!(text.contains('?'), "failed shared step has no ratio");
    assert!(!text.contains("private dirty"), "no calibration table without data");
}

#[test]
fn renders_calibrated_table_when_dirty_known() {
    let text = ConsoleReport::new(&report(true), "npx server").to_string();

    assert!(text.contains("private dirty (calibrated at N=2, direct=50%, shared=90%)"));
    assert!(text.contains("Private dirty corrects for this: 50%"));
}

/// A failed direct dirty probe must not hide the shared correction.
#[test]
fn renders_calibrated_table_with_shared_dirty_only() {
    let mut report = report(false);
    report.calibration = Some(Calibration {
        sessions: 2,
        direct: measured(2, 204_800, 0, &[1.8, 1.8]),
        shared: measured(2, 102_400, 92_160, &[0.1, 0.1]),
    });

    let text = ConsoleReport::new(&report, "npx server").to_string();

    assert!(text.contains("private dirty (calibrated at N=2, direct=100%, shared=90%)"));
    assert!(!text.contains("Private dirty corrects for this"));
}

#[test]
fn renders_startup_and_qualitative_blocks() {
    let text = ConsoleReport::new(&report(false), "npx server").to_string();

    assert!(text.contains("Startup time (Nth session)"));
    assert!(text.contains("1.90s"));
    assert!(text.contains("0.05s"));
    assert!(text.contains("Session survival (disconnect one relay):  PASS"));
    assert!(text.contains("Reconnect after all relays closed:        FAIL"));
    assert!(text.contains("0.060s"));
    assert!(text.contains("30x faster"));
    assert!(text.contains("Server: npx server"));
}

#[test]
fn json_export_round_trips_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");

    export_json(&report(true), &path).expect("export");

    let raw = std::fs::read_to_string(&path).expect("read back");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(json["calibration"]["sessions"], 2);
    assert_eq!(json["shared"][1]["ok"], false);
}

#[test]
fn json_export_to_missing_dir_is_io_error() {
    let err = export_json(&report(false), std::path::Path::new("/nonexistent/dir/r.json"))
        .expect_err("cannot write");
    assert!(err.to_string().starts_with("io:"), "got {err}");
}
