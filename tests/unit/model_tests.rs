//! Unit tests for phase results, calibration ratios, and the report model.

use std::time::Duration;

use relay_bench::models::phase::{calibration_ratio, estimate_dirty_kb};
use relay_bench::models::{Calibration, ExperimentReport, PhaseResult, SurvivalResult};
use relay_bench::probe::MemorySample;

fn sample(rss_kb: u64, dirty_kb: u64) -> MemorySample {
    MemorySample {
        rss_kb,
        dirty_kb,
        processes: 2,
    }
}

fn secs(values: &[f64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs_f64).collect()
}

// ── Calibration ratio ───────────────────────────────────────────────────────

#[test]
fn ratio_is_dirty_over_rss() {
    let ratio = calibration_ratio(200_000, 50_000);
    assert!((ratio - 0.25).abs() < f64::EPSILON);
}

#[test]
fn ratio_falls_back_to_one_on_zero() {
    assert!((calibration_ratio(0, 100) - 1.0).abs() < f64::EPSILON);
    assert!((calibration_ratio(100, 0) - 1.0).abs() < f64::EPSILON);
    assert!((calibration_ratio(0, 0) - 1.0).abs() < f64::EPSILON);
}

#[test]
fn ratio_never_exceeds_one() {
    assert!((calibration_ratio(100, 250) - 1.0).abs() < f64::EPSILON);
}

#[test]
fn ratio_always_in_unit_interval() {
    for (rss, dirty) in [(1, 1), (3, 1), (1_000_000, 7), (5, 5_000), (0, 9)] {
        let ratio = calibration_ratio(rss, dirty);
        assert!(ratio > 0.0 && ratio <= 1.0, "{rss}/{dirty} gave {ratio}");
    }
}

#[test]
fn estimate_rescales_and_rounds() {
    assert_eq!(estimate_dirty_kb(1000, 0.25), 250);
    assert_eq!(estimate_dirty_kb(3, 0.5), 2);
    assert_eq!(estimate_dirty_kb(0, 0.5), 0);
}

// ── Phase results ───────────────────────────────────────────────────────────

#[test]
fn measured_result_copies_sample() {
    let result = PhaseResult::measured(2, sample(1024, 0), secs(&[1.5, 0.5]), true);

    assert_eq!(result.rss_kb, 1024);
    assert_eq!(result.processes, 2);
    assert!(result.ok);
    assert!(result.error.is_none());
    assert_eq!(result.first_time(), Some(Duration::from_secs_f64(1.5)));
    assert_eq!(result.last_time(), Some(Duration::from_secs_f64(0.5)));
    assert_eq!(result.average_time(), Some(Duration::from_secs(1)));
}

#[test]
fn failed_result_is_zeroed() {
    let result = PhaseResult::failed(5, "spawn: npx missing");

    assert_eq!(result.sessions, 5);
    assert_eq!(result.rss_kb, 0);
    assert!(!result.ok);
    assert!(result.times.is_empty());
    assert_eq!(result.average_time(), None);
    assert_eq!(result.error.as_deref(), Some("spawn: npx missing"));
}

// ── Report ──────────────────────────────────────────────────────────────────

fn report() -> ExperimentReport {
    let mut report = ExperimentReport::new(vec![2, 3]);
    report.direct = vec![
        PhaseResult::measured(2, sample(200_000, 0), secs(&[2.0, 2.1]), true),
        PhaseResult::measured(3, sample(300_000, 0), secs(&[2.0, 2.0, 2.2]), true),
    ];
    report.shared = vec![
        PhaseResult::measured(2, sample(100_000, 0), secs(&[2.5, 0.1]), true),
        PhaseResult::failed(3, "timeout: relay"),
    ];
    report.survival = SurvivalResult {
        survival_ok: true,
        reconnect_ok: true,
        reconnect_time: Some(Duration::from_millis(50)),
        error: None,
    };
    report.calibration = Some(Calibration {
        sessions: 2,
        direct: PhaseResult::measured(2, sample(200_000, 100_000), secs(&[2.0, 2.0]), true),
        shared: PhaseResult::measured(2, sample(100_000, 80_000), secs(&[0.1, 0.1]), true),
    });
    report
}

#[test]
fn rss_ratio_per_count() {
    let report = report();

    let ratio = report.rss_ratio(2).expect("both figures present");
    assert!((ratio - 2.0).abs() < f64::EPSILON);
    assert_eq!(report.rss_ratio(3), None, "zero shared figure has no ratio");
    assert_eq!(report.rss_ratio(99), None);
}

#[test]
fn estimated_dirty_uses_mode_ratio() {
    let report = report();

    assert_eq!(report.estimated_direct_dirty_kb(2), Some(100_000));
    assert_eq!(report.estimated_shared_dirty_kb(2), Some(80_000));
    assert_eq!(report.estimated_direct_dirty_kb(3), Some(150_000));
}

#[test]
fn calibration_dirty_checked_per_mode() {
    let shared_only = Calibration {
        sessions: 2,
        direct: PhaseResult::measured(2, sample(200_000, 0), secs(&[2.0]), true),
        shared: PhaseResult::measured(2, sample(100_000, 80_000), secs(&[0.1]), true),
    };
    assert!(shared_only.has_dirty());
    assert!(!shared_only.has_direct_dirty());

    let neither = Calibration {
        shared: PhaseResult::measured(2, sample(100_000, 0), secs(&[0.1]), true),
        ..shared_only
    };
    assert!(!neither.has_dirty());
}

#[test]
fn uncalibrated_report_estimates_with_rss() {
    let mut report = report();
    report.calibration = None;

    assert_eq!(report.estimated_direct_dirty_kb(2), Some(200_000));
}

#[test]
fn reconnect_speedup_against_first_cold_start() {
    let report = report();

    assert_eq!(report.cold_start(), Some(Duration::from_secs(2)));
    let speedup = report.reconnect_speedup().expect("speedup");
    assert!((speedup - 40.0).abs() < 1e-9, "got {speedup}");
}

#[test]
fn all_ok_requires_every_step_and_survival() {
    let mut report = report();
    assert!(!report.all_ok(), "failed shared step must show");

    report.shared[1] = PhaseResult::measured(3, sample(1, 0), secs(&[0.1]), true);
    assert!(report.all_ok());

    report.survival.reconnect_ok = false;
    assert!(!report.all_ok());
}

#[test]
fn report_serialises_durations_as_seconds() {
    let report = report();
    let json = serde_json::to_value(&report).expect("serialise");

    assert_eq!(json["session_counts"], serde_json::json!([2, 3]));
    assert_eq!(json["direct"][0]["times"][0], 2.0);
    assert_eq!(json["survival"]["reconnect_time"], 0.05);
    assert_eq!(json["shared"][1]["error"], "timeout: relay");
    assert!(json["started_at"].is_string());
    assert!(json["finished_at"].is_null());
}
