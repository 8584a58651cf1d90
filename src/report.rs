//! Console rendering and JSON export of an [`ExperimentReport`].
//!
//! The console layout is a set of fixed-width tables with one column per
//! session count:
//!
//! ```text
//!   Memory: resident set
//!   Sessions          2        3        5
//!   ---------------------------------------
//!   Direct       182 MB   273 MB   455 MB
//!   Shared        96 MB   101 MB   110 MB
//!   Ratio          1.9x     2.7x     4.1x
//! ```

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::models::ExperimentReport;
use crate::{AppError, Result};

const LABEL_WIDTH: usize = 10;
const COLUMN_WIDTH: usize = 9;
const RULE_WIDTH: usize = 50;

/// Kilobytes as whole mebibytes, rounded.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_mb(kb: u64) -> String {
    format!("{:.0} MB", kb as f64 / 1024.0)
}

/// Duration as seconds with `digits` decimals.
#[must_use]
pub fn format_secs(duration: Duration, digits: usize) -> String {
    format!("{:.digits$}s", duration.as_secs_f64())
}

fn pass_fail(ok: bool) -> &'static str {
    if ok {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Human-readable rendering of a finished report.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReport<'a> {
    report: &'a ExperimentReport,
    server: &'a str,
}

impl<'a> ConsoleReport<'a> {
    /// Render `report`; `server` names the measured server in the footer.
    #[must_use]
    pub fn new(report: &'a ExperimentReport, server: &'a str) -> Self {
        Self { report, server }
    }

    fn header(&self, f: &mut Formatter<'_>, title: &str) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "  {title}")?;
        write!(f, "  {:<LABEL_WIDTH$}", "Sessions")?;
        for n in &self.report.session_counts {
            write!(f, "{n:>COLUMN_WIDTH$}")?;
        }
        writeln!(f)?;
        let width = LABEL_WIDTH + COLUMN_WIDTH * self.report.session_counts.len();
        writeln!(f, "  {}", "-".repeat(width))
    }

    fn row<F>(&self, f: &mut Formatter<'_>, label: &str, cell: F) -> fmt::Result
    where
        F: Fn(usize) -> Option<String>,
    {
        write!(f, "  {label:<LABEL_WIDTH$}")?;
        for &n in &self.report.session_counts {
            let text = cell(n).unwrap_or_else(|| "?".to_owned());
            write!(f, "{text:>COLUMN_WIDTH$}")?;
        }
        Ok(())
    }

    fn memory_tables(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;

        self.header(f, "Memory: resident set")?;
        self.row(f, "Direct", |n| report.direct_at(n).map(|r| format_mb(r.rss_kb)))?;
        writeln!(f)?;
        self.row(f, "Shared", |n| report.shared_at(n).map(|r| format_mb(r.rss_kb)))?;
        writeln!(f)?;
        self.row(f, "Ratio", |n| report.rss_ratio(n).map(|r| format!("{r:.1}x")))?;
        writeln!(f)?;

        let Some(calibration) = report.calibration.as_ref().filter(|c| c.has_dirty()) else {
            return Ok(());
        };
        self.header(
            f,
            &format!(
                "Memory: private dirty (calibrated at N={}, direct={:.0}%, shared={:.0}%)",
                calibration.sessions,
                calibration.direct_ratio() * 100.0,
                calibration.shared_ratio() * 100.0,
            ),
        )?;
        self.row(f, "Direct", |n| report.estimated_direct_dirty_kb(n).map(format_mb))?;
        writeln!(f)?;
        self.row(f, "Shared", |n| report.estimated_shared_dirty_kb(n).map(format_mb))?;
        writeln!(f)?;
        self.row(f, "Ratio", |n| {
            let direct = report.estimated_direct_dirty_kb(n)?;
            let shared = report.estimated_shared_dirty_kb(n).filter(|kb| *kb > 0)?;
            #[allow(clippy::cast_precision_loss)]
            let ratio = direct as f64 / shared as f64;
            Some(format!("{ratio:.1}x"))
        })?;
        writeln!(f)
    }

    fn startup_table(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;

        self.header(f, "Startup time (Nth session)")?;
        self.row(f, "Direct", |n| {
            report.direct_at(n)?.last_time().map(|t| format_secs(t, 2))
        })?;
        writeln!(f, "  (always cold)")?;
        self.row(f, "Shared", |n| {
            report.shared_at(n)?.last_time().map(|t| format_secs(t, 2))
        })?;
        writeln!(f, "  (first cold, rest warm)")
    }

    fn qualitative(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let survival = &self.report.survival;

        writeln!(f)?;
        writeln!(f, "  Qualitative")?;
        writeln!(f, "  {}", "-".repeat(RULE_WIDTH))?;
        writeln!(
            f,
            "  Session survival (disconnect one relay):  {}",
            pass_fail(survival.survival_ok)
        )?;
        writeln!(
            f,
            "  Reconnect after all relays closed:        {}",
            pass_fail(survival.reconnect_ok)
        )?;
        if let Some(time) = survival.reconnect_time {
            writeln!(f, "  Reconnect time (server stays alive):      {}", format_secs(time, 3))?;
        }
        if let Some(speedup) = self.report.reconnect_speedup() {
            writeln!(f, "  Reconnect vs cold start:                  {speedup:.0}x faster")?;
        }
        if let Some(error) = &survival.error {
            writeln!(f, "  Survival scenario error: {error}")?;
        }
        Ok(())
    }

    fn methodology(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "  Methodology")?;
        writeln!(f, "  {}", "-".repeat(RULE_WIDTH))?;
        writeln!(f, "  Resident set counts shared library pages once per process,")?;
        writeln!(f, "  which inflates N full servers more than one daemon plus N")?;
        writeln!(f, "  thin relays.")?;
        if let Some(calibration) = self
            .report
            .calibration
            .as_ref()
            .filter(|c| c.has_direct_dirty())
        {
            writeln!(
                f,
                "  Private dirty corrects for this: {:.0}% of the direct resident",
                calibration.direct_ratio() * 100.0
            )?;
            writeln!(f, "  set is truly private; the rest is shared pages counted N times.")?;
        }
        writeln!(f, "  Server: {}", self.server)
    }
}

impl Display for ConsoleReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(70))?;
        writeln!(f, "  RESULTS")?;
        writeln!(f, "{}", "=".repeat(70))?;

        self.memory_tables(f)?;
        self.startup_table(f)?;
        self.qualitative(f)?;
        self.methodology(f)
    }
}

/// Write `report` as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns `AppError::Io` if the file cannot be written.
pub fn export_json(report: &ExperimentReport, path: &Path) -> Result<()> {
    let body = serde_json::to_vec_pretty(report)
        .map_err(|err| AppError::Io(format!("failed to serialise report: {err}")))?;
    std::fs::write(path, body)
        .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;
    info!(path = %path.display(), "report exported");
    Ok(())
}
