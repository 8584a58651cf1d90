//! Result model: per-phase measurements and the final experiment report.

pub mod phase;
pub mod report;

pub use phase::{Calibration, PhaseResult, SurvivalResult};
pub use report::ExperimentReport;

use std::time::Duration;

use serde::Serializer;

/// Serialise an optional [`Duration`] as fractional seconds or `null`.
#[allow(clippy::ref_option)]
pub(crate) fn serialize_opt_secs<S>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

/// Serialise a list of [`Duration`]s as fractional seconds.
pub(crate) fn serialize_secs_list<S>(values: &[Duration], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(values.iter().map(Duration::as_secs_f64))
}
