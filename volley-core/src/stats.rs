use crate::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Min/max/mean over a set of samples. All zero for an empty set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// Summarizes `samples`; the unit is whatever the caller used.
///
/// The mean is accumulated over a sorted copy so that any permutation of the input produces a
/// bit-identical result.
pub fn summarize(samples: &[f64]) -> TimingSummary {
    if samples.is_empty() {
        return TimingSummary::default();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = sorted.iter().sum();
    TimingSummary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        avg: sum / sorted.len() as f64,
    }
}

/// Aggregate view over a completed run. Timing aggregates are in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub success_count: u64,
    pub failed_count: u64,
    pub requests_per_second: f64,
    pub total_time: TimingSummary,
    pub time_to_first_byte: TimingSummary,
    pub time_to_last_byte: TimingSummary,
}

impl RunStats {
    /// Builds the stats for `outcomes`, which took `wall_clock` to collect.
    pub fn from_outcomes(outcomes: &[ProbeOutcome], wall_clock: Duration) -> Self {
        let total = outcomes.len() as u64;
        let success_count = outcomes.iter().filter(|o| o.is_success()).count() as u64;

        let secs = wall_clock.as_secs_f64();
        // NOTE: A zero wall clock is treated as instantaneous.
        let requests_per_second = if secs > 0. {
            total as f64 / secs
        } else {
            total as f64
        };

        let seconds = |ms: f64| ms / 1_000.;
        let total_times: Vec<f64> = outcomes.iter().map(|o| seconds(o.elapsed_ms)).collect();
        let ttfb: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.time_to_first_byte_ms.map(seconds))
            .collect();
        let ttlb: Vec<f64> = outcomes
            .iter()
            .filter_map(|o| o.time_to_last_byte_ms.map(seconds))
            .collect();

        Self {
            success_count,
            failed_count: total - success_count,
            requests_per_second,
            total_time: summarize(&total_times),
            time_to_first_byte: summarize(&ttfb),
            time_to_last_byte: summarize(&ttlb),
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success={}, Failed={}, RPS={:.2}, avg={:.3}s, min={:.3}s, max={:.3}s",
            self.success_count,
            self.failed_count,
            self.requests_per_second,
            self.total_time.avg,
            self.total_time.min,
            self.total_time.max,
        )
    }
}
