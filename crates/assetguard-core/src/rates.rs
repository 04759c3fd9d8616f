//! Activation and deactivation rates of the asset.
//!
//! The asset's boolean column is read as an alternating sequence of runs.
//! Holding times are measured between paired run boundaries; the rate is the
//! reciprocal of the mean holding time.

use serde::Serialize;
use statrs::statistics::Statistics;
use thiserror::Error;

/// Rate estimation failures.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RateError {
    /// No complete run was observed, so the mean holding time is undefined.
    #[error("indeterminate rate: no complete run aligned to {start_aligned}")]
    Indeterminate { start_aligned: bool },
}

/// Asset activation/deactivation rates, both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatePair {
    /// Inverse mean time spent inactive before activating.
    pub activation_rate: f64,
    /// Inverse mean time spent active before deactivating.
    pub deactivation_rate: f64,
}

/// Step indices at which the column changes value.
///
/// A change between rows `i` and `i + 1` is recorded at `i + 1`, the first
/// row of the new run.
pub fn run_boundaries(column: &[bool]) -> Vec<usize> {
    column
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] != w[1])
        .map(|(i, _)| i + 1)
        .collect()
}

/// Lengths of the runs whose value equals `start_aligned`.
///
/// Row 0 counts as an implicit boundary when the column starts with the
/// aligned value. With an odd number of boundaries the last one opens a run
/// that never closes, so it is discarded.
pub fn run_lengths(column: &[bool], start_aligned: bool) -> Vec<usize> {
    let mut boundaries = run_boundaries(column);
    if column.first() == Some(&start_aligned) {
        boundaries.insert(0, 0);
    }
    if boundaries.len() % 2 == 1 {
        boundaries.pop();
    }
    boundaries.chunks_exact(2).map(|p| p[1] - p[0]).collect()
}

/// Mean length of the complete runs aligned to `start_aligned`.
pub fn mean_run_length(column: &[bool], start_aligned: bool) -> Result<f64, RateError> {
    let lengths: Vec<f64> = run_lengths(column, start_aligned)
        .into_iter()
        .map(|l| l as f64)
        .collect();
    if lengths.is_empty() {
        return Err(RateError::Indeterminate { start_aligned });
    }
    Ok(lengths.iter().mean())
}

/// Reciprocal of [`mean_run_length`].
pub fn estimate_rate(column: &[bool], start_aligned: bool) -> Result<f64, RateError> {
    mean_run_length(column, start_aligned).map(|mean| 1.0 / mean)
}

/// Activation rate (runs of `false`) and deactivation rate (runs of `true`).
pub fn estimate_rates(asset: &[bool]) -> Result<RatePair, RateError> {
    let activation_rate = estimate_rate(asset, false)?;
    let deactivation_rate = estimate_rate(asset, true)?;
    log::debug!(
        "estimated rates: activation={activation_rate:.6}, deactivation={deactivation_rate:.6}"
    );
    Ok(RatePair {
        activation_rate,
        deactivation_rate,
    })
}
