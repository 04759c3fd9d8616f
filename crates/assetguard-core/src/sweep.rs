//! Sensitivity sweeps over configuration variables.
//!
//! A sweep derives many configurations from one base [`Config`], runs each of
//! them through a fresh assessment, and tabulates
//! `safety,sustainability,<variable...>` per measured configuration.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::pipeline::{Assessment, PipelineError};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Which configuration value a sweep variable drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepTarget {
    AssetThreshold,
    /// Hours a sensor stays on; written as `scheduler.on_rate = 1 / seconds`.
    OnTimeHours,
    /// Hours a sensor stays off; written as `scheduler.off_rate = 1 / seconds`.
    OffTimeHours,
    SensorThreshold(String),
    SensorSigma(String),
}

impl SweepTarget {
    pub fn parse(target: &str) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownSweepTarget(target.to_string());
        match target {
            "asset.threshold" => Ok(Self::AssetThreshold),
            "scheduler.on_time_hours" => Ok(Self::OnTimeHours),
            "scheduler.off_time_hours" => Ok(Self::OffTimeHours),
            other => {
                let rest = other.strip_prefix("sensor.").ok_or_else(unknown)?;
                let (name, field) = rest.rsplit_once('.').ok_or_else(unknown)?;
                if name.is_empty() {
                    return Err(unknown());
                }
                match field {
                    "threshold" => Ok(Self::SensorThreshold(name.to_string())),
                    "sigma" => Ok(Self::SensorSigma(name.to_string())),
                    _ => Err(unknown()),
                }
            }
        }
    }

    /// Write `value` into `config`.
    pub fn apply(&self, config: &mut Config, value: f64) -> Result<(), ConfigError> {
        match self {
            Self::AssetThreshold => config.asset.threshold = value,
            Self::OnTimeHours => config.scheduler.on_rate = hours_to_rate(value),
            Self::OffTimeHours => config.scheduler.off_rate = hours_to_rate(value),
            Self::SensorThreshold(name) | Self::SensorSigma(name) => {
                let sensor = config
                    .sensors
                    .iter_mut()
                    .find(|s| &s.name == name)
                    .ok_or_else(|| ConfigError::UnknownSweepTarget(format!("sensor.{name}")))?;
                if matches!(self, Self::SensorThreshold(_)) {
                    sensor.threshold = value;
                } else {
                    sensor.sigma = value;
                }
            }
        }
        Ok(())
    }

    fn must_be_positive(&self) -> bool {
        matches!(self, Self::OnTimeHours | Self::OffTimeHours)
    }
}

/// Rate of leaving a state held for `hours` on average.
pub fn hours_to_rate(hours: f64) -> f64 {
    1.0 / (hours * SECONDS_PER_HOUR)
}

/// A configuration value explored uniformly over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepVariable {
    pub target: String,
    pub min: f64,
    pub max: f64,
}

impl SweepVariable {
    pub fn new(target: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            target: target.into(),
            min,
            max,
        }
    }

    /// Check the target exists in `config` and the range is usable.
    pub fn validate(&self, config: &Config) -> Result<SweepTarget, ConfigError> {
        let target = SweepTarget::parse(&self.target)?;
        let bad_range = !(self.min.is_finite() && self.max.is_finite() && self.min <= self.max)
            || (target.must_be_positive() && self.min <= 0.0);
        if bad_range {
            return Err(ConfigError::InvalidSweepRange {
                target: self.target.clone(),
                min: self.min,
                max: self.max,
            });
        }
        if let SweepTarget::SensorThreshold(name) | SweepTarget::SensorSigma(name) = &target {
            if !config.sensors.iter().any(|s| &s.name == name) {
                return Err(ConfigError::UnknownSweepTarget(self.target.clone()));
            }
        }
        Ok(target)
    }

    fn sample(&self, rng: &mut impl Rng) -> f64 {
        if self.min == self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }

    /// `n` evenly spaced points from `min` to `max` inclusive.
    fn grid(&self, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![self.min],
            _ => (0..n)
                .map(|i| self.min + (self.max - self.min) * i as f64 / (n - 1) as f64)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Every variable sampled uniformly, `samples` times.
    MonteCarlo,
    /// Each variable in turn over `samples` grid points, the others held at one draw.
    OneAtATime,
}

/// One derived configuration and the variable values that produced it.
#[derive(Debug, Clone)]
pub struct SweepPoint {
    pub values: Vec<f64>,
    pub config: Config,
}

/// Derive the configurations of a sweep. Variable order is preserved in
/// every point's `values`.
pub fn plan(
    base: &Config,
    variables: &[SweepVariable],
    mode: SweepMode,
    samples: usize,
    rng: &mut impl Rng,
) -> Result<Vec<SweepPoint>, ConfigError> {
    let targets = variables
        .iter()
        .map(|v| v.validate(base))
        .collect::<Result<Vec<_>, _>>()?;

    let value_sets: Vec<Vec<f64>> = match mode {
        SweepMode::MonteCarlo => (0..samples)
            .map(|_| variables.iter().map(|v| v.sample(rng)).collect())
            .collect(),
        SweepMode::OneAtATime => {
            let mut sets = Vec::new();
            for (i, variable) in variables.iter().enumerate() {
                let fixed: Vec<f64> = variables.iter().map(|v| v.sample(rng)).collect();
                for x in variable.grid(samples) {
                    let mut values = fixed.clone();
                    values[i] = x;
                    sets.push(values);
                }
            }
            sets
        }
    };

    value_sets
        .into_iter()
        .map(|values| {
            let mut config = base.clone();
            for (target, &value) in targets.iter().zip(&values) {
                target.apply(&mut config, value)?;
            }
            Ok::<_, ConfigError>(SweepPoint { values, config })
        })
        .collect()
}

/// One measured configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub safety: f64,
    pub sustainability: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    pub rows: Vec<SweepRow>,
    /// Configurations whose rates were indeterminate.
    pub unmeasurable: usize,
    /// Configurations that ended in an error.
    pub failed: usize,
    /// The sweep was stopped before every point ran.
    pub interrupted: bool,
}

/// Run every point through `assess`. Unmeasurable results are skipped, errors
/// are logged and counted, and `stop` is checked between points.
pub fn run_sweep<F>(points: Vec<SweepPoint>, stop: &AtomicBool, mut assess: F) -> SweepSummary
where
    F: FnMut(&Config) -> Result<Assessment, PipelineError>,
{
    let total = points.len();
    let mut summary = SweepSummary::default();
    for (i, point) in points.into_iter().enumerate() {
        if stop.load(Ordering::Relaxed) {
            log::warn!("sweep interrupted after {i} of {total} configurations");
            summary.interrupted = true;
            break;
        }
        match assess(&point.config) {
            Ok(a) if a.is_measured() => summary.rows.push(SweepRow {
                safety: a.safety,
                sustainability: a.sustainability,
                values: point.values,
            }),
            Ok(_) => {
                log::warn!("configuration {}/{total} unmeasurable, skipped", i + 1);
                summary.unmeasurable += 1;
            }
            Err(e) => {
                log::error!("configuration {}/{total} failed: {e}", i + 1);
                summary.failed += 1;
            }
        }
    }
    summary
}

/// Write `safety,sustainability,<variable...>` rows.
pub fn write_results(
    path: &Path,
    variables: &[SweepVariable],
    rows: &[SweepRow],
) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    let names: Vec<&str> = variables.iter().map(|v| v.target.as_str()).collect();
    writeln!(w, "safety,sustainability,{}", names.join(","))?;
    for row in rows {
        let values: Vec<String> = row.values.iter().map(f64::to_string).collect();
        writeln!(
            w,
            "{},{},{}",
            row.safety,
            row.sustainability,
            values.join(",")
        )?;
    }
    w.flush()
}
