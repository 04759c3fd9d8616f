//! Run recording for offline inspection.
//!
//! Each recorded run is a directory containing:
//! - `run.json`: metadata (config fingerprint, metrics, rates, reliability)
//! - `series.csv`: process, sensor and asset values per step
//! - `detection.csv`: threshold crossings per step as 0/1
//! - `thresholds.csv`: threshold of every sensor and of the asset

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::detection::{ASSET, DetectionTable, ThresholdMap};
use crate::pipeline::{Assessment, Outcome};
use crate::rates::RatePair;
use crate::simulation::Realization;

/// Metadata stored as `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub version: u32,
    pub id: String,
    pub created_at: String,
    pub config_fingerprint: String,
    pub steps: usize,
    pub sensors: Vec<String>,
    pub model: Option<String>,
    pub outcome: String,
    /// `None` when the run was unmeasurable.
    pub safety: Option<f64>,
    pub sustainability: Option<f64>,
    pub retries: usize,
    pub stages: Vec<String>,
    pub activation_rate: Option<f64>,
    pub deactivation_rate: Option<f64>,
    pub detection: BTreeMap<String, f64>,
    pub faulty: Vec<String>,
    pub parameters: BTreeMap<String, f64>,
    pub assetguard_version: String,
}

/// Writes one directory per recorded run under a root folder.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    root: PathBuf,
}

impl RunRecorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write all artifacts of a finished run and return its directory.
    pub fn record(
        &self,
        config: &Config,
        realization: &Realization,
        table: &DetectionTable,
        thresholds: &ThresholdMap,
        assessment: &Assessment,
    ) -> std::io::Result<PathBuf> {
        let id = Uuid::new_v4().simple().to_string();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let dir = self
            .root
            .join(format!("run-{}-{}", utc_timestamp(now, ""), &id[..8]));
        fs::create_dir_all(&dir)?;

        let sensors = config.sensor_names();
        write_series(&dir.join("series.csv"), realization, &sensors)?;
        write_detection(&dir.join("detection.csv"), table, &sensors)?;
        write_thresholds(&dir.join("thresholds.csv"), thresholds)?;

        let measured = assessment.outcome == Outcome::Measured;
        let rates: Option<RatePair> = assessment.rates;
        let meta = RunMeta {
            version: 1,
            id,
            created_at: utc_timestamp(now, ":"),
            config_fingerprint: config.fingerprint(),
            steps: table.steps(),
            sensors,
            model: assessment.topology.map(|t| t.model_name().to_string()),
            outcome: assessment.outcome.to_string(),
            safety: measured.then_some(assessment.safety),
            sustainability: measured.then_some(assessment.sustainability),
            retries: assessment.retries,
            stages: assessment.stages.iter().map(|s| s.to_string()).collect(),
            activation_rate: rates.map(|r| r.activation_rate),
            deactivation_rate: rates.map(|r| r.deactivation_rate),
            detection: assessment.reliability.detection.clone(),
            faulty: assessment.reliability.faulty.iter().cloned().collect(),
            parameters: assessment.parameters.clone(),
            assetguard_version: crate::VERSION.to_string(),
        };
        let json = serde_json::to_string_pretty(&meta).map_err(std::io::Error::other)?;
        fs::write(dir.join("run.json"), json)?;

        log::info!("recorded run in {}", dir.display());
        Ok(dir)
    }
}

fn write_series(path: &Path, realization: &Realization, sensors: &[String]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "step,process,{},{ASSET}", sensors.join(","))?;
    let asset = realization.points_of_interest.first();
    for (step, value) in realization.process.iter().enumerate() {
        write!(w, "{step},{value}")?;
        for name in sensors {
            let v = realization.sensors.get(name).and_then(|s| s.get(step));
            match v {
                Some(v) => write!(w, ",{v}")?,
                None => write!(w, ",")?,
            }
        }
        match asset.and_then(|a| a.get(step)) {
            Some(v) => writeln!(w, ",{v}")?,
            None => writeln!(w, ",")?,
        }
    }
    w.flush()
}

fn write_detection(path: &Path, table: &DetectionTable, sensors: &[String]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "step,{},{ASSET}", sensors.join(","))?;
    let columns: Vec<Option<&[bool]>> = sensors
        .iter()
        .map(|s| table.column(s))
        .chain(std::iter::once(table.asset()))
        .collect();
    for step in 0..table.steps() {
        let row: Vec<&str> = columns
            .iter()
            .map(|c| match c.and_then(|c| c.get(step)) {
                Some(true) => "1",
                Some(false) => "0",
                None => "",
            })
            .collect();
        writeln!(w, "{step},{}", row.join(","))?;
    }
    w.flush()
}

fn write_thresholds(path: &Path, thresholds: &ThresholdMap) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "name,threshold")?;
    for (name, threshold) in thresholds.entries() {
        writeln!(w, "{name},{threshold}")?;
    }
    w.flush()
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// UTC timestamp `YYYY-MM-DDTHH<sep>MM<sep>SSZ`. Directory names use an
/// empty separator so they stay portable.
fn utc_timestamp(since_epoch: Duration, separator: &str) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_date(secs / 86_400);
    let time = secs % 86_400;
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}{separator}{:02}{separator}{:02}Z",
        time / 3600,
        time / 60 % 60,
        time % 60
    )
}

/// Gregorian `(year, month, day)` of a day count since 1970-01-01.
fn civil_date(days: u64) -> (u64, u64, u64) {
    // count from 0000-03-01 so the leap day closes each year
    let shifted = days + 719_468;
    let era = shifted / 146_097;
    let day_of_era = shifted % 146_097;
    let year_of_era = (day_of_era - day_of_era / 1_460 + day_of_era / 36_524
        - day_of_era / 146_096)
        / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let march_month = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * march_month + 2) / 5 + 1;
    let month = if march_month < 10 {
        march_month + 3
    } else {
        march_month - 9
    };
    let year = era * 400 + year_of_era + u64::from(month <= 2);
    (year, month, day)
}
