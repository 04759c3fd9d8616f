//! Resolved assessment configuration.
//!
//! A [`Config`] is loaded once (JSON on disk), validated once, and then passed
//! by reference into the pipeline. Nothing in the crate mutates it after
//! validation; sweeps derive new values with [`Clone`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::detection::ASSET;
use crate::sweep::SweepVariable;
use crate::topology::{SchedulingKind, Topology};

/// Default upper bound on SIMULATE → INFER retries.
pub const DEFAULT_MAX_RETRIES: usize = 100;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no topology registered for {count} sensor(s)")]
    UnsupportedSensorCount { count: usize },
    #[error("topology {model} expects {expected} sensor(s), got {actual}")]
    SensorCountMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate sensor name '{0}'")]
    DuplicateSensor(String),
    #[error("sensor name '{0}' is reserved")]
    ReservedName(String),
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: String, value: f64 },
    #[error("{what} sits on the process origin")]
    PlaceAtOrigin { what: String },
    #[error("process replay has no data")]
    EmptyReplay,
    #[error("unknown sweep target '{0}'")]
    UnknownSweepTarget(String),
    #[error("invalid sweep range for {target}: [{min}, {max}]")]
    InvalidSweepRange { target: String, min: f64, max: f64 },
}

/// A point on the plane, in meters from the process (which sits at the origin).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub x: f64,
    pub y: f64,
}

impl Place {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared distance to another place.
    pub fn distance_sq(&self, other: &Place) -> f64 {
        (self.x - other.x).powi(2) + (self.y - other.y).powi(2)
    }
}

/// Simulation length and RNG seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub steps: usize,
    /// Fixed seed for reproducible runs. `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Generator for the ambient process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessConfig {
    /// Gaussian walk around `level` with occasional non-accumulating spikes.
    Spike {
        mu: f64,
        sigma: f64,
        level: f64,
        rate: f64,
        range: f64,
    },
    /// Gaussian walk with a constant drift per step.
    Walk {
        mu: f64,
        sigma: f64,
        level: f64,
        #[serde(default)]
        drift: f64,
    },
    /// Inline recorded values, replayed from the start on every simulation.
    Replay { values: Vec<f64> },
    /// Recorded values read from a file: first numeric column, one row per step.
    File { path: PathBuf },
}

/// The single protected asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub position: Place,
    pub threshold: f64,
}

/// One environmental sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub position: Place,
    pub threshold: f64,
    #[serde(default)]
    pub mu: f64,
    pub sigma: f64,
}

/// Sensor duty-cycle scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub on_rate: f64,
    pub off_rate: f64,
    #[serde(default)]
    pub kind: SchedulingKind,
}

/// Location of the external steady-state solver and its model definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Directory containing the solver procedures (`WNRG`, `swn_stndrd`, ...).
    pub bin_dir: PathBuf,
    /// Directory containing `<model>.def` / `<model>.net` pairs.
    pub model_repository: PathBuf,
}

/// Orchestrator policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_output() -> PathBuf {
    PathBuf::from("output")
}

/// Fully resolved configuration for one assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub process: ProcessConfig,
    pub asset: AssetConfig,
    pub sensors: Vec<SensorConfig>,
    pub scheduler: SchedulerConfig,
    pub solver: SolverConfig,
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Variables explored by `assetguard sweep`. Ignored by single runs.
    #[serde(default)]
    pub sweep: Vec<SweepVariable>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("simulation.steps", self.simulation.steps as f64)?;

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if sensor.name == ASSET {
                return Err(ConfigError::ReservedName(sensor.name.clone()));
            }
            if !seen.insert(sensor.name.as_str()) {
                return Err(ConfigError::DuplicateSensor(sensor.name.clone()));
            }
            if sensor.position.distance_sq(&PROCESS_ORIGIN) == 0.0 {
                return Err(ConfigError::PlaceAtOrigin {
                    what: format!("sensor {}", sensor.name),
                });
            }
            if sensor.sigma < 0.0 {
                return Err(ConfigError::NonPositive {
                    what: format!("sensor {} sigma", sensor.name),
                    value: sensor.sigma,
                });
            }
        }
        if self.asset.position.distance_sq(&PROCESS_ORIGIN) == 0.0 {
            return Err(ConfigError::PlaceAtOrigin {
                what: "asset".to_string(),
            });
        }

        positive("scheduler.on_rate", self.scheduler.on_rate)?;
        positive("scheduler.off_rate", self.scheduler.off_rate)?;

        if let ProcessConfig::Replay { values } = &self.process {
            if values.is_empty() {
                return Err(ConfigError::EmptyReplay);
            }
        }

        Topology::select(self.sensors.len(), self.scheduler.kind)?;

        for variable in &self.sweep {
            variable.validate(self)?;
        }
        Ok(())
    }

    /// Sensor names in configuration order.
    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.name.clone()).collect()
    }

    /// Hex SHA-256 of the canonical JSON form, used to tag run records.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&json);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// The process is always placed at the origin.
pub const PROCESS_ORIGIN: Place = Place { x: 0.0, y: 0.0 };

fn positive(what: &str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            what: what.to_string(),
            value,
        })
    }
}
