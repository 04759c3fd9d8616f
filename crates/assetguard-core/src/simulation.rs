//! Synthetic realizations of the process and of what each place observes.
//!
//! The process sits at the origin and produces one value per step. Every
//! sensor and point of interest sees that value attenuated by the squared
//! distance to the origin; sensors also add their own Gaussian noise.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::config::{Config, PROCESS_ORIGIN, Place, ProcessConfig};

/// Simulation failures.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("failed to read process data {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: not a number: '{value}'")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("process data source is empty")]
    Empty,
}

/// One realization: the process series, one series per sensor, and one per
/// point of interest. The asset is always point of interest 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Realization {
    pub process: Vec<f64>,
    pub sensors: BTreeMap<String, Vec<f64>>,
    pub points_of_interest: Vec<Vec<f64>>,
}

impl Realization {
    pub fn steps(&self) -> usize {
        self.process.len()
    }
}

/// Anything that can produce a fresh realization on demand.
pub trait Simulator {
    /// Produce up to `steps` rows. Finite sources may return fewer.
    fn simulate(&mut self, steps: usize) -> Result<Realization, SimulationError>;
}

/// Standard normal draw via Box-Muller.
fn sample_standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = rng.random::<f64>().clamp(f64::MIN_POSITIVE, 1.0);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn sample_normal(rng: &mut impl Rng, mu: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return mu;
    }
    mu + sigma * sample_standard_normal(rng)
}

/// Source of process values.
#[derive(Debug, Clone, PartialEq)]
enum ProcessSource {
    Spike {
        mu: f64,
        sigma: f64,
        level: f64,
        rate: f64,
        range: f64,
    },
    Walk {
        mu: f64,
        sigma: f64,
        level: f64,
        drift: f64,
    },
    Recorded(Vec<f64>),
}

impl ProcessSource {
    fn from_config(process: &ProcessConfig) -> Result<Self, SimulationError> {
        Ok(match process {
            &ProcessConfig::Spike {
                mu,
                sigma,
                level,
                rate,
                range,
            } => Self::Spike {
                mu,
                sigma,
                level,
                rate,
                range,
            },
            &ProcessConfig::Walk {
                mu,
                sigma,
                level,
                drift,
            } => Self::Walk {
                mu,
                sigma,
                level,
                drift,
            },
            ProcessConfig::Replay { values } => {
                if values.is_empty() {
                    return Err(SimulationError::Empty);
                }
                Self::Recorded(values.clone())
            }
            ProcessConfig::File { path } => Self::Recorded(load_process_file(path)?),
        })
    }

    fn generate(&self, steps: usize, rng: &mut StdRng) -> Vec<f64> {
        match self {
            &Self::Spike {
                mu,
                sigma,
                level,
                rate,
                range,
            } => {
                let mut value = level;
                (0..steps)
                    .map(|_| {
                        if rng.random::<f64>() > rate {
                            value += sample_normal(rng, mu, sigma);
                            value
                        } else {
                            // spikes are not accumulated into the walk
                            value + rng.random::<f64>() * range
                        }
                    })
                    .collect()
            }
            &Self::Walk {
                mu,
                sigma,
                level,
                drift,
            } => {
                let mut value = level;
                (0..steps)
                    .map(|_| {
                        value += sample_normal(rng, mu, sigma) + drift;
                        value
                    })
                    .collect()
            }
            Self::Recorded(values) => {
                if values.len() < steps {
                    log::warn!(
                        "process data exhausted: {} of {steps} requested steps available",
                        values.len()
                    );
                }
                values.iter().take(steps).copied().collect()
            }
        }
    }
}

/// Read one value per line from the first comma- or whitespace-separated
/// column. Blank lines, `#` comments and a non-numeric header row are skipped.
pub fn load_process_file(path: &Path) -> Result<Vec<f64>, SimulationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SimulationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut values = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let field = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        match field.parse::<f64>() {
            Ok(v) => values.push(v),
            Err(_) if index == 0 => continue,
            Err(_) => {
                return Err(SimulationError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    value: field.to_string(),
                });
            }
        }
    }
    if values.is_empty() {
        return Err(SimulationError::Empty);
    }
    Ok(values)
}

#[derive(Debug, Clone)]
struct Observer {
    name: String,
    attenuation: f64,
    mu: f64,
    sigma: f64,
}

fn attenuation(place: &Place) -> f64 {
    1.0 / place.distance_sq(&PROCESS_ORIGIN)
}

/// Inverse-square transport of a single process to fixed places.
#[derive(Debug, Clone)]
pub struct TransportSimulator {
    source: ProcessSource,
    sensors: Vec<Observer>,
    points_of_interest: Vec<f64>,
    rng: StdRng,
}

impl TransportSimulator {
    /// Build from a validated configuration. Reads file-backed process data once.
    pub fn from_config(config: &Config) -> Result<Self, SimulationError> {
        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            source: ProcessSource::from_config(&config.process)?,
            sensors: config
                .sensors
                .iter()
                .map(|s| Observer {
                    name: s.name.clone(),
                    attenuation: attenuation(&s.position),
                    mu: s.mu,
                    sigma: s.sigma,
                })
                .collect(),
            points_of_interest: vec![attenuation(&config.asset.position)],
            rng,
        })
    }
}

impl Simulator for TransportSimulator {
    fn simulate(&mut self, steps: usize) -> Result<Realization, SimulationError> {
        let process = self.source.generate(steps, &mut self.rng);
        let mut sensors = BTreeMap::new();
        for observer in &self.sensors {
            let series = process
                .iter()
                .map(|&v| {
                    v * observer.attenuation + sample_normal(&mut self.rng, observer.mu, observer.sigma)
                })
                .collect();
            sensors.insert(observer.name.clone(), series);
        }
        let points_of_interest = self
            .points_of_interest
            .iter()
            .map(|&a| process.iter().map(|&v| v * a).collect())
            .collect();
        log::debug!(
            "simulated {} step(s) for {} sensor(s)",
            process.len(),
            sensors.len()
        );
        Ok(Realization {
            process,
            sensors,
            points_of_interest,
        })
    }
}
