//! Global parameters and the parameter mapper.
//!
//! [`GlobalParameters`] gathers everything inferred in one iteration; the
//! [`ParameterMapper`] selects a topology and evaluates its template into an
//! [`EngineInstance`] ready for the solver.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::rates::RatePair;
use crate::reliability::ReliabilityReport;
use crate::topology::{Measures, SchedulingKind, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProcessRates {
    pub activation_rate: f64,
    pub deactivation_rate: f64,
}

impl From<RatePair> for ProcessRates {
    fn from(pair: RatePair) -> Self {
        Self {
            activation_rate: pair.activation_rate,
            deactivation_rate: pair.deactivation_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorParameters {
    pub name: String,
    pub detection_probability: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SchedulerParameters {
    pub on_rate: f64,
    pub off_rate: f64,
    pub kind: SchedulingKind,
}

/// Inferred values for one iteration. Sensors keep configuration order, so
/// positional template entries address the same sensor every time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalParameters {
    pub process: ProcessRates,
    pub sensors: Vec<SensorParameters>,
    pub scheduler: SchedulerParameters,
}

impl GlobalParameters {
    /// Combine rates, reliabilities and scheduling for the configured sensors.
    ///
    /// A sensor absent from the report counts as never detecting.
    pub fn assemble(config: &Config, rates: RatePair, report: &ReliabilityReport) -> Self {
        let sensors = config
            .sensors
            .iter()
            .map(|s| SensorParameters {
                name: s.name.clone(),
                detection_probability: report.detection_probability(&s.name).unwrap_or(0.0),
            })
            .collect();
        Self {
            process: rates.into(),
            sensors,
            scheduler: SchedulerParameters {
                on_rate: config.scheduler.on_rate,
                off_rate: config.scheduler.off_rate,
                kind: config.scheduler.kind,
            },
        }
    }
}

/// A parameterized model bound to its repository and a private staging directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInstance {
    pub topology: Topology,
    pub parameters: BTreeMap<String, f64>,
    pub repository: PathBuf,
    pub staging_dir: PathBuf,
    pub measures: Measures,
}

impl EngineInstance {
    pub fn model_name(&self) -> &'static str {
        self.topology.model_name()
    }

    /// Path of the staged model, without extension, as the solver expects it.
    pub fn staged_model(&self) -> PathBuf {
        self.staging_dir.join(self.model_name())
    }

    /// Solver arguments: `-rpar <name> <value>` per parameter.
    pub fn parameter_args(&self) -> Vec<String> {
        self.parameters
            .iter()
            .flat_map(|(name, value)| ["-rpar".to_string(), name.clone(), value.to_string()])
            .collect()
    }
}

/// Turns global parameters into engine instances.
#[derive(Debug, Clone)]
pub struct ParameterMapper {
    repository: PathBuf,
    staging_root: PathBuf,
}

impl ParameterMapper {
    pub fn new(repository: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            staging_root: staging_root.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.solver.model_repository,
            &config.output,
        )
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    /// Select the topology and evaluate its template.
    ///
    /// Every instance gets a staging directory with a fresh UUID suffix so
    /// concurrent runs of the same model never share files.
    pub fn map(&self, globals: &GlobalParameters) -> Result<EngineInstance, ConfigError> {
        let topology = Topology::select(globals.sensors.len(), globals.scheduler.kind)?;
        let parameters = topology.parameters(globals)?;
        let staging_dir = self.staging_root.join(format!(
            "{}_analysis-{}",
            topology.model_name(),
            Uuid::new_v4().simple()
        ));
        log::debug!(
            "mapped {} sensor(s) / {} onto {topology}",
            globals.sensors.len(),
            globals.scheduler.kind
        );
        Ok(EngineInstance {
            topology,
            parameters,
            repository: self.repository.clone(),
            staging_dir,
            measures: topology.measures(),
        })
    }
}
