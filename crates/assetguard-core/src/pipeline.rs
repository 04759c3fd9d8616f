//! Pipeline orchestrator.
//!
//! Drives one assessment through its stages:
//!
//! ```text
//! Simulate -> Infer --(empty report)--> Simulate      (bounded retry)
//!             Infer -> EstimateRates --(indeterminate)--> Done (+inf, -inf)
//!                      EstimateRates -> MapAndSolve -> Done [-> Draw]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::detection::{DetectionError, DetectionTable, ThresholdMap, build_detection_table};
use crate::params::{GlobalParameters, ParameterMapper};
use crate::rates::{RatePair, estimate_rates};
use crate::recorder::RunRecorder;
use crate::reliability::{InferenceEngine, InferenceError, ReliabilityAdapter, ReliabilityReport};
use crate::simulation::{Realization, SimulationError, Simulator};
use crate::solver::{MarkingReader, SolverBackend, SolverEngine, SolverError, TpdReader};
use crate::topology::Topology;

/// Anything that ends an assessment without a result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("failed to record run: {0}")]
    Record(#[from] std::io::Error),
    #[error("reliability stayed indeterminate after {retries} retries")]
    RetriesExhausted { retries: usize },
}

/// Orchestrator states, in the order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Simulate,
    Infer,
    EstimateRates,
    MapAndSolve,
    Done,
    Draw,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simulate => "simulate",
            Self::Infer => "infer",
            Self::EstimateRates => "estimate_rates",
            Self::MapAndSolve => "map_and_solve",
            Self::Done => "done",
            Self::Draw => "draw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Measured,
    /// Asset rates could not be estimated; metrics hold the sentinel.
    Unmeasurable,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured => f.write_str("measured"),
            Self::Unmeasurable => f.write_str("unmeasurable"),
        }
    }
}

/// Result of one assessment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub safety: f64,
    pub sustainability: f64,
    pub retries: usize,
    pub outcome: Outcome,
    pub stages: Vec<Stage>,
    pub rates: Option<RatePair>,
    pub reliability: ReliabilityReport,
    pub topology: Option<Topology>,
    pub parameters: BTreeMap<String, f64>,
}

impl Assessment {
    /// Safety `+inf`, sustainability `-inf`.
    pub const SENTINEL: (f64, f64) = (f64::INFINITY, f64::NEG_INFINITY);

    pub fn is_measured(&self) -> bool {
        self.outcome == Outcome::Measured
    }

    pub fn metrics(&self) -> (f64, f64) {
        (self.safety, self.sustainability)
    }
}

/// One assessment over a configuration, generic over the inference engine,
/// the solver backend and the marking reader.
pub struct Orchestrator<'a, E, B, M = TpdReader>
where
    E: InferenceEngine,
    B: SolverBackend,
    M: MarkingReader,
{
    config: &'a Config,
    simulator: Box<dyn Simulator + 'a>,
    adapter: ReliabilityAdapter<E>,
    mapper: ParameterMapper,
    solver: SolverEngine<B, M>,
    thresholds: ThresholdMap,
    max_retries: usize,
    recorder: Option<RunRecorder>,
    last_record: Option<PathBuf>,
}

impl<'a, E, B, M> Orchestrator<'a, E, B, M>
where
    E: InferenceEngine,
    B: SolverBackend,
    M: MarkingReader,
{
    pub fn new(
        config: &'a Config,
        simulator: Box<dyn Simulator + 'a>,
        engine: E,
        solver: SolverEngine<B, M>,
    ) -> Self {
        Self {
            config,
            simulator,
            adapter: ReliabilityAdapter::new(engine),
            mapper: ParameterMapper::from_config(config),
            solver,
            thresholds: ThresholdMap::from_config(config),
            max_retries: config.pipeline.max_retries,
            recorder: None,
            last_record: None,
        }
    }

    /// Override the configured retry cap.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Record every finished run (the `Draw` stage).
    pub fn with_recorder(mut self, recorder: RunRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Directory written by the last `Draw` stage, if any.
    pub fn last_record(&self) -> Option<&PathBuf> {
        self.last_record.as_ref()
    }

    /// Simulate until the reliability report is usable, then estimate, map and solve.
    pub fn run(&mut self) -> Result<Assessment, PipelineError> {
        let sensors = self.config.sensor_names();
        let mut stages = Vec::new();
        let mut retries = 0;

        let (realization, table, reliability) = loop {
            stages.push(Stage::Simulate);
            log::debug!("stage: simulate (attempt {})", retries + 1);
            let realization = self.simulator.simulate(self.config.simulation.steps)?;
            let table = build_detection_table(
                &realization.process,
                &realization.sensors,
                &realization.points_of_interest,
                &self.thresholds,
            )?;

            stages.push(Stage::Infer);
            log::debug!("stage: infer");
            let report = self.adapter.assess(&table, &sensors)?;
            if !report.is_indeterminate() {
                break (realization, table, report);
            }
            if retries >= self.max_retries {
                return Err(PipelineError::RetriesExhausted { retries });
            }
            retries += 1;
            log::info!(
                "reliability indeterminate, resimulating (retry {retries}/{})",
                self.max_retries
            );
        };

        stages.push(Stage::EstimateRates);
        log::debug!("stage: estimate_rates");
        let asset = table.asset().ok_or(DetectionError::MissingAsset)?;
        let mut assessment = match estimate_rates(asset) {
            Err(e) => {
                log::warn!("{e}; reporting sentinel metrics");
                let (safety, sustainability) = Assessment::SENTINEL;
                Assessment {
                    safety,
                    sustainability,
                    retries,
                    outcome: Outcome::Unmeasurable,
                    stages: Vec::new(),
                    rates: None,
                    reliability,
                    topology: None,
                    parameters: BTreeMap::new(),
                }
            }
            Ok(rates) => {
                stages.push(Stage::MapAndSolve);
                log::debug!("stage: map_and_solve");
                let globals = GlobalParameters::assemble(self.config, rates, &reliability);
                let instance = self.mapper.map(&globals)?;
                let solution = self.solver.solve(&instance)?;
                Assessment {
                    safety: solution.safety,
                    sustainability: solution.sustainability,
                    retries,
                    outcome: Outcome::Measured,
                    stages: Vec::new(),
                    rates: Some(rates),
                    reliability,
                    topology: Some(instance.topology),
                    parameters: instance.parameters,
                }
            }
        };
        stages.push(Stage::Done);

        if let Some(recorder) = &self.recorder {
            stages.push(Stage::Draw);
            assessment.stages = stages;
            let dir = self.record(recorder, &realization, &table, &assessment)?;
            self.last_record = Some(dir);
        } else {
            assessment.stages = stages;
        }

        log::info!(
            "assessment {}: safety={} sustainability={} retries={}",
            assessment.outcome,
            assessment.safety,
            assessment.sustainability,
            assessment.retries
        );
        Ok(assessment)
    }

    fn record(
        &self,
        recorder: &RunRecorder,
        realization: &Realization,
        table: &DetectionTable,
        assessment: &Assessment,
    ) -> std::io::Result<PathBuf> {
        recorder.record(self.config, realization, table, &self.thresholds, assessment)
    }
}
