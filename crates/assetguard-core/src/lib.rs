//! # assetguard-core
//!
//! **How well does a sensor network protect an asset?**
//!
//! `assetguard-core` simulates an ambient process and the sensors watching it,
//! infers how reliably each sensor detects the asset being at risk, and feeds
//! those reliabilities into a stochastic Petri-net model solved by an external
//! steady-state solver. The result is a pair of metrics:
//!
//! - **safety**: reciprocal of the rate at which hazardous events go unnoticed;
//! - **sustainability**: worst-case reciprocal idle marking over the sensors.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use assetguard_core::{
//!     Config, GreatSpnBackend, MaximumLikelihoodEngine, Orchestrator, SolverEngine,
//!     TransportSimulator,
//! };
//!
//! let config = Config::load(Path::new("assessment.json")).unwrap();
//! let simulator = TransportSimulator::from_config(&config).unwrap();
//! let solver = SolverEngine::new(GreatSpnBackend::new(&config.solver.bin_dir));
//! let mut orchestrator =
//!     Orchestrator::new(&config, Box::new(simulator), MaximumLikelihoodEngine, solver);
//! let assessment = orchestrator.run().unwrap();
//! println!("safety={} sustainability={}", assessment.safety, assessment.sustainability);
//! ```
//!
//! ## Architecture
//!
//! Simulate → Detection table → Reliability → Rates → Parameter mapping → Solver
//!
//! The inference engine ([`InferenceEngine`]), the solver backend
//! ([`SolverBackend`]) and the simulator ([`Simulator`]) are traits, so each
//! stage can be replaced without touching the [`Orchestrator`].

pub mod config;
pub mod detection;
pub mod params;
pub mod pipeline;
pub mod rates;
pub mod recorder;
pub mod reliability;
pub mod simulation;
pub mod solver;
pub mod sweep;
pub mod topology;

pub use config::{Config, ConfigError, DEFAULT_MAX_RETRIES, Place, ProcessConfig};
pub use detection::{
    ASSET, DetectionError, DetectionTable, ThresholdMap, build_detection_table, is_constant,
};
pub use params::{EngineInstance, GlobalParameters, ParameterMapper};
pub use pipeline::{Assessment, Orchestrator, Outcome, PipelineError, Stage};
pub use rates::{RateError, RatePair, estimate_rate, estimate_rates, mean_run_length};
pub use recorder::{RunMeta, RunRecorder};
pub use reliability::{
    DependencyStructure, Evidence, InferenceEngine, InferenceError, Marginals,
    MaximumLikelihoodEngine, ReliabilityAdapter, ReliabilityReport,
};
pub use simulation::{Realization, SimulationError, Simulator, TransportSimulator};
pub use solver::{
    GreatSpnBackend, MarkingReader, NodeMap, STEADY_STATE_SEQUENCE, Solution, SolverBackend,
    SolverEngine, SolverError, TpdReader,
};
pub use sweep::{SweepMode, SweepRow, SweepSummary, SweepTarget, SweepVariable};
pub use topology::{Measures, SchedulingKind, Topology, TwoSensorPolicy};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
