//! Sensor reliability inference.
//!
//! A dependency model where every sensor depends on the single asset node is
//! fitted to a [`DetectionTable`]; each sensor's detection probability is the
//! posterior `P(sensor = true | asset = true)`.
//!
//! The model-fitting engine sits behind [`InferenceEngine`], so the bundled
//! [`MaximumLikelihoodEngine`] can be swapped for any other implementation
//! without touching the orchestrator.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::detection::{ASSET, DetectionTable};

/// Inference engine failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InferenceError {
    /// The evidence has zero support in the fitted data, so the posterior is undefined.
    #[error("degenerate evidence: {variable}={value} never observed")]
    DegenerateEvidence { variable: String, value: bool },
    #[error("variable '{0}' is not in the model")]
    UnknownVariable(String),
    #[error("column '{0}' is missing from the detection table")]
    MissingColumn(String),
    #[error("node '{node}' has {parents} parents; at most one is supported")]
    TooManyParents { node: String, parents: usize },
}

/// Directed edges `parent → child` of a dependency model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyStructure {
    edges: Vec<(String, String)>,
}

impl DependencyStructure {
    /// Every sensor depends on the asset, and nothing else.
    pub fn sensors_given_asset(sensors: &[String]) -> Self {
        Self {
            edges: sensors
                .iter()
                .map(|s| (ASSET.to_string(), s.clone()))
                .collect(),
        }
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// All nodes mentioned by an edge.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .flat_map(|(p, c)| [p.as_str(), c.as_str()])
            .collect()
    }

    pub fn parents_of(&self, node: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, c)| c == node)
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

/// Observed variable assignments used to condition a query.
pub type Evidence = BTreeMap<String, bool>;

/// Posterior marginals: `P(variable = true)` per queried variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marginals(BTreeMap<String, f64>);

impl Marginals {
    pub fn probability_true(&self, variable: &str) -> Option<f64> {
        self.0.get(variable).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A probabilistic graphical model engine.
pub trait InferenceEngine {
    type Model;

    /// Fit the model parameters to a boolean table.
    fn fit(
        &self,
        table: &DetectionTable,
        structure: &DependencyStructure,
    ) -> Result<Self::Model, InferenceError>;

    /// Posterior marginals of `variables` given `evidence`.
    fn query(
        &self,
        model: &Self::Model,
        variables: &[String],
        evidence: &Evidence,
    ) -> Result<Marginals, InferenceError>;
}

// ---------------------------------------------------------------------------
// Maximum-likelihood engine
// ---------------------------------------------------------------------------

/// Conditional table of one node; `None` marks an unobserved parent state.
#[derive(Debug, Clone, PartialEq)]
enum Cpt {
    Root {
        p_true: Option<f64>,
    },
    Child {
        parent: String,
        /// Indexed by parent value: `[false, true]`.
        p_true_given: [Option<f64>; 2],
    },
}

/// A fitted forest of single-parent nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    cpts: BTreeMap<String, Cpt>,
}

/// Frequency-counting fit over networks where each node has at most one parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaximumLikelihoodEngine;

fn frequency(hits: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| hits as f64 / total as f64)
}

impl InferenceEngine for MaximumLikelihoodEngine {
    type Model = FittedModel;

    fn fit(
        &self,
        table: &DetectionTable,
        structure: &DependencyStructure,
    ) -> Result<FittedModel, InferenceError> {
        let column = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| InferenceError::MissingColumn(name.to_string()))
        };

        let mut cpts = BTreeMap::new();
        for node in structure.nodes() {
            let values = column(node)?;
            let parents = structure.parents_of(node);
            let cpt = match parents.as_slice() {
                [] => Cpt::Root {
                    p_true: frequency(values.iter().filter(|&&v| v).count(), values.len()),
                },
                [parent] => {
                    let parent_values = column(*parent)?;
                    let mut counts = [[0usize; 2]; 2];
                    for (&p, &c) in parent_values.iter().zip(values) {
                        counts[usize::from(p)][usize::from(c)] += 1;
                    }
                    let given = |p: usize| frequency(counts[p][1], counts[p][0] + counts[p][1]);
                    Cpt::Child {
                        parent: (*parent).to_string(),
                        p_true_given: [given(0), given(1)],
                    }
                }
                more => {
                    return Err(InferenceError::TooManyParents {
                        node: node.to_string(),
                        parents: more.len(),
                    });
                }
            };
            cpts.insert(node.to_string(), cpt);
        }
        Ok(FittedModel { cpts })
    }

    fn query(
        &self,
        model: &FittedModel,
        variables: &[String],
        evidence: &Evidence,
    ) -> Result<Marginals, InferenceError> {
        for (name, &value) in evidence {
            let p = model.marginal(name, &Evidence::new())?;
            let support = if value { p } else { 1.0 - p };
            if support <= 0.0 {
                return Err(InferenceError::DegenerateEvidence {
                    variable: name.clone(),
                    value,
                });
            }
        }

        let mut out = BTreeMap::new();
        for variable in variables {
            out.insert(variable.clone(), model.marginal(variable, evidence)?);
        }
        Ok(Marginals(out))
    }
}

impl FittedModel {
    /// `P(node = true | evidence)` for networks whose evidence only touches
    /// the node itself or its direct parent.
    fn marginal(&self, node: &str, evidence: &Evidence) -> Result<f64, InferenceError> {
        if let Some(&value) = evidence.get(node) {
            return Ok(if value { 1.0 } else { 0.0 });
        }
        let degenerate = |variable: &str, value: bool| InferenceError::DegenerateEvidence {
            variable: variable.to_string(),
            value,
        };
        match self.cpts.get(node) {
            None => Err(InferenceError::UnknownVariable(node.to_string())),
            Some(Cpt::Root { p_true }) => p_true.ok_or_else(|| degenerate(node, true)),
            Some(Cpt::Child {
                parent,
                p_true_given,
            }) => {
                if let Some(&pv) = evidence.get(parent) {
                    return p_true_given[usize::from(pv)].ok_or_else(|| degenerate(parent, pv));
                }
                let p_parent = self.marginal(parent, evidence)?;
                let mut total = 0.0;
                for (pv, weight) in [(false, 1.0 - p_parent), (true, p_parent)] {
                    if weight > 0.0 {
                        let p = p_true_given[usize::from(pv)].ok_or_else(|| degenerate(parent, pv))?;
                        total += weight * p;
                    }
                }
                Ok(total)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reliability report
// ---------------------------------------------------------------------------

/// Per-sensor detection probabilities and fault flags for one realization.
///
/// An empty report (no probabilities) is the indeterminate signal: the data
/// did not support the posterior and the realization should be redrawn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReliabilityReport {
    pub detection: BTreeMap<String, f64>,
    pub faulty: BTreeSet<String>,
    /// The asset column never changed.
    pub asset_constant: bool,
}

impl ReliabilityReport {
    pub fn indeterminate() -> Self {
        Self::default()
    }

    pub fn is_indeterminate(&self) -> bool {
        self.detection.is_empty()
    }

    pub fn detection_probability(&self, sensor: &str) -> Option<f64> {
        self.detection.get(sensor).copied()
    }
}

/// Wraps an [`InferenceEngine`] with the fault-detection policy.
pub struct ReliabilityAdapter<E: InferenceEngine> {
    engine: E,
}

impl<E: InferenceEngine> ReliabilityAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Detection probability of every sensor given an active asset.
    ///
    /// A sensor is faulty when its column is constant while the asset column
    /// varies; faulty sensors report probability 0 regardless of the fitted
    /// value. When the asset itself is constant, constancy carries no
    /// information and nothing is flagged.
    pub fn assess(
        &self,
        table: &DetectionTable,
        sensors: &[String],
    ) -> Result<ReliabilityReport, InferenceError> {
        let asset_constant = table.is_constant(ASSET);
        let faulty: BTreeSet<String> = if asset_constant {
            BTreeSet::new()
        } else {
            sensors
                .iter()
                .filter(|s| table.is_constant(s))
                .cloned()
                .collect()
        };

        let structure = DependencyStructure::sensors_given_asset(sensors);
        let model = self.engine.fit(table, &structure)?;
        let evidence = Evidence::from([(ASSET.to_string(), true)]);
        let marginals = match self.engine.query(&model, sensors, &evidence) {
            Ok(m) => m,
            Err(InferenceError::DegenerateEvidence { variable, value }) => {
                log::debug!("inference indeterminate: {variable}={value} has no support");
                return Ok(ReliabilityReport::indeterminate());
            }
            Err(e) => return Err(e),
        };

        let mut detection = BTreeMap::new();
        for sensor in sensors {
            let p = if faulty.contains(sensor) {
                0.0
            } else {
                marginals
                    .probability_true(sensor)
                    .ok_or_else(|| InferenceError::UnknownVariable(sensor.clone()))?
            };
            detection.insert(sensor.clone(), p);
        }
        for sensor in &faulty {
            log::warn!("sensor {sensor} is constant while the asset varies; flagged faulty");
        }

        Ok(ReliabilityReport {
            detection,
            faulty,
            asset_constant,
        })
    }
}
