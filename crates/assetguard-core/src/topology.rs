//! Knowledge base of stochastic-model topologies.
//!
//! Each registered GSPN is a variant of [`Topology`], selected by sensor count
//! and scheduling policy. A variant knows its model name, its measures, and
//! how to turn [`GlobalParameters`] into the concrete rate/probability
//! parameters its model file declares.
//!
//! | sensors | policy           | model             |
//! |---------|------------------|-------------------|
//! | 1       | default          | `one_sensor`      |
//! | 2       | `interleaved`    | `two_interleaved` |
//! | 2       | `most_effective` | `most_effective`  |
//! | 2       | default          | `two_sensor`      |
//! | 3       | default          | `three_sensors`   |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::params::GlobalParameters;

/// Sensor scheduling policy requested by the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingKind {
    /// Every sensor follows its own on/off cycle.
    #[default]
    Independent,
    /// Sensors take turns; one is on while the other is off.
    Interleaved,
    /// Only the sensor with the best detection probability is scheduled.
    MostEffective,
}

impl std::fmt::Display for SchedulingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::Interleaved => write!(f, "interleaved"),
            Self::MostEffective => write!(f, "most_effective"),
        }
    }
}

/// Policy variants registered for the two-sensor count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TwoSensorPolicy {
    Default,
    Interleaved,
    MostEffective,
}

/// A registered GSPN topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    OneSensor,
    TwoSensor(TwoSensorPolicy),
    ThreeSensor,
}

/// Which solver outputs feed the two metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Measures {
    /// Transitions whose throughput counts against safety.
    pub safety: Vec<String>,
    /// Places whose average marking bounds sustainability.
    pub sustainability: Vec<String>,
}

impl Topology {
    /// Every knowledge-base entry: `(sensor count, policy label, topology)`.
    pub const REGISTERED: [(usize, &'static str, Topology); 5] = [
        (1, "default", Topology::OneSensor),
        (2, "interleaved", Topology::TwoSensor(TwoSensorPolicy::Interleaved)),
        (2, "most_effective", Topology::TwoSensor(TwoSensorPolicy::MostEffective)),
        (2, "default", Topology::TwoSensor(TwoSensorPolicy::Default)),
        (3, "default", Topology::ThreeSensor),
    ];

    /// Pick the topology for a sensor count and policy.
    ///
    /// A policy with no entry for the count falls back to that count's
    /// default. Counts with no default are a configuration error.
    pub fn select(sensor_count: usize, kind: SchedulingKind) -> Result<Self, ConfigError> {
        match (sensor_count, kind) {
            (1, _) => Ok(Self::OneSensor),
            (2, SchedulingKind::Interleaved) => Ok(Self::TwoSensor(TwoSensorPolicy::Interleaved)),
            (2, SchedulingKind::MostEffective) => {
                Ok(Self::TwoSensor(TwoSensorPolicy::MostEffective))
            }
            (2, _) => Ok(Self::TwoSensor(TwoSensorPolicy::Default)),
            (3, _) => Ok(Self::ThreeSensor),
            (count, _) => Err(ConfigError::UnsupportedSensorCount { count }),
        }
    }

    /// Model file stem in the repository (`<name>.def`, `<name>.net`).
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::OneSensor => "one_sensor",
            Self::TwoSensor(TwoSensorPolicy::Default) => "two_sensor",
            Self::TwoSensor(TwoSensorPolicy::Interleaved) => "two_interleaved",
            Self::TwoSensor(TwoSensorPolicy::MostEffective) => "most_effective",
            Self::ThreeSensor => "three_sensors",
        }
    }

    pub fn sensor_count(&self) -> usize {
        match self {
            Self::OneSensor => 1,
            Self::TwoSensor(_) => 2,
            Self::ThreeSensor => 3,
        }
    }

    /// Name of the detection-probability parameter of the sensor at `index`.
    fn detection_parameter(&self, index: usize) -> String {
        match self {
            Self::OneSensor => "DetectionProb".to_string(),
            _ => format!("DetectionProb_{}", index + 1),
        }
    }

    fn idle_place(&self, index: usize) -> String {
        match self {
            Self::OneSensor => "Idle".to_string(),
            _ => format!("Idle_{}", index + 1),
        }
    }

    /// Parameter names the model's `.def` file declares.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["EventStartRate", "EventEndRate", "InRate", "OffRate"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend((0..self.sensor_count()).map(|i| self.detection_parameter(i)));
        names
    }

    /// Evaluate the parameter template against the current globals.
    pub fn parameters(
        &self,
        globals: &GlobalParameters,
    ) -> Result<BTreeMap<String, f64>, ConfigError> {
        let expected = self.sensor_count();
        if globals.sensors.len() != expected {
            return Err(ConfigError::SensorCountMismatch {
                model: self.model_name(),
                expected,
                actual: globals.sensors.len(),
            });
        }

        let mut params = BTreeMap::from([
            (
                "EventStartRate".to_string(),
                globals.process.activation_rate,
            ),
            (
                "EventEndRate".to_string(),
                globals.process.deactivation_rate,
            ),
            ("InRate".to_string(), globals.scheduler.on_rate),
            ("OffRate".to_string(), globals.scheduler.off_rate),
        ]);
        for (index, sensor) in globals.sensors.iter().enumerate() {
            params.insert(
                self.detection_parameter(index),
                sensor.detection_probability,
            );
        }
        Ok(params)
    }

    /// Transitions and places the solver reads metrics from.
    pub fn measures(&self) -> Measures {
        let mut safety = vec!["EventMissed".to_string()];
        if let Self::TwoSensor(TwoSensorPolicy::Interleaved) = self {
            safety.push("HandoverMissed".to_string());
        }
        let sustainability = (0..self.sensor_count())
            .map(|i| self.idle_place(i))
            .collect();
        Measures {
            safety,
            sustainability,
        }
    }
}

impl std::fmt::Display for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.model_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ProcessRates, SchedulerParameters, SensorParameters};

    fn globals(probabilities: &[f64]) -> GlobalParameters {
        GlobalParameters {
            process: ProcessRates {
                activation_rate: 0.04,
                deactivation_rate: 0.05,
            },
            sensors: probabilities
                .iter()
                .enumerate()
                .map(|(i, &p)| SensorParameters {
                    name: format!("S{}", i + 1),
                    detection_probability: p,
                })
                .collect(),
            scheduler: SchedulerParameters {
                on_rate: 0.001,
                off_rate: 0.1,
                kind: SchedulingKind::Independent,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Selection tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_two_sensors_interleaved_selects_interleaved() {
        let t = Topology::select(2, SchedulingKind::Interleaved).unwrap();
        assert_eq!(t, Topology::TwoSensor(TwoSensorPolicy::Interleaved));
        assert_eq!(t.model_name(), "two_interleaved");
    }

    #[test]
    fn test_unregistered_policy_falls_back_to_default() {
        let t = Topology::select(2, SchedulingKind::Independent).unwrap();
        assert_eq!(t.model_name(), "two_sensor");
        let t = Topology::select(3, SchedulingKind::Interleaved).unwrap();
        assert_eq!(t.model_name(), "three_sensors");
        let t = Topology::select(1, SchedulingKind::MostEffective).unwrap();
        assert_eq!(t.model_name(), "one_sensor");
    }

    #[test]
    fn test_unregistered_count_is_config_error() {
        for count in [0, 4, 10] {
            assert!(matches!(
                Topology::select(count, SchedulingKind::Independent),
                Err(ConfigError::UnsupportedSensorCount { count: c }) if c == count
            ));
        }
    }

    #[test]
    fn test_every_count_has_a_default() {
        for count in 1..=3 {
            assert!(
                Topology::REGISTERED
                    .iter()
                    .any(|(c, label, _)| *c == count && *label == "default")
            );
        }
    }

    #[test]
    fn test_registered_table_matches_selection() {
        for (count, label, topology) in Topology::REGISTERED {
            let kind = match label {
                "interleaved" => SchedulingKind::Interleaved,
                "most_effective" => SchedulingKind::MostEffective,
                _ => SchedulingKind::Independent,
            };
            assert_eq!(Topology::select(count, kind).unwrap(), topology);
        }
    }

    // -----------------------------------------------------------------------
    // Parameter template tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_positional_detection_parameters() {
        let params = Topology::TwoSensor(TwoSensorPolicy::Default)
            .parameters(&globals(&[0.3, 0.8]))
            .unwrap();
        assert_eq!(params["DetectionProb_1"], 0.3);
        assert_eq!(params["DetectionProb_2"], 0.8);
        assert_eq!(params["InRate"], 0.001);
        assert_eq!(params["OffRate"], 0.1);
        assert_eq!(params["EventStartRate"], 0.04);
        assert_eq!(params["EventEndRate"], 0.05);
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn test_one_sensor_parameter_names() {
        let params = Topology::OneSensor.parameters(&globals(&[0.59])).unwrap();
        assert_eq!(params["DetectionProb"], 0.59);
        assert!(!params.contains_key("DetectionProb_1"));
    }

    #[test]
    fn test_parameter_names_match_evaluated_template() {
        for (_, _, topology) in Topology::REGISTERED {
            let probs = vec![0.5; topology.sensor_count()];
            let evaluated: Vec<String> =
                topology.parameters(&globals(&probs)).unwrap().into_keys().collect();
            let mut names = topology.parameter_names();
            names.sort();
            assert_eq!(names, evaluated, "{topology}");
        }
    }

    #[test]
    fn test_parameter_count_mismatch() {
        let err = Topology::ThreeSensor
            .parameters(&globals(&[0.1, 0.2]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SensorCountMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));
    }

    // -----------------------------------------------------------------------
    // Measures tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_measures_per_topology() {
        let one = Topology::OneSensor.measures();
        assert_eq!(one.safety, vec!["EventMissed"]);
        assert_eq!(one.sustainability, vec!["Idle"]);

        let inter = Topology::TwoSensor(TwoSensorPolicy::Interleaved).measures();
        assert_eq!(inter.safety, vec!["EventMissed", "HandoverMissed"]);
        assert_eq!(inter.sustainability, vec!["Idle_1", "Idle_2"]);

        let three = Topology::ThreeSensor.measures();
        assert_eq!(three.sustainability.len(), 3);
    }
}
