//! Detection tables: threshold crossings of every sensor and of the asset.
//!
//! A [`DetectionTable`] is the boolean, time-indexed view of one realization.
//! Columns are keyed by entity name and all share the same length; row order
//! is meaningful (rate estimation scans it), column order is not.

use std::collections::BTreeMap;

use thiserror::Error;

/// Column name of the protected asset.
pub const ASSET: &str = "asset";

/// Fatal problems building a detection table.
#[derive(Debug, Error, PartialEq)]
pub enum DetectionError {
    #[error("column '{name}' has {actual} steps, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("no threshold for '{0}'")]
    MissingThreshold(String),
    #[error("no point-of-interest series for the asset")]
    MissingAsset,
}

/// Name → threshold, covering every sensor plus exactly one asset entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdMap {
    sensors: BTreeMap<String, f64>,
    asset: f64,
}

impl ThresholdMap {
    /// Build a map from sensor thresholds plus the single asset threshold.
    ///
    /// A sensor entry named `"asset"` is dropped: the asset slot is unique.
    pub fn new(sensors: impl IntoIterator<Item = (String, f64)>, asset: f64) -> Self {
        let sensors = sensors
            .into_iter()
            .filter(|(name, _)| name != ASSET)
            .collect();
        Self { sensors, asset }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.sensors.iter().map(|s| (s.name.clone(), s.threshold)),
            config.asset.threshold,
        )
    }

    /// Threshold for a sensor or for `"asset"`.
    pub fn get(&self, name: &str) -> Option<f64> {
        if name == ASSET {
            Some(self.asset)
        } else {
            self.sensors.get(name).copied()
        }
    }

    pub fn asset(&self) -> f64 {
        self.asset
    }

    /// `(name, threshold)` for every entry, sensors first, asset last.
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .sensors
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        out.push((ASSET.to_string(), self.asset));
        out
    }
}

/// Boolean activation columns sharing one time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTable {
    columns: BTreeMap<String, Vec<bool>>,
    steps: usize,
}

impl DetectionTable {
    /// Assemble a table from ready-made columns, checking they share a length.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<bool>)>,
    ) -> Result<Self, DetectionError> {
        let columns: BTreeMap<String, Vec<bool>> = columns.into_iter().collect();
        let steps = columns.values().next().map_or(0, Vec::len);
        for (name, column) in &columns {
            if column.len() != steps {
                return Err(DetectionError::LengthMismatch {
                    name: name.clone(),
                    expected: steps,
                    actual: column.len(),
                });
            }
        }
        Ok(Self { columns, steps })
    }

    /// Number of time steps (rows).
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn column(&self, name: &str) -> Option<&[bool]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn asset(&self) -> Option<&[bool]> {
        self.column(ASSET)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[bool])> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when the named column exists and never changes value.
    pub fn is_constant(&self, name: &str) -> bool {
        self.column(name).is_some_and(is_constant)
    }
}

/// A column is constant when every row equals the first one.
pub fn is_constant(column: &[bool]) -> bool {
    column.windows(2).all(|w| w[0] == w[1])
}

/// Threshold every series: `value >= threshold` per sensor, plus an `"asset"`
/// column taken from the first point-of-interest series.
///
/// The process series does not become a column, but it fixes the time axis:
/// every other series, including points of interest beyond the asset, must
/// have its length.
pub fn build_detection_table(
    process: &[f64],
    sensors: &BTreeMap<String, Vec<f64>>,
    points_of_interest: &[Vec<f64>],
    thresholds: &ThresholdMap,
) -> Result<DetectionTable, DetectionError> {
    let steps = process.len();
    let check = |name: &str, len: usize| {
        if len == steps {
            Ok(())
        } else {
            Err(DetectionError::LengthMismatch {
                name: name.to_string(),
                expected: steps,
                actual: len,
            })
        }
    };

    let mut columns = BTreeMap::new();
    for (name, series) in sensors {
        check(name, series.len())?;
        let threshold = thresholds
            .get(name)
            .ok_or_else(|| DetectionError::MissingThreshold(name.clone()))?;
        columns.insert(name.clone(), threshold_column(series, threshold));
    }

    for (i, series) in points_of_interest.iter().enumerate() {
        let name = if i == 0 {
            ASSET.to_string()
        } else {
            format!("point_of_interest[{i}]")
        };
        check(&name, series.len())?;
    }
    let asset_series = points_of_interest
        .first()
        .ok_or(DetectionError::MissingAsset)?;
    columns.insert(
        ASSET.to_string(),
        threshold_column(asset_series, thresholds.asset()),
    );

    Ok(DetectionTable { columns, steps })
}

fn threshold_column(series: &[f64], threshold: f64) -> Vec<bool> {
    series.iter().map(|&v| v >= threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ThresholdMap {
        ThresholdMap::new(
            [("S1".to_string(), 1.0), ("S2".to_string(), 5.0)],
            2.0,
        )
    }

    fn sensors(a: Vec<f64>, b: Vec<f64>) -> BTreeMap<String, Vec<f64>> {
        BTreeMap::from([("S1".to_string(), a), ("S2".to_string(), b)])
    }

    // -----------------------------------------------------------------------
    // Threshold map tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_threshold_map_single_asset_entry() {
        let map = ThresholdMap::new(
            [("S1".to_string(), 1.0), ("asset".to_string(), 99.0)],
            2.0,
        );
        assert_eq!(map.get("asset"), Some(2.0));
        let entries = map.entries();
        assert_eq!(entries.iter().filter(|(n, _)| n == "asset").count(), 1);
        assert_eq!(entries.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Builder tests
    // -----------------------------------------------------------------------

    #[test]
    fn test_threshold_is_inclusive() {
        let table = build_detection_table(
            &[0.0, 0.0, 0.0],
            &sensors(vec![0.5, 1.0, 1.5], vec![5.0, 4.9, 6.0]),
            &[vec![2.0, 1.0, 3.0]],
            &thresholds(),
        )
        .unwrap();
        assert_eq!(table.column("S1").unwrap(), &[false, true, true]);
        assert_eq!(table.column("S2").unwrap(), &[true, false, true]);
        assert_eq!(table.asset().unwrap(), &[true, false, true]);
    }

    #[test]
    fn test_all_columns_share_length() {
        for n in [0usize, 1, 7, 100] {
            let table = build_detection_table(
                &vec![0.0; n],
                &sensors(vec![1.0; n], vec![0.0; n]),
                &[vec![3.0; n]],
                &thresholds(),
            )
            .unwrap();
            assert_eq!(table.steps(), n);
            for (_, column) in table.columns() {
                assert_eq!(column.len(), n);
            }
        }
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        let err = build_detection_table(
            &[0.0; 4],
            &sensors(vec![1.0; 4], vec![1.0; 3]),
            &[vec![0.0; 4]],
            &thresholds(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DetectionError::LengthMismatch {
                name: "S2".to_string(),
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_asset_length_mismatch_is_fatal() {
        let err = build_detection_table(
            &[0.0; 4],
            &sensors(vec![1.0; 4], vec![1.0; 4]),
            &[vec![0.0; 5]],
            &thresholds(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectionError::LengthMismatch { name, .. } if name == "asset"));
    }

    #[test]
    fn test_secondary_poi_length_mismatch_is_fatal() {
        let err = build_detection_table(
            &[0.0; 3],
            &sensors(vec![1.0; 3], vec![1.0; 3]),
            &[vec![0.0; 3], vec![0.0; 2]],
            &thresholds(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DetectionError::LengthMismatch {
                name: "point_of_interest[1]".to_string(),
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_missing_threshold() {
        let mut series = sensors(vec![1.0], vec![1.0]);
        series.insert("S3".to_string(), vec![1.0]);
        let err =
            build_detection_table(&[0.0], &series, &[vec![0.0]], &thresholds()).unwrap_err();
        assert_eq!(err, DetectionError::MissingThreshold("S3".to_string()));
    }

    #[test]
    fn test_missing_asset_series() {
        let err = build_detection_table(
            &[0.0],
            &sensors(vec![1.0], vec![1.0]),
            &[],
            &thresholds(),
        )
        .unwrap_err();
        assert_eq!(err, DetectionError::MissingAsset);
    }

    #[test]
    fn test_asset_taken_from_first_poi() {
        let table = build_detection_table(
            &[0.0, 0.0],
            &sensors(vec![0.0, 0.0], vec![0.0, 0.0]),
            &[vec![0.0, 9.0], vec![9.0, 9.0]],
            &thresholds(),
        )
        .unwrap();
        assert_eq!(table.asset().unwrap(), &[false, true]);
    }

    // -----------------------------------------------------------------------
    // Table helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_constant_detection() {
        assert!(is_constant(&[]));
        assert!(is_constant(&[true]));
        assert!(is_constant(&[false, false, false]));
        assert!(!is_constant(&[false, true, false]));
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let err = DetectionTable::from_columns([
            ("a".to_string(), vec![true, false]),
            ("b".to_string(), vec![true]),
        ])
        .unwrap_err();
        assert!(matches!(err, DetectionError::LengthMismatch { .. }));
    }
}
