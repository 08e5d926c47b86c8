use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Semantic type of a dataset column.
///
/// The primitive dtype of a column is not enough to tell whether integers are
/// counts or category labels, so every feature that takes part in an analysis is
/// mapped explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    /// Values from a fixed set of labels; label-encoded when more than one is present.
    Categorical,
    /// Integer values.
    Discrete,
    /// Real values.
    Continuous,
    /// Carried in the frame but skipped by every causal evaluation.
    Ignorable,
}

impl FeatureType {
    pub const ALL: [FeatureType; 4] = [
        FeatureType::Categorical,
        FeatureType::Discrete,
        FeatureType::Continuous,
        FeatureType::Ignorable,
    ];

    /// Types whose values can be tested for normality.
    pub fn is_normality_checkable(&self) -> bool {
        matches!(self, FeatureType::Continuous | FeatureType::Discrete)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTypeMap {
    pub feature: String,
    #[serde(rename = "type")]
    pub kind: FeatureType,
    #[serde(default)]
    pub importance: f64,
}

impl FeatureTypeMap {
    pub fn new(feature: impl Into<String>, kind: FeatureType) -> Self {
        Self {
            feature: feature.into(),
            kind,
            importance: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("target column '{0}' does not exist in the data")]
    TargetNotFound(String),

    #[error("feature mapping has duplicated keys: {0:?}")]
    DuplicateMapping(Vec<String>),

    #[error("feature mapping references columns that do not exist: {0:?}")]
    UnknownMappingColumns(Vec<String>),

    #[error("column '{0}' does not exist in the data")]
    ColumnNotFound(String),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// How [`Dataset::handle_missing_data`] treats null cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingDataHandling {
    /// Remove every row holding a null.
    #[default]
    Drop,
    /// Propagate the last valid observation forward.
    ForwardFill,
    /// Linear interpolation; leading nulls are left untouched.
    ForwardInterpolation,
}

/// A tabular dataset with its target column and per-feature typing.
///
/// A `Dataset` is never mutated after construction. Every transformation returns a
/// new value; the underlying polars columns are reference counted so unchanged
/// columns are shared between snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "DatasetRecord", try_from = "DatasetRecord")]
pub struct Dataset {
    data: DataFrame,
    target: String,
    feature_mapping: Vec<FeatureTypeMap>,
}

impl Dataset {
    pub fn new(
        data: DataFrame,
        target: impl Into<String>,
        feature_mapping: Vec<FeatureTypeMap>,
    ) -> Result<Self, DatasetError> {
        let target = target.into();
        let columns: HashSet<String> = data
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();

        if !columns.contains(&target) {
            return Err(DatasetError::TargetNotFound(target));
        }

        let mut seen = HashSet::new();
        let mut duplicated = Vec::new();
        for mapping in &feature_mapping {
            if !seen.insert(mapping.feature.as_str()) && !duplicated.contains(&mapping.feature) {
                duplicated.push(mapping.feature.clone());
            }
        }
        if !duplicated.is_empty() {
            return Err(DatasetError::DuplicateMapping(duplicated));
        }

        let unknown: Vec<String> = feature_mapping
            .iter()
            .filter(|m| !columns.contains(&m.feature))
            .map(|m| m.feature.clone())
            .collect();
        if !unknown.is_empty() {
            return Err(DatasetError::UnknownMappingColumns(unknown));
        }

        let categorical: Vec<&str> = feature_mapping
            .iter()
            .filter(|m| m.kind == FeatureType::Categorical)
            .map(|m| m.feature.as_str())
            .collect();

        let mut data = data;
        if categorical.len() > 1 {
            for name in categorical {
                let encoded = label_encode(data.column(name)?)?;
                data.with_column(encoded)?;
            }
        }

        Ok(Self {
            data,
            target,
            feature_mapping,
        })
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn feature_mapping(&self) -> &[FeatureTypeMap] {
        &self.feature_mapping
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.feature_mapping.iter().map(|m| m.feature.as_str()).collect()
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.data.column(name).is_ok()
    }

    /// Every mapped feature except the target, in mapping order.
    pub fn treatment_candidates(&self) -> Vec<&str> {
        self.feature_mapping
            .iter()
            .filter(|m| m.feature != self.target)
            .map(|m| m.feature.as_str())
            .collect()
    }

    /// Treatment candidates not mapped as `Ignorable`.
    pub fn informative_features(&self) -> Vec<&str> {
        self.feature_mapping
            .iter()
            .filter(|m| m.feature != self.target && m.kind != FeatureType::Ignorable)
            .map(|m| m.feature.as_str())
            .collect()
    }

    /// Column values cast to `f64`; nulls become `NaN`.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, DatasetError> {
        let series = self
            .data
            .column(name)
            .map_err(|_| DatasetError::ColumnNotFound(name.to_string()))?;
        let casted = series.cast(&DataType::Float64)?;
        let values = casted
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        Ok(values)
    }

    /// The frame restricted to mapped features plus the target.
    pub fn featured_only_data(&self) -> Result<DataFrame, DatasetError> {
        let mut whitelist: Vec<&str> = self.feature_names();
        if !whitelist.contains(&self.target.as_str()) {
            whitelist.push(self.target.as_str());
        }
        Ok(self.data.select(whitelist)?)
    }

    pub fn handle_missing_data(&self, method: MissingDataHandling) -> Result<Self, DatasetError> {
        let data = match method {
            MissingDataHandling::Drop => self.data.drop_nulls::<String>(None)?,
            MissingDataHandling::ForwardFill => {
                self.data.fill_null(FillNullStrategy::Forward(None))?
            }
            MissingDataHandling::ForwardInterpolation => {
                let numeric: Vec<Expr> = self
                    .data
                    .get_columns()
                    .iter()
                    .filter(|s| s.dtype().is_numeric())
                    .map(|s| col(s.name()).interpolate(InterpolationMethod::Linear))
                    .collect();
                self.data.clone().lazy().with_columns(numeric).collect()?
            }
        };

        Ok(Self {
            data,
            target: self.target.clone(),
            feature_mapping: self.feature_mapping.clone(),
        })
    }

    /// Attaches importance scores and re-sorts the mapping by importance, descending.
    /// Features absent from `importances` keep their current score.
    pub fn with_feature_importances(&self, importances: &HashMap<String, f64>) -> Self {
        let mut feature_mapping: Vec<FeatureTypeMap> = self
            .feature_mapping
            .iter()
            .map(|m| FeatureTypeMap {
                importance: importances.get(&m.feature).copied().unwrap_or(m.importance),
                ..m.clone()
            })
            .collect();
        feature_mapping.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Self {
            data: self.data.clone(),
            target: self.target.clone(),
            feature_mapping,
        }
    }

    /// Stable digest of the snapshot, used to label runs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.target.as_bytes());
        for mapping in &self.feature_mapping {
            hasher.update(mapping.feature.as_bytes());
            hasher.update([mapping.kind as u8]);
        }
        for series in self.data.get_columns() {
            hasher.update(series.name().as_bytes());
            match column_values(series) {
                Ok(ColumnValues::Numeric(values)) => {
                    for v in values {
                        hasher.update(v.unwrap_or(f64::NAN).to_le_bytes());
                    }
                }
                Ok(ColumnValues::Text(values)) => {
                    for v in values {
                        hasher.update(v.as_deref().unwrap_or("").as_bytes());
                        hasher.update([0u8]);
                    }
                }
                Err(_) => hasher.update(series.dtype().to_string().as_bytes()),
            }
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

/// Sorted distinct values mapped to `0..k`, like a classic label encoder.
fn label_encode(series: &Series) -> Result<Series, DatasetError> {
    let encoded: Vec<Option<i64>> = match column_values(series)? {
        ColumnValues::Numeric(values) => {
            let mut distinct: Vec<f64> = values.iter().flatten().copied().collect();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());
            values
                .iter()
                .map(|v| {
                    v.and_then(|v| {
                        distinct
                            .binary_search_by(|probe| probe.total_cmp(&v))
                            .ok()
                            .map(|i| i as i64)
                    })
                })
                .collect()
        }
        ColumnValues::Text(values) => {
            let codes: BTreeMap<&str, i64> = values
                .iter()
                .flatten()
                .map(|s| s.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .enumerate()
                .map(|(i, s)| (s, i as i64))
                .collect();
            values
                .iter()
                .map(|v| v.as_deref().and_then(|s| codes.get(s).copied()))
                .collect()
        }
    };
    Ok(Series::new(series.name(), encoded))
}

enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

fn column_values(series: &Series) -> Result<ColumnValues, DatasetError> {
    if series.dtype().is_numeric() || series.dtype() == &DataType::Boolean {
        let casted = series.cast(&DataType::Float64)?;
        Ok(ColumnValues::Numeric(casted.f64()?.into_iter().collect()))
    } else {
        let casted = series.cast(&DataType::String)?;
        Ok(ColumnValues::Text(
            casted
                .str()?
                .into_iter()
                .map(|v| v.map(|s| s.to_string()))
                .collect(),
        ))
    }
}

/// Plain-data form of a [`Dataset`] used at serialization boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub target: String,
    #[serde(default)]
    pub feature_mapping: Vec<FeatureTypeMap>,
    pub columns: Vec<ColumnRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnRecord {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl From<Dataset> for DatasetRecord {
    fn from(dataset: Dataset) -> Self {
        let columns = dataset
            .data
            .get_columns()
            .iter()
            .map(|series| {
                let values = match column_values(series) {
                    Ok(ColumnValues::Numeric(v)) => ColumnData::Numeric(v),
                    Ok(ColumnValues::Text(v)) => ColumnData::Text(v),
                    Err(_) => ColumnData::Text(vec![None; series.len()]),
                };
                ColumnRecord {
                    name: series.name().to_string(),
                    values,
                }
            })
            .collect();

        Self {
            target: dataset.target,
            feature_mapping: dataset.feature_mapping,
            columns,
        }
    }
}

impl TryFrom<DatasetRecord> for Dataset {
    type Error = DatasetError;

    fn try_from(record: DatasetRecord) -> Result<Self, Self::Error> {
        let series: Vec<Series> = record
            .columns
            .iter()
            .map(|c| match &c.values {
                ColumnData::Numeric(v) => Series::new(&c.name, v.as_slice()),
                ColumnData::Text(v) => Series::new(&c.name, v.as_slice()),
            })
            .collect();
        let data = DataFrame::new(series)?;
        Dataset::new(data, record.target, record.feature_mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_frame() -> DataFrame {
        df!(
            "A" => &[1.0, 2.0, 3.0, 4.0, 5.0],
            "B" => &[5.0, 4.0, 3.0, 2.0, 1.0],
            "C" => &[2.0, 3.0, 4.0, 5.0, 6.0]
        )
        .unwrap()
    }

    #[test]
    fn test_dataset_requires_existing_target() {
        let err = Dataset::new(abc_frame(), "Z", vec![]).unwrap_err();
        assert!(matches!(err, DatasetError::TargetNotFound(t) if t == "Z"));
    }

    #[test]
    fn test_dataset_rejects_duplicated_mapping() {
        let mapping = vec![
            FeatureTypeMap::new("A", FeatureType::Continuous),
            FeatureTypeMap::new("A", FeatureType::Discrete),
        ];
        let err = Dataset::new(abc_frame(), "C", mapping).unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateMapping(d) if d == vec!["A".to_string()]));
    }

    #[test]
    fn test_dataset_rejects_unknown_mapping_columns() {
        let mapping = vec![FeatureTypeMap::new("Q", FeatureType::Continuous)];
        let err = Dataset::new(abc_frame(), "C", mapping).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownMappingColumns(u) if u == vec!["Q".to_string()]));
    }

    #[test]
    fn test_label_encodes_when_several_categoricals() {
        let frame = df!(
            "color" => &["red", "blue", "red", "green"],
            "size" => &["s", "m", "l", "m"],
            "y" => &[1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();
        let mapping = vec![
            FeatureTypeMap::new("color", FeatureType::Categorical),
            FeatureTypeMap::new("size", FeatureType::Categorical),
        ];
        let dataset = Dataset::new(frame, "y", mapping).unwrap();
        assert_eq!(dataset.numeric_column("color").unwrap(), vec![2.0, 0.0, 2.0, 1.0]);
        assert_eq!(dataset.numeric_column("size").unwrap(), vec![2.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_single_categorical_is_left_alone() {
        let frame = df!(
            "color" => &["red", "blue"],
            "y" => &[1.0, 2.0]
        )
        .unwrap();
        let mapping = vec![FeatureTypeMap::new("color", FeatureType::Categorical)];
        let dataset = Dataset::new(frame, "y", mapping).unwrap();
        assert_eq!(dataset.data().column("color").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_handle_missing_data_returns_new_dataset() {
        let frame = df!(
            "x" => &[Some(1.0), None, Some(3.0), None],
            "y" => &[Some(1.0), Some(2.0), Some(3.0), Some(4.0)]
        )
        .unwrap();
        let dataset = Dataset::new(frame, "y", vec![FeatureTypeMap::new("x", FeatureType::Continuous)]).unwrap();

        let dropped = dataset.handle_missing_data(MissingDataHandling::Drop).unwrap();
        assert_eq!(dropped.height(), 2);
        assert_eq!(dataset.height(), 4);

        let filled = dataset.handle_missing_data(MissingDataHandling::ForwardFill).unwrap();
        assert_eq!(filled.numeric_column("x").unwrap(), vec![1.0, 1.0, 3.0, 3.0]);

        let interpolated = dataset
            .handle_missing_data(MissingDataHandling::ForwardInterpolation)
            .unwrap();
        let x = interpolated.numeric_column("x").unwrap();
        assert_eq!(x[1], 2.0);
        assert!(x[3].is_nan());
    }

    #[test]
    fn test_with_feature_importances_sorts_descending() {
        let mapping = vec![
            FeatureTypeMap::new("A", FeatureType::Continuous),
            FeatureTypeMap::new("B", FeatureType::Continuous),
        ];
        let dataset = Dataset::new(abc_frame(), "C", mapping).unwrap();
        let importances = HashMap::from([("A".to_string(), 0.2), ("B".to_string(), 0.8)]);
        let updated = dataset.with_feature_importances(&importances);
        assert_eq!(updated.feature_names(), vec!["B", "A"]);
        assert_eq!(dataset.feature_names(), vec!["A", "B"]);
    }

    #[test]
    fn test_treatment_candidates_keep_ignorable_features() {
        let mapping = vec![
            FeatureTypeMap::new("A", FeatureType::Continuous),
            FeatureTypeMap::new("B", FeatureType::Ignorable),
            FeatureTypeMap::new("C", FeatureType::Continuous),
        ];
        let dataset = Dataset::new(abc_frame(), "C", mapping).unwrap();
        assert_eq!(dataset.treatment_candidates(), vec!["A", "B"]);
        assert_eq!(dataset.informative_features(), vec!["A"]);
    }

    #[test]
    fn test_dataset_serde_keeps_values_and_fingerprint() {
        let mapping = vec![FeatureTypeMap::new("A", FeatureType::Continuous)];
        let dataset = Dataset::new(abc_frame(), "C", mapping).unwrap();
        let json = serde_json::to_string(&dataset).unwrap();
        let restored: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.target(), "C");
        assert_eq!(restored.numeric_column("B").unwrap(), dataset.numeric_column("B").unwrap());
        assert_eq!(restored.fingerprint(), dataset.fingerprint());
    }
}
