//! Data loading and the reproducible train/test partition.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::preprocess::ColumnRoles;
use crate::records::{records_frame, ChurnRecord, CustomerFeatures, FEATURE_COLUMNS, LABEL_COLUMN};

pub fn read_csv<P: AsRef<Path>>(path: P) -> PolarsResult<DataFrame> {
    let file = File::open(path)?;

    // Scan every row so a late float does not trip an integer guess.
    CsvReader::new(file)
        .has_header(true)
        .infer_schema(None)
        .finish()
}

/// Proportion and seed of the stratified hold-out split.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub test_size: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            seed: 10,
        }
    }
}

/// Row indices of each partition, in dataset order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Features and labels of one partition.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    pub features: Vec<CustomerFeatures>,
    pub labels: Vec<u8>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The projected frame together with its typed rows.
#[derive(Clone, Debug)]
pub struct Dataset {
    pub source: PathBuf,
    pub roles: ColumnRoles,
    /// Feature and label columns only, in CSV order.
    pub frame: DataFrame,
    pub records: Vec<ChurnRecord>,
}

impl Dataset {
    pub fn from_records(
        source: impl Into<PathBuf>,
        roles: ColumnRoles,
        records: Vec<ChurnRecord>,
    ) -> PolarsResult<Self> {
        Ok(Self {
            source: source.into(),
            roles,
            frame: records_frame(&records)?,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.records.iter().map(|r| r.exited).collect()
    }

    pub fn split(&self, config: &SplitConfig) -> Result<TrainTestSplit, DataError> {
        stratified_split(&self.labels(), config)
    }

    /// Copy the rows at `indices` into separate feature and target vectors.
    pub fn feature_and_target(&self, indices: &[usize]) -> Partition {
        let mut partition = Partition::default();
        for &idx in indices {
            let record = &self.records[idx];
            partition.features.push(record.features.clone());
            partition.labels.push(record.exited);
        }
        partition
    }

    /// Train and test partitions for `config`.
    pub fn partitions(&self, config: &SplitConfig) -> Result<(Partition, Partition), DataError> {
        let split = self.split(config)?;
        Ok((
            self.feature_and_target(&split.train),
            self.feature_and_target(&split.test),
        ))
    }
}

/// Read the churn CSV, check it against the declared schema and type every row.
pub fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, DataError> {
    let path = path.as_ref();
    let raw = read_csv(path).map_err(|e| DataError::unavailable(path, e))?;

    let names = raw.get_column_names();
    let missing: Vec<&str> = FEATURE_COLUMNS
        .iter()
        .copied()
        .chain(std::iter::once(LABEL_COLUMN))
        .filter(|column| !names.contains(column))
        .collect();
    if !missing.is_empty() {
        return Err(DataError::unavailable(
            path,
            format!("missing columns: {}", missing.join(", ")),
        ));
    }

    let projection: Vec<Expr> = FEATURE_COLUMNS
        .iter()
        .chain(std::iter::once(&LABEL_COLUMN))
        .map(|name| col(name))
        .collect();
    let df = raw
        .lazy()
        .select(projection)
        .collect()
        .map_err(|e| DataError::unavailable(path, e))?;

    let roles = infer_roles(&df).map_err(|reason| DataError::unavailable(path, reason))?;
    let records = frame_to_records(&df).map_err(|reason| DataError::unavailable(path, reason))?;
    if records.is_empty() {
        return Err(DataError::unavailable(path, "no rows"));
    }

    info!(
        "loaded {} customers from {} ({} numeric, {} categorical features)",
        records.len(),
        path.display(),
        roles.numeric.len(),
        roles.categorical.len()
    );

    Ok(Dataset {
        source: path.to_path_buf(),
        roles,
        frame: df,
        records,
    })
}

/// Classify the feature columns by their parsed dtype and check the result
/// against [`ChurnRecord::raw_schema`].
pub fn infer_roles(df: &DataFrame) -> Result<ColumnRoles, String> {
    let declared = ChurnRecord::raw_schema();
    let mut roles = ColumnRoles::default();

    for column in FEATURE_COLUMNS {
        let dtype = df.column(column).map_err(|e| e.to_string())?.dtype().clone();
        let expect_numeric = declared
            .get(column)
            .map(|dt| dt.is_numeric())
            .unwrap_or(false);

        if dtype.is_numeric() && expect_numeric {
            roles.numeric.push(column.to_string());
        } else if dtype == DataType::Utf8 && !expect_numeric {
            roles.categorical.push(column.to_string());
        } else {
            let wanted = declared.get(column).cloned().unwrap_or(DataType::Null);
            return Err(format!("column {column} parsed as {dtype}, expected {wanted}"));
        }
        debug!("column {column}: {dtype}");
    }

    Ok(roles)
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, String> {
    let series = df
        .column(name)
        .and_then(|s| s.cast(&DataType::Float64))
        .map_err(|e| e.to_string())?;
    let values = series.f64().map_err(|e| e.to_string())?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(format!("row {row}: {name} is missing or not a number")),
        })
        .collect()
}

fn integer_column(df: &DataFrame, name: &str) -> Result<Vec<i64>, String> {
    numeric_column(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            if v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(format!("row {row}: {name} is not an integer"))
            }
        })
        .collect()
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<String>, String> {
    let series = df.column(name).map_err(|e| e.to_string())?;
    let values = series.utf8().map_err(|e| e.to_string())?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(format!("row {row}: {name} is empty")),
        })
        .collect()
}

fn frame_to_records(df: &DataFrame) -> Result<Vec<ChurnRecord>, String> {
    let credit_score = numeric_column(df, "CreditScore")?;
    let geography = text_column(df, "Geography")?;
    let gender = text_column(df, "Gender")?;
    let age = numeric_column(df, "Age")?;
    let tenure = numeric_column(df, "Tenure")?;
    let balance = numeric_column(df, "Balance")?;
    let num_of_products = integer_column(df, "NumOfProducts")?;
    let has_cr_card = integer_column(df, "HasCrCard")?;
    let is_active_member = integer_column(df, "IsActiveMember")?;
    let estimated_salary = numeric_column(df, "EstimatedSalary")?;
    let exited = integer_column(df, LABEL_COLUMN)?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let label = match exited[row] {
            0 => 0,
            1 => 1,
            other => return Err(format!("row {row}: {LABEL_COLUMN} must be 0 or 1, found {other}")),
        };
        records.push(ChurnRecord {
            features: CustomerFeatures {
                credit_score: credit_score[row],
                geography: geography[row].clone(),
                gender: gender[row].clone(),
                age: age[row],
                tenure: tenure[row],
                balance: balance[row],
                num_of_products: num_of_products[row],
                has_cr_card: has_cr_card[row],
                is_active_member: is_active_member[row],
                estimated_salary: estimated_salary[row],
            },
            exited: label,
        });
    }
    Ok(records)
}

/// Shuffle each class with a seeded RNG and send `round(n * test_size)` of
/// its rows to the test partition. Both partitions come back sorted.
pub fn stratified_split(labels: &[u8], config: &SplitConfig) -> Result<TrainTestSplit, DataError> {
    if !(config.test_size > 0.0 && config.test_size < 1.0) {
        return Err(DataError::InvalidSplit(format!(
            "test_size must be in (0, 1), got {}",
            config.test_size
        )));
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(idx);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();
    for (_, mut indices) in by_class {
        indices.shuffle(&mut rng);
        let n_test = (indices.len() as f64 * config.test_size).round() as usize;
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Ok(TrainTestSplit { train, test })
}
