//! Feature transform shared by training and serving.
//!
//! Numeric columns are min-max scaled and categorical columns are one-hot
//! encoded, in the order given by [`ColumnRoles`]. A fitted [`Preprocessor`]
//! is stored inside every model artifact, so inference always sees the same
//! feature layout the model was trained on.

use num::Float;
use polars::prelude::{DataFrame, DataType, Series};
use serde::{Deserialize, Serialize};

use crate::error::PreprocessError;
use crate::records::{CustomerFeatures, FeatureValue};

/// Which feature columns are numeric and which are categorical.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnRoles {
    pub fn len(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn min_max_scale<T: Float>(value: T, min: T, max: T) -> T {
    let range = max - min;
    if range <= T::zero() {
        T::zero()
    } else {
        (value - min) / range
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    roles: ColumnRoles,
    ranges: Vec<MinMaxRange>,
    categories: Vec<Vec<String>>,
}

impl Preprocessor {
    /// Learn scaling ranges and category sets from the columns of `frame`.
    pub fn fit(roles: &ColumnRoles, frame: &DataFrame) -> Result<Self, PreprocessError> {
        if frame.height() == 0 {
            return Err(PreprocessError::EmptyFit);
        }

        let mut ranges = Vec::with_capacity(roles.numeric.len());
        for name in &roles.numeric {
            let series = column(frame, name)?;
            if !series.dtype().is_numeric() {
                return Err(PreprocessError::NotNumeric(name.clone()));
            }
            match (series.min::<f64>(), series.max::<f64>()) {
                (Some(min), Some(max)) => ranges.push(MinMaxRange { min, max }),
                _ => return Err(PreprocessError::EmptyFit),
            }
        }

        let mut categories = Vec::with_capacity(roles.categorical.len());
        for name in &roles.categorical {
            let series = column(frame, name)?;
            if series.dtype() != &DataType::Utf8 {
                return Err(PreprocessError::NotCategorical(name.clone()));
            }
            let unique = series.unique()?.sort(false);
            let values: Vec<String> = unique.utf8()?.into_iter().flatten().map(String::from).collect();
            categories.push(values);
        }

        Ok(Self {
            roles: roles.clone(),
            ranges,
            categories,
        })
    }

    pub fn roles(&self) -> &ColumnRoles {
        &self.roles
    }

    /// Number of columns produced by [`Preprocessor::transform`].
    pub fn width(&self) -> usize {
        self.ranges.len() + self.categories.iter().map(Vec::len).sum::<usize>()
    }

    /// Output column names: numeric columns first, then `<Column>_<Category>`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.roles.numeric.clone();
        for (column, values) in self.roles.categorical.iter().zip(&self.categories) {
            names.extend(values.iter().map(|value| format!("{column}_{value}")));
        }
        names
    }

    pub fn transform(&self, row: &CustomerFeatures) -> Result<Vec<f64>, PreprocessError> {
        let mut out = Vec::with_capacity(self.width());
        for (column, range) in self.roles.numeric.iter().zip(&self.ranges) {
            out.push(min_max_scale(numeric(row, column)?, range.min, range.max));
        }
        for (column, values) in self.roles.categorical.iter().zip(&self.categories) {
            let value = categorical(row, column)?;
            let hot = values
                .iter()
                .position(|known| known == value)
                .ok_or_else(|| PreprocessError::UnknownCategory {
                    column: column.clone(),
                    value: value.to_string(),
                })?;
            out.extend((0..values.len()).map(|idx| if idx == hot { 1.0 } else { 0.0 }));
        }
        Ok(out)
    }

    pub fn transform_all<'a, I>(&self, rows: I) -> Result<Vec<Vec<f64>>, PreprocessError>
    where
        I: IntoIterator<Item = &'a CustomerFeatures>,
    {
        rows.into_iter().map(|row| self.transform(row)).collect()
    }
}

fn column<'f>(frame: &'f DataFrame, name: &str) -> Result<&'f Series, PreprocessError> {
    frame
        .column(name)
        .map_err(|_| PreprocessError::UnknownColumn(name.to_string()))
}

fn numeric(row: &CustomerFeatures, column: &str) -> Result<f64, PreprocessError> {
    match row.feature(column) {
        Some(FeatureValue::Numeric(value)) => Ok(value),
        Some(FeatureValue::Categorical(_)) => Err(PreprocessError::NotNumeric(column.to_string())),
        None => Err(PreprocessError::UnknownColumn(column.to_string())),
    }
}

fn categorical<'r>(row: &'r CustomerFeatures, column: &str) -> Result<&'r str, PreprocessError> {
    match row.feature(column) {
        Some(FeatureValue::Categorical(value)) => Ok(value),
        Some(FeatureValue::Numeric(_)) => Err(PreprocessError::NotCategorical(column.to_string())),
        None => Err(PreprocessError::UnknownColumn(column.to_string())),
    }
}
