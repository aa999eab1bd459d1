//! Error taxonomy shared by the pipeline stages.

use std::path::PathBuf;

use thiserror::Error;

/// Rejected `/predict` payloads. Both variants surface as HTTP 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputValidationError {
    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("Invalid input data")]
    InvalidInput { field: String },
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("dataset unavailable at {path:?}: {reason}")]
    Unavailable { path: PathBuf, reason: String },
    #[error("invalid split: {0}")]
    InvalidSplit(String),
    #[error("frame computation failed: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl DataError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DataError::Unavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("column {0:?} is not part of the customer schema")]
    UnknownColumn(String),
    #[error("column {0:?} is not numeric")]
    NotNumeric(String),
    #[error("column {0:?} is not categorical")]
    NotCategorical(String),
    #[error("unknown category {value:?} for column {column:?}")]
    UnknownCategory { column: String, value: String },
    #[error("cannot fit a preprocessor on zero rows")]
    EmptyFit,
    #[error("frame error: {0}")]
    Frame(String),
}

impl From<polars::prelude::PolarsError> for PreprocessError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        PreprocessError::Frame(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("expected {expected} features, found {found}")]
    ShapeMismatch { expected: usize, found: usize },
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("fit failed: {0}")]
    Fit(String),
    #[error("prediction failed: {0}")]
    Predict(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot read model artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed model artifact {path:?}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("artifact {path:?} holds model {found:?}, expected {expected:?}")]
    KeyMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("drawing failed: {0}")]
    Drawing(String),
    #[error("png encoding failed: {0}")]
    Encode(String),
    #[error("nothing to draw: {0}")]
    EmptyData(&'static str),
}

impl<E> From<plotters::drawing::DrawingAreaErrorKind<E>> for RenderError
where
    E: std::error::Error + Send + Sync,
{
    fn from(err: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        RenderError::Drawing(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("model {key} failed: {source}")]
    Model { key: String, source: ModelError },
    #[error("model {0} is not registered")]
    MissingModel(String),
    #[error("label {0} is neither 0 nor 1")]
    InvalidLabel(u8),
    #[error("label vectors differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("curves need both classes in the test partition")]
    SingleClass,
}

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("training {key} failed: {source}")]
    Model { key: String, source: ModelError },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("cannot write training report {path:?}: {reason}")]
    Report { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_message_lists_every_field() {
        let err = InputValidationError::MissingFields(vec!["age".into(), "tenure".into()]);
        assert_eq!(err.to_string(), "Missing fields: age, tenure");
    }

    #[test]
    fn invalid_input_message_hides_the_field() {
        let err = InputValidationError::InvalidInput {
            field: "age".into(),
        };
        assert_eq!(err.to_string(), "Invalid input data");
    }
}
