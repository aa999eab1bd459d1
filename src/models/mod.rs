//! Classifiers served by the registry.
//!
//! Every model works on the dense feature rows produced by
//! [`crate::preprocess::Preprocessor`] and predicts `1` for "exits" and `0`
//! for "stays". Tree-family models also expose positive-class
//! probabilities and per-feature importances.

pub mod boosting;
pub mod forest;
pub mod knn;
pub mod logistic;
pub mod smote;
pub mod svm;
pub mod tree;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::ModelError;

pub use boosting::{BoostingParams, GradientBoosting};
pub use forest::{ForestParams, RandomForest};
pub use knn::KnnModel;
pub use logistic::LogisticModel;
pub use svm::{LinearSvm, SvmParams};
pub use tree::{DecisionTree, SplitCriterion, TreeParams};

/// Capability set shared by every fitted model.
pub trait Classifier: Send + Sync {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError>;

    /// Probability of the positive class, for models that can produce one.
    fn predict_proba(&self, _x: &[Vec<f64>]) -> Option<Result<Vec<f64>, ModelError>> {
        None
    }

    /// Relative importance per input column, summing to 1.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum ChurnModel {
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    Knn(KnnModel),
    LogisticRegression(LogisticModel),
    LinearSvm(LinearSvm),
}

impl ChurnModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            ChurnModel::DecisionTree(m) => m as &dyn Classifier,
            ChurnModel::RandomForest(m) => m as &dyn Classifier,
            ChurnModel::GradientBoosting(m) => m as &dyn Classifier,
            ChurnModel::Knn(m) => m as &dyn Classifier,
            ChurnModel::LogisticRegression(m) => m as &dyn Classifier,
            ChurnModel::LinearSvm(m) => m as &dyn Classifier,
        }
    }
}

impl Classifier for ChurnModel {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Result<Vec<f64>, ModelError>> {
        self.inner().predict_proba(x)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.inner().feature_importances()
    }
}

/// Reject rows whose width differs from the training width.
pub(crate) fn check_width(x: &[Vec<f64>], expected: usize) -> Result<(), ModelError> {
    match x.iter().find(|row| row.len() != expected) {
        Some(row) => Err(ModelError::ShapeMismatch {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

pub(crate) fn check_training_set(x: &[Vec<f64>], y: &[u8]) -> Result<usize, ModelError> {
    let width = x.first().map(Vec::len).ok_or(ModelError::EmptyTrainingSet)?;
    if x.len() != y.len() {
        return Err(ModelError::Fit(format!(
            "{} rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    check_width(x, width)?;
    Ok(width)
}

/// Flatten rows into the row-major matrix smartcore estimators expect.
pub(crate) fn convert_features_to_matrix(x: &[Vec<f64>]) -> DenseMatrix<f64> {
    let nrows = x.len();
    let ncols = x.first().map(Vec::len).unwrap_or(0);
    let values: Vec<f64> = x.iter().flat_map(|row| row.iter().copied()).collect();
    DenseMatrix::new(nrows, ncols, values, false)
}

/// Scale raw importances so they sum to 1; all-zero input stays all-zero.
pub(crate) fn normalize(mut values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    }
    values
}

pub(crate) fn threshold(probabilities: &[f64]) -> Vec<u8> {
    probabilities.iter().map(|&p| u8::from(p > 0.5)).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Two noisy, linearly separable blobs: label 1 when `x0 + x1 > 1`.
    pub fn blobs(n: usize) -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let a = ((i * 37) % 101) as f64 / 100.0;
            let b = ((i * 59) % 97) as f64 / 96.0;
            let noise = ((i * 13) % 7) as f64 / 70.0;
            x.push(vec![a, b, noise]);
            y.push(u8::from(a + b > 1.0));
        }
        (x, y)
    }

    pub fn accuracy(y: &[u8], pred: &[u8]) -> f64 {
        let hits = y.iter().zip(pred).filter(|(a, b)| a == b).count();
        hits as f64 / y.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_checks_report_the_offending_row() {
        let x = vec![vec![0.0, 1.0], vec![0.0]];
        match check_width(&x, 2).unwrap_err() {
            ModelError::ShapeMismatch { expected, found } => {
                assert_eq!((expected, found), (2, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            check_training_set(&[], &[]),
            Err(ModelError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn normalize_and_threshold() {
        assert_eq!(normalize(vec![1.0, 3.0]), vec![0.25, 0.75]);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(threshold(&[0.2, 0.5, 0.51]), vec![0, 0, 1]);
    }
}
