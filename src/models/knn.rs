//! k-nearest-neighbours classifier backed by smartcore.
//!
//! Labels come from smartcore's `KNNClassifier`; the positive-class
//! probability is the share of the `k` nearest reference rows that exited,
//! found with the same cover tree search. Both structures serialize with
//! smartcore's own serde support.

use serde::{Deserialize, Serialize};
use smartcore::algorithm::neighbour::cover_tree::CoverTree;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_classifier::{KNNClassifier, KNNClassifierParameters};

use super::{check_training_set, check_width, convert_features_to_matrix, Classifier};
use crate::error::ModelError;

type Inner = KNNClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>, Euclidian<f64>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct KnnModel {
    k: usize,
    n_features: usize,
    labels: Vec<u8>,
    inner: Inner,
    neighbours: CoverTree<Vec<f64>, Euclidian<f64>>,
}

impl KnnModel {
    pub fn fit(x: &[Vec<f64>], y: &[u8], k: usize) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        if k == 0 || k > x.len() {
            return Err(ModelError::Fit(format!(
                "k must be between 1 and {}, got {k}",
                x.len()
            )));
        }

        let matrix = convert_features_to_matrix(x);
        let targets: Vec<i32> = y.iter().map(|&v| i32::from(v)).collect();
        let params: KNNClassifierParameters<f64, Euclidian<f64>> =
            KNNClassifierParameters::default().with_k(k);
        let inner = KNNClassifier::fit(&matrix, &targets, params)
            .map_err(|e| ModelError::Fit(e.to_string()))?;
        let neighbours =
            CoverTree::new(x.to_vec(), Euclidian::new()).map_err(|e| ModelError::Fit(e.to_string()))?;

        Ok(Self {
            k,
            n_features,
            labels: y.to_vec(),
            inner,
            neighbours,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Classifier for KnnModel {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        check_width(x, self.n_features)?;
        if x.is_empty() {
            return Ok(Vec::new());
        }
        let predicted = self
            .inner
            .predict(&convert_features_to_matrix(x))
            .map_err(|e| ModelError::Predict(e.to_string()))?;
        Ok(predicted.into_iter().map(|v| u8::from(v == 1)).collect())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Result<Vec<f64>, ModelError>> {
        if let Err(err) = check_width(x, self.n_features) {
            return Some(Err(err));
        }
        let votes = x
            .iter()
            .map(|row| -> Result<f64, ModelError> {
                let found = self
                    .neighbours
                    .find(row, self.k)
                    .map_err(|e| ModelError::Predict(e.to_string()))?;
                let exits = found.iter().filter(|(idx, _, _)| self.labels[*idx] == 1).count();
                Ok(exits as f64 / found.len().max(1) as f64)
            })
            .collect();
        Some(votes)
    }
}
