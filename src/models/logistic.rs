use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};

use super::{check_training_set, check_width, convert_features_to_matrix, Classifier};
use crate::error::ModelError;

type Inner = LogisticRegression<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Binary logistic regression fitted with smartcore's L-BFGS solver.
///
/// Labels come from smartcore (`sigmoid(w·x + b) > 0.5`); the probability
/// of exiting is that same sigmoid.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogisticModel {
    alpha: f64,
    n_features: usize,
    inner: Inner,
}

impl LogisticModel {
    pub fn fit(x: &[Vec<f64>], y: &[u8], alpha: f64) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        if y.iter().all(|&v| v == y[0]) {
            return Err(ModelError::Fit("logistic regression needs both classes".into()));
        }

        let matrix = convert_features_to_matrix(x);
        let targets: Vec<i32> = y.iter().map(|&v| i32::from(v)).collect();
        let params = LogisticRegressionParameters::default().with_alpha(alpha);
        let inner: Inner = LogisticRegression::fit(&matrix, &targets, params)
            .map_err(|e| ModelError::Fit(e.to_string()))?;

        let found = inner.coefficients().shape().1;
        if found != n_features {
            return Err(ModelError::Fit(format!(
                "solver returned {found} coefficients for {n_features} features"
            )));
        }

        Ok(Self {
            alpha,
            n_features,
            inner,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn coefficients(&self) -> Vec<f64> {
        flatten(self.inner.coefficients())
    }

    pub fn intercept(&self) -> f64 {
        *self.inner.intercept().get((0, 0))
    }
}

fn flatten(matrix: &DenseMatrix<f64>) -> Vec<f64> {
    let (rows, cols) = matrix.shape();
    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            out.push(*matrix.get((r, c)));
        }
    }
    out
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticModel {
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
        let weights = self.coefficients();
        let intercept = self.intercept();
        Some(Ok(x
            .iter()
            .map(|row| {
                let z: f64 = weights.iter().zip(row).map(|(w, v)| w * v).sum();
                sigmoid(z + intercept)
            })
            .collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{accuracy, blobs};

    #[test]
    fn fits_a_linear_boundary() {
        let (x, y) = blobs(300);
        let model = LogisticModel::fit(&x, &y, 0.0).unwrap();
        assert_eq!(model.coefficients().len(), 3);
        assert!(accuracy(&y, &model.predict(&x).unwrap()) > 0.9);
        // Both signal columns push towards "exits".
        assert!(model.coefficients()[0] > 0.0 && model.coefficients()[1] > 0.0);
    }

    #[test]
    fn probabilities_agree_with_labels() {
        let (x, y) = blobs(200);
        let model = LogisticModel::fit(&x, &y, 0.0).unwrap();
        let labels = model.predict(&x).unwrap();
        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.len(), x.len());
        for (p, label) in proba.iter().zip(&labels) {
            assert!((0.0..=1.0).contains(p));
            if (p - 0.5).abs() > 1e-9 {
                assert_eq!(u8::from(*p > 0.5), *label);
            }
        }
    }

    #[test]
    fn restored_model_predicts_the_same() {
        let (x, y) = blobs(120);
        let model = LogisticModel::fit(&x, &y, 0.0).unwrap();
        let restored: LogisticModel = serde_json::from_str(&serde_json::to_string(&model).unwrap()).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
        for (a, b) in restored.coefficients().iter().zip(model.coefficients()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn single_class_training_set_is_rejected() {
        let x = vec![vec![0.0], vec![1.0]];
        assert!(matches!(
            LogisticModel::fit(&x, &[1, 1], 0.0),
            Err(ModelError::Fit(_))
        ));
    }
}
