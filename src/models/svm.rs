//! Linear soft-margin SVM fitted with smartcore's SMO solver.

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::svm::svc::{SVCParameters, SVC};
use smartcore::svm::Kernels;

use super::{check_training_set, check_width, convert_features_to_matrix, Classifier};
use crate::error::ModelError;

type Svc<'a> = SVC<'a, f64, i32, DenseMatrix<f64>, Vec<i32>>;
type SvcParameters = SVCParameters<f64, i32, DenseMatrix<f64>, Vec<i32>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    /// Soft-margin penalty; larger values fit the margin harder.
    pub c: f64,
    pub epoch: usize,
    pub tol: f64,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            epoch: 2,
            tol: 1e-3,
            seed: 10,
        }
    }
}

/// Fitted state smartcore exposes through its serde impl. `w` holds the
/// dual coefficient of every support vector in `instances`.
#[derive(Deserialize)]
struct FittedSvc {
    instances: Option<Vec<Vec<f64>>>,
    w: Option<Vec<f64>>,
    b: Option<f64>,
}

/// Hyperplane `w·x + b`; predicts "exits" on the positive side.
///
/// A fitted `SVC` borrows its parameters and keeps them out of its serde
/// form, so it cannot be stored. With a linear kernel its decision
/// function collapses to one weight per feature, which is what is kept.
/// The model carries no probability calibration, so it only reports labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearSvm {
    params: SvmParams,
    weights: Vec<f64>,
    bias: f64,
    support_vectors: usize,
}

impl LinearSvm {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &SvmParams) -> Result<Self, ModelError> {
        let width = check_training_set(x, y)?;
        if !(params.c > 0.0) {
            return Err(ModelError::Fit("C must be positive".into()));
        }
        if y.iter().all(|&v| v == y[0]) {
            return Err(ModelError::Fit("an SVM needs both classes".into()));
        }

        let matrix = convert_features_to_matrix(x);
        let targets: Vec<i32> = y.iter().map(|&v| if v == 1 { 1 } else { -1 }).collect();
        let svc_params: SvcParameters = SVCParameters::default()
            .with_c(params.c)
            .with_epoch(params.epoch)
            .with_tol(params.tol)
            .with_seed(Some(params.seed))
            .with_kernel(Kernels::linear());
        let svc: Svc<'_> =
            SVC::fit(&matrix, &targets, &svc_params).map_err(|e| ModelError::Fit(e.to_string()))?;

        let fitted: FittedSvc = serde_json::to_value(&svc)
            .and_then(serde_json::from_value)
            .map_err(|e| ModelError::Fit(format!("unreadable SVC state: {e}")))?;
        let (Some(instances), Some(duals), Some(bias)) = (fitted.instances, fitted.w, fitted.b) else {
            return Err(ModelError::Fit("SVC returned no hyperplane".into()));
        };

        let mut weights = vec![0.0; width];
        for (vector, dual) in instances.iter().zip(&duals) {
            check_width(std::slice::from_ref(vector), width)?;
            for (w, v) in weights.iter_mut().zip(vector) {
                *w += dual * v;
            }
        }

        Ok(Self {
            params: params.clone(),
            weights,
            bias,
            support_vectors: instances.len(),
        })
    }

    pub fn params(&self) -> &SvmParams {
        &self.params
    }

    pub fn support_vectors(&self) -> usize {
        self.support_vectors
    }

    /// Signed distance-like score of every row.
    pub fn decision_function(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width(x, self.weights.len())?;
        Ok(x.iter().map(|row| dot(&self.weights, row) + self.bias).collect())
    }
}

impl Classifier for LinearSvm {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|score| u8::from(score > 0.0))
            .collect())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{accuracy, blobs};

    #[test]
    fn separates_linear_blobs() {
        let (x, y) = blobs(300);
        let svm = LinearSvm::fit(&x, &y, &SvmParams::default()).unwrap();
        assert!(accuracy(&y, &svm.predict(&x).unwrap()) > 0.85);
        assert!(svm.support_vectors() > 0);
        assert!(svm.predict_proba(&x).is_none());
        assert!(svm.feature_importances().is_none());
    }

    #[test]
    fn folded_weights_match_the_solver() {
        let (x, y) = blobs(60);
        let params = SvmParams::default();
        let svm = LinearSvm::fit(&x, &y, &params).unwrap();

        let matrix = convert_features_to_matrix(&x);
        let targets: Vec<i32> = y.iter().map(|&v| if v == 1 { 1 } else { -1 }).collect();
        let svc_params: SvcParameters = SVCParameters::default()
            .with_c(params.c)
            .with_epoch(params.epoch)
            .with_tol(params.tol)
            .with_seed(Some(params.seed))
            .with_kernel(Kernels::linear());
        let svc: Svc<'_> = SVC::fit(&matrix, &targets, &svc_params).unwrap();
        let expected = svc.decision_function(&matrix).unwrap();

        for (ours, theirs) in svm.decision_function(&x).unwrap().iter().zip(&expected) {
            assert!((ours - theirs).abs() < 1e-9, "{ours} vs {theirs}");
        }
    }

    #[test]
    fn decision_sign_matches_prediction() {
        let (x, y) = blobs(100);
        let svm = LinearSvm::fit(&x, &y, &SvmParams::default()).unwrap();
        let scores = svm.decision_function(&x).unwrap();
        let labels = svm.predict(&x).unwrap();
        for (score, label) in scores.iter().zip(labels) {
            assert_eq!(label == 1, *score > 0.0);
        }
    }

    #[test]
    fn one_class_cannot_be_separated() {
        let x = vec![vec![0.0], vec![1.0]];
        assert!(matches!(
            LinearSvm::fit(&x, &[1, 1], &SvmParams::default()),
            Err(ModelError::Fit(_))
        ));
    }

    #[test]
    fn same_seed_same_hyperplane() {
        let (x, y) = blobs(80);
        let a = LinearSvm::fit(&x, &y, &SvmParams::default()).unwrap();
        let b = LinearSvm::fit(&x, &y, &SvmParams::default()).unwrap();
        assert_eq!(a, b);
    }
}
