use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use super::{check_training_set, check_width, normalize, threshold, Classifier};
use crate::error::ModelError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub tree: TreeParams,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            tree: TreeParams {
                max_depth: Some(10),
                ..TreeParams::default()
            },
            seed: 10,
        }
    }
}

/// Bagged CART trees with a random column subset (√p) at every split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        if params.n_trees == 0 {
            return Err(ModelError::Fit("a forest needs at least one tree".into()));
        }

        let tree_params = TreeParams {
            max_features: Some(params.tree.max_features.unwrap_or_else(|| {
                ((n_features as f64).sqrt().ceil() as usize).max(1)
            })),
            ..params.tree.clone()
        };

        let mut rng = StdRng::seed_from_u64(params.seed);
        let n = x.len();
        let mut trees = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            trees.push(DecisionTree::fit_indices(x, y, bootstrap, &tree_params, &mut rng)?);
        }

        Ok(Self {
            params: params.clone(),
            n_features,
            trees,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Mean of the per-tree leaf probabilities.
    pub fn probabilities(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width(x, self.n_features)?;
        let mut sums = vec![0.0; x.len()];
        for tree in &self.trees {
            for (sum, p) in sums.iter_mut().zip(tree.probabilities(x)?) {
                *sum += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        Ok(sums.into_iter().map(|s| s / n_trees).collect())
    }
}

impl Classifier for RandomForest {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        Ok(threshold(&self.probabilities(x)?))
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Result<Vec<f64>, ModelError>> {
        Some(self.probabilities(x))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.raw_importances()) {
                *acc += v;
            }
        }
        Some(normalize(total))
    }
}
