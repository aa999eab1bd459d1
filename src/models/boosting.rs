//! Gradient-boosted regression trees on the logistic loss.
//!
//! Each round fits a depth-limited tree to the first and second order
//! gradients of the log loss and adds its leaf weights, shrunk by the
//! learning rate, to the raw score. Split gain and leaf weights use the
//! usual L2-regularised second-order formulas.

use serde::{Deserialize, Serialize};

use super::{check_training_set, check_width, normalize, threshold, Classifier};
use crate::error::ModelError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.1,
            max_depth: 3,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn score(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: BoostingParams,
    n_features: usize,
    base_score: f64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoosting {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &BoostingParams) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        if !(params.learning_rate > 0.0) {
            return Err(ModelError::Fit("learning rate must be positive".into()));
        }

        let n = x.len() as f64;
        let mean = (y.iter().map(|&v| f64::from(v)).sum::<f64>() / n).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (mean / (1.0 - mean)).ln();

        let mut raw = vec![base_score; x.len()];
        let mut gains = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(params.n_rounds);
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];

        for _ in 0..params.n_rounds {
            for i in 0..x.len() {
                let p = sigmoid(raw[i]);
                grad[i] = p - f64::from(y[i]);
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }
            let mut builder = RoundBuilder {
                x,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
                gains: &mut gains,
            };
            builder.grow((0..x.len()).collect(), 0);
            let tree = RegressionTree {
                nodes: builder.nodes,
            };
            for (score, row) in raw.iter_mut().zip(x) {
                *score += params.learning_rate * tree.score(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            params: params.clone(),
            n_features,
            base_score,
            trees,
            importances: normalize(gains),
        })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn probabilities(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width(x, self.n_features)?;
        Ok(x.iter()
            .map(|row| {
                let boost: f64 = self.trees.iter().map(|t| t.score(row)).sum();
                sigmoid(self.base_score + self.params.learning_rate * boost)
            })
            .collect())
    }
}

impl Classifier for GradientBoosting {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<u8>, ModelError> {
        Ok(threshold(&self.probabilities(x)?))
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Option<Result<Vec<f64>, ModelError>> {
        Some(self.probabilities(x))
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}

struct RoundBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    gains: &'a mut Vec<f64>,
}

impl RoundBuilder<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        self.nodes.push(Node::Leaf {
            weight: -g / (h + self.params.lambda),
        });

        if depth >= self.params.max_depth || indices.len() < 2 {
            return id;
        }
        let Some((feature, threshold, gain)) = self.best_split(&indices, g, h) else {
            return id;
        };
        self.gains[feature] += gain;

        let x = self.x;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[i][feature] <= threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<(usize, f64, f64)> {
        let lambda = self.params.lambda;
        let parent = g * g / (h + lambda);
        let n_features = self.x[indices[0]].len();

        let mut best: Option<(usize, f64, f64)> = None;
        let mut order = indices.to_vec();
        for feature in 0..n_features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                gl += self.grad[order[k]];
                hl += self.hess[order[k]];
                let (here, next) = (self.x[order[k]][feature], self.x[order[k + 1]][feature]);
                if here == next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent);
                if gain > 1e-12 && best.map_or(true, |(_, _, b)| gain > b) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{accuracy, blobs};

    #[test]
    fn boosting_beats_the_base_rate() {
        let (x, y) = blobs(300);
        let params = BoostingParams {
            n_rounds: 40,
            min_child_weight: 0.1,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&x, &y, &params).unwrap();
        assert!(accuracy(&y, &model.predict(&x).unwrap()) > 0.85);

        let imp = model.feature_importances().unwrap();
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[2] && imp[1] > imp[2]);
    }

    #[test]
    fn zero_rounds_predicts_the_prior() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0, 0, 0, 1];
        let params = BoostingParams {
            n_rounds: 0,
            ..BoostingParams::default()
        };
        let model = GradientBoosting::fit(&x, &y, &params).unwrap();
        for p in model.probabilities(&x).unwrap() {
            assert!((p - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn non_positive_learning_rate_is_rejected() {
        let (x, y) = blobs(10);
        let params = BoostingParams {
            learning_rate: 0.0,
            ..BoostingParams::default()
        };
        assert!(matches!(
            GradientBoosting::fit(&x, &y, &params),
            Err(ModelError::Fit(_))
        ));
    }
}
