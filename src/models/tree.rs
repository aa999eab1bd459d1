//! CART classification tree with class-ratio leaves.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{check_training_set, check_width, normalize, threshold, Classifier};
use crate::error::ModelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

impl SplitCriterion {
    fn impurity(self, positives: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let p = positives as f64 / total as f64;
        let q = 1.0 - p;
        match self {
            SplitCriterion::Gini => 1.0 - p * p - q * q,
            SplitCriterion::Entropy => [p, q]
                .iter()
                .filter(|&&v| v > 0.0)
                .map(|&v| -v * v.log2())
                .sum(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: SplitCriterion,
    /// `None` grows until the leaves are pure.
    pub max_depth: Option<usize>,
    /// Caps the leaf count; the tree then grows best-first, always
    /// splitting the leaf with the largest weighted impurity decrease.
    pub max_leaf_nodes: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Columns drawn at random for every split; `None` tries all of them.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            max_depth: Some(8),
            max_leaf_nodes: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        probability: f64,
        samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    n_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &TreeParams) -> Result<Self, ModelError> {
        let mut rng = StdRng::seed_from_u64(params.seed);
        Self::fit_indices(x, y, (0..x.len()).collect(), params, &mut rng)
    }

    /// Grow a tree on a subset (possibly with repeats) of the rows.
    pub(crate) fn fit_indices(
        x: &[Vec<f64>],
        y: &[u8],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self, ModelError> {
        let n_features = check_training_set(x, y)?;
        if indices.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }

        let mut builder = Builder {
            x,
            y,
            params,
            rng,
            n_features,
            total: indices.len() as f64,
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        builder.grow(indices);

        Ok(Self {
            params: params.clone(),
            n_features,
            nodes: builder.nodes,
            importances: normalize(builder.importances),
        })
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub(crate) fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    fn leaf_probability(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { probability, .. } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    pub fn probabilities(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width(x, self.n_features)?;
        Ok(x.iter().map(|row| self.leaf_probability(row)).collect())
    }
}

impl Classifier for DecisionTree {
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

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A leaf that can still be split.
struct Frontier {
    node: usize,
    depth: usize,
    indices: Vec<usize>,
    choice: SplitChoice,
}

impl Frontier {
    fn improvement(&self) -> f64 {
        self.choice.gain * self.indices.len() as f64
    }
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    params: &'a TreeParams,
    rng: &'a mut StdRng,
    n_features: usize,
    total: f64,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl Builder<'_> {
    fn grow(&mut self, indices: Vec<usize>) {
        let mut frontier = Vec::new();
        let root = self.leaf(&indices);
        frontier.extend(self.expandable(root, 0, indices));

        let mut leaves = 1;
        loop {
            if self.params.max_leaf_nodes.is_some_and(|cap| leaves >= cap) {
                break;
            }
            let next = match self.params.max_leaf_nodes {
                Some(_) => frontier
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.improvement().total_cmp(&b.improvement()))
                    .map(|(i, _)| i),
                None => frontier.len().checked_sub(1),
            };
            let Some(next) = next else {
                break;
            };
            let Frontier {
                node,
                depth,
                indices,
                choice,
            } = frontier.swap_remove(next);

            let x = self.x;
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i][choice.feature] <= choice.threshold);
            self.importances[choice.feature] += choice.gain * indices.len() as f64 / self.total;

            let left = self.leaf(&left_rows);
            let right = self.leaf(&right_rows);
            self.nodes[node] = Node::Split {
                feature: choice.feature,
                threshold: choice.threshold,
                left,
                right,
            };
            leaves += 1;
            frontier.extend(self.expandable(left, depth + 1, left_rows));
            frontier.extend(self.expandable(right, depth + 1, right_rows));
        }
    }

    fn leaf(&mut self, indices: &[usize]) -> usize {
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        self.nodes.push(Node::Leaf {
            probability: positives as f64 / indices.len() as f64,
            samples: indices.len(),
        });
        self.nodes.len() - 1
    }

    fn expandable(&mut self, node: usize, depth: usize, indices: Vec<usize>) -> Option<Frontier> {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| self.y[i] == 1).count();
        let pure = positives == 0 || positives == n;
        let too_deep = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || too_deep || n < self.params.min_samples_split.max(2) {
            return None;
        }
        let choice = self.best_split(&indices, positives)?;
        Some(Frontier {
            node,
            depth,
            indices,
            choice,
        })
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(k) if k < self.n_features => {
                rand::seq::index::sample(&mut *self.rng, self.n_features, k.max(1)).into_vec()
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(&mut self, indices: &[usize], positives: usize) -> Option<SplitChoice> {
        let (x, y) = (self.x, self.y);
        let criterion = self.params.criterion;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = indices.len();
        let parent = criterion.impurity(positives, n);

        let mut best: Option<SplitChoice> = None;
        let mut order = indices.to_vec();
        for feature in self.candidate_features() {
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left_pos = 0;
            for k in 0..n - 1 {
                left_pos += usize::from(y[order[k]] == 1);
                let (left_n, right_n) = (k + 1, n - k - 1);
                let (here, next) = (x[order[k]][feature], x[order[k + 1]][feature]);
                if here == next || left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let weighted = (left_n as f64 * criterion.impurity(left_pos, left_n)
                    + right_n as f64 * criterion.impurity(positives - left_pos, right_n))
                    / n as f64;
                let gain = parent - weighted;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitChoice {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
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
    fn learns_a_simple_boundary() {
        let (x, y) = blobs(300);
        let tree = DecisionTree::fit(&x, &y, &TreeParams::default()).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert!(accuracy(&y, &pred) > 0.9);

        let probs = tree.predict_proba(&x).unwrap().unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn importances_sum_to_one_and_favour_signal_columns() {
        let (x, y) = blobs(300);
        let tree = DecisionTree::fit(&x, &y, &TreeParams::default()).unwrap();
        let imp = tree.feature_importances().unwrap();
        assert_eq!(imp.len(), 3);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[2] && imp[1] > imp[2]);
    }

    #[test]
    fn depth_zero_is_a_single_base_rate_leaf() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![0, 0, 0, 1];
        let params = TreeParams {
            max_depth: Some(0),
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(&x, &y, &params).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.probabilities(&x).unwrap(), vec![0.25; 4]);
        assert_eq!(tree.predict(&x).unwrap(), vec![0; 4]);
    }

    #[test]
    fn leaf_cap_keeps_the_strongest_splits() {
        let (x, y) = blobs(300);
        let unbounded = TreeParams {
            max_depth: None,
            ..TreeParams::default()
        };
        let full = DecisionTree::fit(&x, &y, &unbounded).unwrap();
        assert!(full.leaf_count() > 4);

        for cap in [2, 4] {
            let params = TreeParams {
                max_leaf_nodes: Some(cap),
                ..unbounded.clone()
            };
            let tree = DecisionTree::fit(&x, &y, &params).unwrap();
            assert_eq!(tree.leaf_count(), cap);
        }

        // a single split goes to the column with the largest gain
        let x = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
            vec![1.0, 3.0],
        ];
        let y = vec![0, 0, 1, 1, 1, 1];
        let params = TreeParams {
            max_leaf_nodes: Some(2),
            ..unbounded
        };
        let stump = DecisionTree::fit(&x, &y, &params).unwrap();
        assert_eq!(stump.leaf_count(), 2);
        assert_eq!(stump.predict(&x).unwrap(), y);
        let imp = stump.feature_importances().unwrap();
        assert_eq!(imp, vec![1.0, 0.0]);
    }

    #[test]
    fn entropy_splits_a_separable_column_perfectly() {
        let x = vec![vec![0.1], vec![0.2], vec![0.8], vec![0.9]];
        let y = vec![0, 0, 1, 1];
        let params = TreeParams {
            criterion: SplitCriterion::Entropy,
            ..TreeParams::default()
        };
        let tree = DecisionTree::fit(&x, &y, &params).unwrap();
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.probabilities(&[vec![0.5]]).unwrap(), vec![0.0]);
    }

    #[test]
    fn rejects_rows_of_the_wrong_width() {
        let (x, y) = blobs(20);
        let tree = DecisionTree::fit(&x, &y, &TreeParams::default()).unwrap();
        assert!(matches!(
            tree.predict(&[vec![0.0]]),
            Err(ModelError::ShapeMismatch { expected: 3, found: 1 })
        ));
    }
}
