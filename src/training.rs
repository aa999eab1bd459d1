//! Offline training for every registered model.
//!
//! The preprocessor is fitted once on the full dataset, the stratified split
//! is applied, and each model key is fitted on the training partition (SMOTE
//! balanced where the key asks for it). The decision tree is tuned by a
//! small grid search with 5-fold cross validation, balancing only the
//! training folds.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use serde::Serialize;
use smartcore::metrics::accuracy;
use smartcore::model_selection::{BaseKFold, KFold};

use crate::dataset::{Dataset, SplitConfig};
use crate::error::{ModelError, TrainingError};
use crate::memory::memory_mib;
use crate::models::smote::{smote, DEFAULT_NEIGHBOURS};
use crate::models::{
    convert_features_to_matrix, BoostingParams, ChurnModel, Classifier, DecisionTree, ForestParams,
    GradientBoosting, KnnModel, LinearSvm, LogisticModel, RandomForest, SplitCriterion, SvmParams,
    TreeParams,
};
use crate::preprocess::Preprocessor;
use crate::registry::{ModelArtifact, ModelKey};

pub const REPORT_FILE: &str = "training_report.csv";
pub const CV_FOLDS: usize = 5;
pub const KNN_NEIGHBOURS: usize = 5;
pub const LR_ALPHA: f64 = 0.0;

pub const TREE_MAX_LEAF_NODES: [usize; 4] = [2, 10, 20, 30];
pub const TREE_MIN_SAMPLES_SPLIT: [usize; 3] = [2, 3, 4];

/// Hyper-parameter grid searched for the decision tree. Depth is left
/// unbounded so the leaf cap alone limits the size.
pub fn tree_grid(seed: u64) -> Vec<TreeParams> {
    let mut grid = Vec::new();
    for max_leaf_nodes in TREE_MAX_LEAF_NODES {
        for min_samples_split in TREE_MIN_SAMPLES_SPLIT {
            for criterion in [SplitCriterion::Gini, SplitCriterion::Entropy] {
                grid.push(TreeParams {
                    criterion,
                    max_depth: None,
                    max_leaf_nodes: Some(max_leaf_nodes),
                    min_samples_split,
                    seed,
                    ..TreeParams::default()
                });
            }
        }
    }
    grid
}

/// Accuracy of `model` on `x`, scored with smartcore's metric.
pub fn score(model: &dyn Classifier, x: &[Vec<f64>], y: &[u8]) -> Result<f64, ModelError> {
    let predicted = model.predict(x)?;
    let y_true: Vec<i32> = y.iter().map(|&v| i32::from(v)).collect();
    let y_pred: Vec<i32> = predicted.iter().map(|&v| i32::from(v)).collect();
    Ok(accuracy(&y_true, &y_pred))
}

fn select(x: &[Vec<f64>], y: &[u8], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<u8>) {
    indices.iter().map(|&i| (x[i].clone(), y[i])).unzip()
}

/// Best tree parameters by mean cross-validated accuracy; ties keep the
/// earlier grid entry.
pub fn grid_search_tree(
    x: &[Vec<f64>],
    y: &[u8],
    seed: u64,
) -> Result<(TreeParams, f64), ModelError> {
    if x.len() < CV_FOLDS * 2 {
        return Err(ModelError::Fit(format!(
            "{} rows are too few for {CV_FOLDS}-fold cross validation",
            x.len()
        )));
    }
    let cv = KFold::default().with_n_splits(CV_FOLDS).with_shuffle(false);
    let folds: Vec<(Vec<usize>, Vec<usize>)> = cv.split(&convert_features_to_matrix(x)).collect();

    let mut best: Option<(TreeParams, f64)> = None;
    for params in tree_grid(seed) {
        let mut total = 0.0;
        for (train_idx, valid_idx) in &folds {
            let (fold_x, fold_y) = select(x, y, train_idx);
            let (fold_x, fold_y) = smote(&fold_x, &fold_y, DEFAULT_NEIGHBOURS, seed)?;
            let tree = DecisionTree::fit(&fold_x, &fold_y, &params)?;
            let (valid_x, valid_y) = select(x, y, valid_idx);
            total += score(&tree, &valid_x, &valid_y)?;
        }
        let mean = total / folds.len() as f64;
        debug!("tree grid {params:?}: cv accuracy {mean:.4}");
        if best.as_ref().map_or(true, |(_, top)| mean > *top) {
            best = Some((params, mean));
        }
    }
    best.ok_or_else(|| ModelError::Fit("empty parameter grid".into()))
}

/// Partitions shared by every model fit.
struct TrainingData {
    x_train: Vec<Vec<f64>>,
    y_train: Vec<u8>,
    x_balanced: Vec<Vec<f64>>,
    y_balanced: Vec<u8>,
    seed: u64,
}

fn to_json<T: Serialize>(params: &T) -> Result<serde_json::Value, ModelError> {
    serde_json::to_value(params).map_err(|e| ModelError::Fit(e.to_string()))
}

fn fit_model(key: ModelKey, data: &TrainingData) -> Result<(ChurnModel, serde_json::Value), ModelError> {
    let seed = data.seed;
    let (x, y) = (&data.x_train, &data.y_train);
    let (xb, yb) = (&data.x_balanced, &data.y_balanced);
    Ok(match key {
        ModelKey::Dt => {
            let (params, cv_score) = grid_search_tree(x, y, seed)?;
            info!("decision tree best cv accuracy {cv_score:.4} with {params:?}");
            let tree = DecisionTree::fit(xb, yb, &params)?;
            (ChurnModel::DecisionTree(tree), to_json(&params)?)
        }
        ModelKey::Knn => (
            ChurnModel::Knn(KnnModel::fit(x, y, KNN_NEIGHBOURS)?),
            serde_json::json!({ "k": KNN_NEIGHBOURS }),
        ),
        ModelKey::Lr => (
            ChurnModel::LogisticRegression(LogisticModel::fit(x, y, LR_ALPHA)?),
            serde_json::json!({ "alpha": LR_ALPHA }),
        ),
        ModelKey::Rf => {
            let params = ForestParams {
                seed,
                ..ForestParams::default()
            };
            (ChurnModel::RandomForest(RandomForest::fit(x, y, &params)?), to_json(&params)?)
        }
        ModelKey::Svm | ModelKey::SvmSmote => {
            let params = SvmParams {
                seed,
                ..SvmParams::default()
            };
            let svm = if key == ModelKey::SvmSmote {
                LinearSvm::fit(xb, yb, &params)?
            } else {
                LinearSvm::fit(x, y, &params)?
            };
            (ChurnModel::LinearSvm(svm), to_json(&params)?)
        }
        ModelKey::Xgb => {
            let params = BoostingParams::default();
            (ChurnModel::GradientBoosting(GradientBoosting::fit(x, y, &params)?), to_json(&params)?)
        }
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Fit one artifact per [`ModelKey`], in registry order.
pub fn fit_artifacts(dataset: &Dataset, split: &SplitConfig) -> Result<Vec<ModelArtifact>, TrainingError> {
    let (train, test) = dataset.partitions(split)?;
    info!(
        "training on {} rows, holding out {} (test_size {}, seed {})",
        train.len(),
        test.len(),
        split.test_size,
        split.seed
    );

    let preprocessor = Preprocessor::fit(&dataset.roles, &dataset.frame)?;
    let x_train = preprocessor.transform_all(&train.features)?;
    let x_test = preprocessor.transform_all(&test.features)?;

    let (x_balanced, y_balanced) = smote(&x_train, &train.labels, DEFAULT_NEIGHBOURS, split.seed)
        .map_err(|source| TrainingError::Model {
            key: "smote".into(),
            source,
        })?;
    debug!("SMOTE grew the training set from {} to {} rows", x_train.len(), x_balanced.len());

    let data = TrainingData {
        x_train,
        y_train: train.labels,
        x_balanced,
        y_balanced,
        seed: split.seed,
    };

    let mut artifacts = Vec::with_capacity(ModelKey::ALL.len());
    for key in ModelKey::ALL {
        let wrap = |source| TrainingError::Model {
            key: key.to_string(),
            source,
        };
        let (model, params) = fit_model(key, &data).map_err(wrap)?;
        let train_score = score(&model, &data.x_train, &data.y_train).map_err(wrap)?;
        let test_score = score(&model, &x_test, &test.labels).map_err(wrap)?;
        info!(
            "{} ({}): train accuracy {train_score:.4}, test accuracy {test_score:.4}",
            key,
            key.display_name()
        );
        artifacts.push(ModelArtifact {
            key,
            name: key.display_name().to_string(),
            preprocessor: preprocessor.clone(),
            model,
            params,
            train_score,
            test_score,
            trained_at_ms: now_ms(),
        });
    }
    info!("training done, memory usage {:.1} MiB", memory_mib());
    Ok(artifacts)
}

#[derive(Debug, Serialize)]
struct ReportRow<'a> {
    key: &'a str,
    name: &'a str,
    train_score: f64,
    test_score: f64,
}

/// Write one CSV row per artifact.
pub fn write_report(path: &Path, artifacts: &[ModelArtifact]) -> Result<(), TrainingError> {
    let fail = |reason: String| TrainingError::Report {
        path: path.to_path_buf(),
        reason,
    };
    let mut writer = csv::Writer::from_path(path).map_err(|e| fail(e.to_string()))?;
    for artifact in artifacts {
        writer
            .serialize(ReportRow {
                key: artifact.key.as_str(),
                name: &artifact.name,
                train_score: artifact.train_score,
                test_score: artifact.test_score,
            })
            .map_err(|e| fail(e.to_string()))?;
    }
    writer.flush().map_err(|e| fail(e.to_string()))
}

/// Fit every model, save the artifacts under `models_dir` and write the
/// training report next to them. Returns the artifact paths.
pub fn train_all(
    dataset: &Dataset,
    split: &SplitConfig,
    models_dir: &Path,
) -> Result<Vec<PathBuf>, TrainingError> {
    let artifacts = fit_artifacts(dataset, split)?;
    let paths = artifacts
        .iter()
        .map(|artifact| artifact.save(models_dir))
        .collect::<Result<Vec<_>, _>>()?;
    let report = models_dir.join(REPORT_FILE);
    write_report(&report, &artifacts)?;
    info!("wrote {} artifacts and {}", paths.len(), report.display());
    Ok(paths)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::dataset::Dataset;
    use crate::preprocess::ColumnRoles;
    use crate::records::{ChurnRecord, CustomerFeatures};

    const GEOGRAPHIES: [&str; 3] = ["France", "Germany", "Spain"];

    /// Deterministic customers whose churn is driven by age and activity;
    /// a little under half of them exit.
    pub fn churn_dataset(n: usize) -> Dataset {
        let records = (0..n)
            .map(|i| {
                let age = 18.0 + ((i * 37) % 60) as f64;
                let active = ((i * 7) % 3 != 0) as i64;
                let exited = u8::from(age > 52.0 || (age > 44.0 && active == 0));
                ChurnRecord {
                    features: CustomerFeatures {
                        credit_score: 400.0 + ((i * 53) % 450) as f64,
                        geography: GEOGRAPHIES[i % 3].to_string(),
                        gender: if i % 2 == 0 { "Male" } else { "Female" }.to_string(),
                        age,
                        tenure: (i % 11) as f64,
                        balance: ((i * 7919) % 200_000) as f64,
                        num_of_products: 1 + (i % 4) as i64,
                        has_cr_card: (i % 5 != 0) as i64,
                        is_active_member: active,
                        estimated_salary: 10_000.0 + ((i * 104_729) % 190_000) as f64,
                    },
                    exited,
                }
            })
            .collect();
        let roles = ColumnRoles {
            numeric: [
                "CreditScore",
                "Age",
                "Tenure",
                "Balance",
                "NumOfProducts",
                "HasCrCard",
                "IsActiveMember",
                "EstimatedSalary",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            categorical: vec!["Geography".into(), "Gender".into()],
        };
        Dataset::from_records("synthetic.csv", roles, records).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::churn_dataset;
    use super::*;
    use crate::registry::ModelRegistry;
    use std::collections::BTreeSet;

    #[test]
    fn grid_covers_both_criteria() {
        let grid = tree_grid(10);
        assert_eq!(grid.len(), 24);
        assert!(grid.iter().any(|p| p.criterion == SplitCriterion::Entropy));
        assert!(grid.iter().all(|p| p.seed == 10 && p.max_depth.is_none()));
        let caps: BTreeSet<usize> = grid.iter().filter_map(|p| p.max_leaf_nodes).collect();
        assert_eq!(caps.into_iter().collect::<Vec<_>>(), TREE_MAX_LEAF_NODES);
        let splits: BTreeSet<usize> = grid.iter().map(|p| p.min_samples_split).collect();
        assert_eq!(splits.into_iter().collect::<Vec<_>>(), TREE_MIN_SAMPLES_SPLIT);
    }

    #[test]
    fn grid_search_needs_enough_rows() {
        let x = vec![vec![0.0]; 9];
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1, 0];
        assert!(matches!(grid_search_tree(&x, &y, 1), Err(ModelError::Fit(_))));
    }

    #[test]
    fn every_key_gets_a_scored_artifact() {
        let dataset = churn_dataset(300);
        let artifacts = fit_artifacts(&dataset, &SplitConfig::default()).unwrap();
        let keys: Vec<ModelKey> = artifacts.iter().map(|a| a.key).collect();
        assert_eq!(keys, ModelKey::ALL.to_vec());
        for artifact in &artifacts {
            assert!((0.0..=1.0).contains(&artifact.test_score), "{}", artifact.key);
            assert_eq!(artifact.name, artifact.key.display_name());
        }
        let dt = &artifacts[0];
        for param in ["criterion", "max_leaf_nodes", "min_samples_split"] {
            assert!(dt.params.get(param).is_some(), "{param}");
        }
        let cap = dt.params["max_leaf_nodes"].as_u64().unwrap() as usize;
        assert!(TREE_MAX_LEAF_NODES.contains(&cap));
        assert!(dt.test_score > 0.7);
    }

    #[test]
    fn train_all_writes_a_loadable_registry_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let paths = train_all(&churn_dataset(240), &SplitConfig::default(), dir.path()).unwrap();
        assert_eq!(paths.len(), ModelKey::ALL.len());

        let registry = ModelRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), ModelKey::ALL.len());

        let mut reader = csv::Reader::from_path(dir.path().join(REPORT_FILE)).unwrap();
        let keys: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(keys.len(), 7);
        assert_eq!(keys[5], "svm_smote");
    }
}
