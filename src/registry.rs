//! Persisted model artifacts and the startup registry.
//!
//! Each fitted model lives in `<models_dir>/<key>.json` together with the
//! preprocessor it was trained behind. The registry loads all of them once;
//! a missing or unreadable artifact is a startup failure.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, RegistryError};
use crate::models::{ChurnModel, Classifier};
use crate::preprocess::Preprocessor;
use crate::records::CustomerFeatures;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKey {
    Dt,
    Knn,
    Lr,
    Rf,
    Svm,
    SvmSmote,
    Xgb,
}

impl ModelKey {
    /// Registry order.
    pub const ALL: [ModelKey; 7] = [
        ModelKey::Dt,
        ModelKey::Knn,
        ModelKey::Lr,
        ModelKey::Rf,
        ModelKey::Svm,
        ModelKey::SvmSmote,
        ModelKey::Xgb,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKey::Dt => "dt",
            ModelKey::Knn => "knn",
            ModelKey::Lr => "lr",
            ModelKey::Rf => "rf",
            ModelKey::Svm => "svm",
            ModelKey::SvmSmote => "svm_smote",
            ModelKey::Xgb => "xgb",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelKey::Dt => "Decision Tree",
            ModelKey::Knn => "K-Nearest Neighbors",
            ModelKey::Lr => "Logistic Regression",
            ModelKey::Rf => "Random Forest",
            ModelKey::Svm => "SVM - without SMOTE",
            ModelKey::SvmSmote => "SVM - with SMOTE",
            ModelKey::Xgb => "XGBoost",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.json", self.as_str())
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted model and everything needed to run it on raw customer rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub key: ModelKey,
    pub name: String,
    pub preprocessor: Preprocessor,
    pub model: ChurnModel,
    /// Hyper-parameters the model was fitted with.
    pub params: serde_json::Value,
    pub train_score: f64,
    pub test_score: f64,
    pub trained_at_ms: u64,
}

impl ModelArtifact {
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.key.file_name())
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, RegistryError> {
        let path = self.path_in(dir);
        let io_err = |source| RegistryError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut writer = BufWriter::new(File::create(&path).map_err(io_err)?);
        serde_json::to_writer(&mut writer, self).map_err(|source| RegistryError::Format {
            path: path.clone(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }

    pub fn load(dir: &Path, key: ModelKey) -> Result<Self, RegistryError> {
        let path = dir.join(key.file_name());
        let file = File::open(&path).map_err(|source| RegistryError::Io {
            path: path.clone(),
            source,
        })?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|source| RegistryError::Format {
                path: path.clone(),
                source,
            })?;
        if artifact.key != key {
            return Err(RegistryError::KeyMismatch {
                path,
                expected: key.to_string(),
                found: artifact.key.to_string(),
            });
        }
        Ok(artifact)
    }

    pub fn transform(&self, rows: &[CustomerFeatures]) -> Result<Vec<Vec<f64>>, ModelError> {
        Ok(self.preprocessor.transform_all(rows)?)
    }

    pub fn feature_importances(&self) -> Option<Vec<f64>> {
        self.model.feature_importances()
    }

    /// Predict labels for raw customer rows.
    pub fn predict(&self, rows: &[CustomerFeatures]) -> Result<Vec<u8>, ModelError> {
        self.model.predict(&self.transform(rows)?)
    }
}

/// Every fitted model, in [`ModelKey::ALL`] order.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelArtifact>,
}

impl ModelRegistry {
    /// Load every registered key from `dir`; the first failure aborts.
    pub fn load(dir: &Path) -> Result<Self, RegistryError> {
        let mut models = Vec::with_capacity(ModelKey::ALL.len());
        for key in ModelKey::ALL {
            let artifact = ModelArtifact::load(dir, key)?;
            info!(
                "loaded {} ({}), test accuracy {:.3}",
                key,
                artifact.name,
                artifact.test_score
            );
            models.push(artifact);
        }
        Ok(Self { models })
    }

    pub fn from_artifacts(mut models: Vec<ModelArtifact>) -> Self {
        models.sort_by_key(|m| m.key);
        Self { models }
    }

    pub fn get(&self, key: ModelKey) -> Option<&ModelArtifact> {
        self.models.iter().find(|m| m.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelArtifact> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionTree, TreeParams};
    use crate::preprocess::ColumnRoles;
    use crate::records::features_frame;

    fn customer(age: f64, geography: &str) -> CustomerFeatures {
        CustomerFeatures {
            credit_score: 600.0,
            geography: geography.into(),
            gender: "Male".into(),
            age,
            tenure: 1.0,
            balance: 0.0,
            num_of_products: 1,
            has_cr_card: 1,
            is_active_member: 0,
            estimated_salary: 1000.0,
        }
    }

    fn artifact(key: ModelKey) -> ModelArtifact {
        let rows = vec![customer(20.0, "France"), customer(60.0, "Spain")];
        let roles = ColumnRoles {
            numeric: vec!["Age".into()],
            categorical: vec!["Geography".into()],
        };
        let preprocessor = Preprocessor::fit(&roles, &features_frame(&rows).unwrap()).unwrap();
        let x = preprocessor.transform_all(&rows).unwrap();
        let tree = DecisionTree::fit(&x, &[0, 1], &TreeParams::default()).unwrap();
        ModelArtifact {
            key,
            name: key.display_name().into(),
            preprocessor,
            model: ChurnModel::DecisionTree(tree),
            params: serde_json::json!({"max_depth": 8}),
            train_score: 1.0,
            test_score: 1.0,
            trained_at_ms: 0,
        }
    }

    #[test]
    fn keys_round_trip_through_their_names() {
        for key in ModelKey::ALL {
            assert_eq!(ModelKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ModelKey::parse("nope"), None);
        assert_eq!(ModelKey::SvmSmote.file_name(), "svm_smote.json");
    }

    #[test]
    fn saved_artifacts_load_into_a_full_registry() {
        let dir = tempfile::tempdir().unwrap();
        for key in ModelKey::ALL {
            artifact(key).save(dir.path()).unwrap();
        }
        let registry = ModelRegistry::load(dir.path()).unwrap();
        assert_eq!(registry.len(), ModelKey::ALL.len());
        let keys: Vec<ModelKey> = registry.iter().map(|m| m.key).collect();
        assert_eq!(keys, ModelKey::ALL.to_vec());

        let dt = registry.get(ModelKey::Dt).unwrap();
        assert_eq!(dt.predict(&[customer(58.0, "Spain")]).unwrap(), vec![1]);
    }

    #[test]
    fn a_missing_artifact_fails_the_whole_load() {
        let dir = tempfile::tempdir().unwrap();
        for key in ModelKey::ALL.into_iter().filter(|k| *k != ModelKey::Xgb) {
            artifact(key).save(dir.path()).unwrap();
        }
        match ModelRegistry::load(dir.path()).unwrap_err() {
            RegistryError::Io { path, .. } => assert!(path.ends_with("xgb.json")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn an_artifact_under_the_wrong_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let lr = artifact(ModelKey::Lr);
        let path = lr.save(dir.path()).unwrap();
        fs::rename(path, dir.path().join("dt.json")).unwrap();
        assert!(matches!(
            ModelArtifact::load(dir.path(), ModelKey::Dt),
            Err(RegistryError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn unknown_category_fails_prediction() {
        let dt = artifact(ModelKey::Dt);
        assert!(matches!(
            dt.predict(&[customer(30.0, "Italy")]),
            Err(ModelError::Preprocess(_))
        ));
    }
}
