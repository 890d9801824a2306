//! Performance model artifact and its on-disk lifecycle.
//!
//! The artifact is JSON: the feature schema the model was fitted against plus
//! the fitted estimator. Only inference lives here; fitting happens in an
//! external trainer that writes the artifact to the store path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::HardwareConfig;
use crate::error::{ModelError, ModelResult, PredictError};
use crate::schema::FeatureSchema;

/// Default location of the persisted model.
pub const DEFAULT_MODEL_STORE: &str = "performance_model.json";

/// One node of a regression tree. Index 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go to `left` when `x[feature] <= threshold`, else to `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A single regression tree in flattened form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn evaluate(&self, x: &[f64]) -> Result<f64, PredictError> {
        let mut index = 0usize;
        // A well-formed tree reaches a leaf in fewer hops than it has nodes.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).ok_or_else(|| {
                        PredictError::MalformedModel(format!(
                            "split on feature {} outside vector of {}",
                            feature,
                            x.len()
                        ))
                    })?;
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(PredictError::MalformedModel(format!(
                        "node index {} out of range",
                        index
                    )))
                }
            }
        }
        Err(PredictError::MalformedModel(
            "tree contains a cycle".to_string(),
        ))
    }
}

/// Fitted estimator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    /// `intercept + sum(coefficients[i] * x[i])`.
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    /// Mean of per-tree predictions.
    Forest { trees: Vec<RegressionTree> },
}

/// Persisted performance model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceModel {
    /// Schema the estimator was fitted against.
    pub schema: FeatureSchema,

    /// The fitted estimator.
    pub estimator: Estimator,
}

impl PerformanceModel {
    pub fn new(schema: FeatureSchema, estimator: Estimator) -> Self {
        Self { schema, estimator }
    }

    /// Predict from an already-built feature vector.
    ///
    /// `schema` is the schema the caller built `x` with; it must match the
    /// model's schema digest.
    pub fn predict_vector(&self, schema: &FeatureSchema, x: &[f64]) -> Result<f64, PredictError> {
        if schema.digest != self.schema.digest {
            return Err(PredictError::SchemaMismatch {
                expected: self.schema.digest.clone(),
                actual: schema.digest.clone(),
            });
        }
        if x.len() != self.schema.len() {
            return Err(PredictError::FeatureCount {
                expected: self.schema.len(),
                actual: x.len(),
            });
        }

        match &self.estimator {
            Estimator::Linear {
                intercept,
                coefficients,
            } => {
                if coefficients.len() != x.len() {
                    return Err(PredictError::FeatureCount {
                        expected: coefficients.len(),
                        actual: x.len(),
                    });
                }
                Ok(intercept
                    + coefficients
                        .iter()
                        .zip(x)
                        .map(|(c, v)| c * v)
                        .sum::<f64>())
            }
            Estimator::Forest { trees } => {
                if trees.is_empty() {
                    return Err(PredictError::MalformedModel(
                        "forest has no trees".to_string(),
                    ));
                }
                let mut total = 0.0;
                for tree in trees {
                    total += tree.evaluate(x)?;
                }
                Ok(total / trees.len() as f64)
            }
        }
    }

    /// Predict for a hardware configuration using the model's own schema.
    pub fn predict(&self, config: &HardwareConfig) -> Result<f64, PredictError> {
        let x = config.features(&self.schema)?;
        self.predict_vector(&self.schema, &x)
    }
}

/// Produces a model artifact at a store path when none exists yet.
pub trait ModelTrainer: Send + Sync {
    /// Fit a model and persist it at `path`.
    fn train(&self, path: &Path) -> ModelResult<()>;
}

/// Filesystem store for the performance model.
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the model. Fails with [`ModelError::NotFound`] if absent.
    pub fn load(&self) -> ModelResult<PerformanceModel> {
        if !self.path.exists() {
            return Err(ModelError::NotFound(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        let model: PerformanceModel = serde_json::from_str(&content)?;
        if !model.schema.is_consistent() {
            return Err(ModelError::InvalidArtifact {
                path: self.path.clone(),
                reason: "schema digest does not match its feature list".to_string(),
            });
        }
        info!(path = %self.path.display(), version = model.schema.version, "Model loaded");
        Ok(model)
    }

    /// Save the model, overwriting any existing artifact.
    pub fn save(&self, model: &PerformanceModel) -> ModelResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(model)?;
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "Model saved");
        Ok(())
    }

    /// Load the model, training it first when absent and a trainer is given.
    pub fn load_or_train(&self, trainer: Option<&dyn ModelTrainer>) -> ModelResult<PerformanceModel> {
        match self.load() {
            Err(ModelError::NotFound(path)) => match trainer {
                Some(trainer) => {
                    warn!(path = %path.display(), "No pre-trained model found, training a new model");
                    trainer.train(&self.path)?;
                    self.load()
                }
                None => Err(ModelError::NoTrainingFallback(path)),
            },
            other => other,
        }
    }
}
