//! gistreg Core Library
//!
//! Domain types shared by the regression harness:
//! - `HardwareConfig` / `RunEnvironment`: the configuration under test
//! - `FeatureSchema`: versioned feature order shared with model training
//! - `PerformanceModel` / `ModelStore`: the persisted predictor
//! - `PredictionClient`: the seam the matrix runner predicts through

pub mod config;
pub mod error;
pub mod model;
pub mod predict;
pub mod schema;
pub mod settings;
pub mod telemetry;

pub use config::{
    HardwareConfig, RunEnvironment, ENV_GC_CLOCK_FREQ, ENV_HASH_ENABLED, ENV_MODEL_PATH,
    ENV_SBM_CLOCK_FREQ, ENV_WR_RD_LATENCY,
};
pub use error::{ModelError, ModelResult, PredictError, SettingsError};
pub use model::{
    Estimator, ModelStore, ModelTrainer, PerformanceModel, RegressionTree, TreeNode,
    DEFAULT_MODEL_STORE,
};
pub use predict::{ModelPredictor, PredictionClient};
pub use schema::{FeatureSchema, V1_FEATURES};
pub use settings::{HarnessSettings, WorkAreaPolicy};
pub use telemetry::init_tracing;
