//! Error taxonomy for the gistreg domain.

use std::path::PathBuf;

/// Errors produced while loading, saving or training a performance model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("model not found at {} and no training fallback is configured", .0.display())]
    NoTrainingFallback(PathBuf),

    #[error("invalid model artifact {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("model training failed: {0}")]
    TrainingFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while turning a hardware configuration into a prediction.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("feature schema mismatch: model expects {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("unknown feature in schema: {0}")]
    UnknownFeature(String),

    #[error("model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("malformed model: {0}")]
    MalformedModel(String),
}

/// Errors produced while reading harness settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_display() {
        let err = ModelError::NotFound(PathBuf::from("performance_model.json"));
        assert!(err.to_string().contains("model not found"));
        assert!(err.to_string().contains("performance_model.json"));

        let err = ModelError::NoTrainingFallback(PathBuf::from("m.json"));
        assert!(err.to_string().contains("no training fallback"));
    }

    #[test]
    fn test_schema_mismatch_error() {
        let err = PredictError::SchemaMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
