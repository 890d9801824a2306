//! Prediction client seam between the regression runner and the model.

use std::sync::Arc;

use crate::config::HardwareConfig;
use crate::error::PredictError;
use crate::model::PerformanceModel;

/// Turns a hardware configuration into a scalar performance estimate.
pub trait PredictionClient: Send + Sync {
    fn predict(&self, config: &HardwareConfig) -> Result<f64, PredictError>;
}

/// Prediction client backed by a loaded [`PerformanceModel`].
///
/// The model is shared read-only; cloning the client is cheap.
#[derive(Debug, Clone)]
pub struct ModelPredictor {
    model: Arc<PerformanceModel>,
}

impl ModelPredictor {
    pub fn new(model: PerformanceModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

impl PredictionClient for ModelPredictor {
    fn predict(&self, config: &HardwareConfig) -> Result<f64, PredictError> {
        self.model.predict(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Estimator;
    use crate::schema::FeatureSchema;

    #[test]
    fn test_model_predictor_delegates() {
        let predictor = ModelPredictor::new(PerformanceModel::new(
            FeatureSchema::v1(),
            Estimator::Linear {
                intercept: 1.0,
                coefficients: vec![0.0, 1.0, 0.0, 0.0],
            },
        ));
        let config = HardwareConfig {
            gc_clock_freq: 41,
            ..HardwareConfig::default()
        };
        assert_eq!(predictor.predict(&config).unwrap(), 42.0);
    }

    #[test]
    fn test_predictor_usable_as_trait_object() {
        let predictor: Arc<dyn PredictionClient> = Arc::new(ModelPredictor::new(
            PerformanceModel::new(
                FeatureSchema::v1(),
                Estimator::Linear {
                    intercept: 3.5,
                    coefficients: vec![0.0; 4],
                },
            ),
        ));
        assert_eq!(predictor.predict(&HardwareConfig::default()).unwrap(), 3.5);
    }
}
