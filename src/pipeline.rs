//! Prediction Pipelines
//!
//! Each pipeline takes normalized input, fetches its model from the
//! registry, runs inference and maps the raw code back to a label. Codes
//! missing from a label table become placeholder labels, never errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{PredictError, Result};
use crate::mappings::{display_label, CROPS, DISEASES, FERTILIZERS};
use crate::metrics::{Timer, PREDICTIONS_TOTAL, PREDICTION_ERRORS};
use crate::normalize::{validate_crop_input, validate_fertilizer_input, CropFeatures, FertilizerFeatures};
use crate::registry::{Domain, ModelRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPrediction {
    pub crop: String,
    pub crop_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerPrediction {
    pub fertilizer: String,
    pub fertilizer_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseasePrediction {
    /// Raw class label, e.g. `Tomato___Early_blight`
    pub disease: String,
    /// Display form, e.g. `Tomato - Early blight`
    pub display_name: String,
    pub disease_index: i64,
}

/// Result of any pipeline; serializes as the flat per-domain mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Prediction {
    Crop(CropPrediction),
    Fertilizer(FertilizerPrediction),
    Disease(DiseasePrediction),
}

/// Normalized input for one domain.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionRequest {
    Crop(CropFeatures),
    Fertilizer(FertilizerFeatures),
    Disease(Vec<u8>),
}

impl PredictionRequest {
    /// Validate a crop payload into a request.
    pub fn crop(payload: &Value) -> Result<Self> {
        Ok(PredictionRequest::Crop(validate_crop_input(payload)?))
    }

    /// Validate and normalize a fertilizer payload into a request.
    pub fn fertilizer(payload: &Value) -> Result<Self> {
        Ok(PredictionRequest::Fertilizer(validate_fertilizer_input(payload)?))
    }

    pub fn domain(&self) -> Domain {
        match self {
            PredictionRequest::Crop(_) => Domain::Crop,
            PredictionRequest::Fertilizer(_) => Domain::Fertilizer,
            PredictionRequest::Disease(_) => Domain::Disease,
        }
    }
}

/// Index of the highest score; the first one wins ties. NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Dispatches normalized requests to the pipeline for their domain.
#[derive(Clone)]
pub struct Predictor {
    registry: Arc<ModelRegistry>,
}

impl Predictor {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run the pipeline matching the request's domain, recording metrics.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        let domain = request.domain();
        let timer = Timer::new();

        let result = match request {
            PredictionRequest::Crop(features) => self.predict_crop(features).map(Prediction::Crop),
            PredictionRequest::Fertilizer(features) => {
                self.predict_fertilizer(features).map(Prediction::Fertilizer)
            }
            PredictionRequest::Disease(image) => {
                self.predict_disease(image).map(Prediction::Disease)
            }
        };

        match &result {
            Ok(prediction) => {
                timer.observe_domain(domain.as_str());
                PREDICTIONS_TOTAL.with_label_values(&[domain.as_str()]).inc();
                debug!(
                    domain = %domain,
                    latency_ms = timer.elapsed_ms(),
                    prediction = ?prediction,
                    "Prediction completed"
                );
            }
            Err(e) => {
                PREDICTION_ERRORS
                    .with_label_values(&[domain.as_str(), e.kind()])
                    .inc();
                if e.is_artifact_failure() {
                    error!(domain = %domain, error = %e, "Model artifacts unavailable");
                } else {
                    warn!(domain = %domain, error = %e, "Prediction failed");
                }
            }
        }

        result
    }

    pub fn predict_crop(&self, features: &CropFeatures) -> Result<CropPrediction> {
        let model = self.registry.crop()?;
        let crop_index = model.predict(&features.to_vector())?;

        Ok(CropPrediction {
            crop: CROPS.label_or_placeholder(crop_index),
            crop_index,
        })
    }

    pub fn predict_fertilizer(&self, features: &FertilizerFeatures) -> Result<FertilizerPrediction> {
        let model = self.registry.fertilizer()?;
        let scaled = model.scaler.transform(&features.to_vector())?;
        let fertilizer_index = model.classifier.predict(&scaled)?;

        Ok(FertilizerPrediction {
            fertilizer: FERTILIZERS.label_or_placeholder(fertilizer_index),
            fertilizer_index,
        })
    }

    pub fn predict_disease(&self, image: &[u8]) -> Result<DiseasePrediction> {
        let model = self.registry.disease()?;
        let input = model.transform.apply(image)?;
        let scores = model.classifier.scores(input)?;
        let disease_index = argmax(&scores)
            .ok_or_else(|| PredictError::Inference("classifier returned no scores".to_string()))?
            as i64;

        let disease = DISEASES.label_or_placeholder(disease_index);
        Ok(DiseasePrediction {
            display_name: display_label(&disease),
            disease,
            disease_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[f32::NAN, -3.0, -1.0]), Some(2));
        assert_eq!(argmax(&[]), None);
        assert_eq!(argmax(&[f32::NAN]), None);
    }

    #[test]
    fn test_prediction_serializes_flat() {
        let prediction = Prediction::Disease(DiseasePrediction {
            disease: "Tomato___Early_blight".to_string(),
            display_name: "Tomato - Early blight".to_string(),
            disease_index: 29,
        });
        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["display_name"], "Tomato - Early blight");
        assert_eq!(json["disease_index"], 29);

        let json = serde_json::to_value(Prediction::Fertilizer(FertilizerPrediction {
            fertilizer: "Urea".to_string(),
            fertilizer_index: 6,
        }))
        .unwrap();
        assert_eq!(json, serde_json::json!({"fertilizer": "Urea", "fertilizer_index": 6}));
    }

    #[test]
    fn test_request_domain() {
        let request = PredictionRequest::Disease(vec![1, 2, 3]);
        assert_eq!(request.domain(), Domain::Disease);
        assert!(PredictionRequest::crop(&serde_json::json!({})).is_err());
    }
}
