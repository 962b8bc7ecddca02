pub mod advisor;
pub mod config;
pub mod error;
pub mod mappings;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod server;

// Re-export commonly used types for easier testing
pub use crate::advisor::{GeminiClient, Remediation, RemediationAdvisor, RemediationReply, TextGenerator};
pub use crate::config::{Config, ModelConfig, RemediationConfig};
pub use crate::error::{PredictError, RemediationError, UpstreamError, ValidationError};
pub use crate::normalize::{validate_crop_input, validate_fertilizer_input, CategoricalInput, CropFeatures, FertilizerFeatures};
pub use crate::pipeline::{CropPrediction, DiseasePrediction, FertilizerPrediction, Prediction, PredictionRequest, Predictor};
pub use crate::registry::{ArtifactLoader, Domain, ImageClassifier, ModelRegistry, TabularClassifier};
pub use crate::server::{create_router, AppState};
