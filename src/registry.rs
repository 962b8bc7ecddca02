//! Model Registry
//!
//! Owns one load-once slot per prediction domain. The first request for a
//! domain reads its artifacts from disk; every later request gets the same
//! `Arc` back without touching storage. Slots are `OnceCell`s, so
//! concurrent first callers block on a single load and never observe a
//! half-built handle. A failed load leaves the slot empty and the next call
//! tries again.
//!
//! Artifacts are ONNX graphs plus JSON sidecars. Neither format runs code
//! on load; the disease manifest names its architecture, which must be one
//! this build knows about before the graph is handed to the runtime.

use ndarray::Array4;
use once_cell::sync::OnceCell;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{PredictError, Result};
use crate::mappings::DISEASES;
use crate::normalize::FERTILIZER_FIELDS;
use crate::preprocess::{ChannelNormalization, ImageTransform, StandardScaler};

/// Disease classifier architectures this build can serve.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["ResNet9"];

/// Disease manifest format understood by the loader.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One of the three prediction tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Crop,
    Fertilizer,
    Disease,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Crop, Domain::Fertilizer, Domain::Disease];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Crop => "crop",
            Domain::Fertilizer => "fertilizer",
            Domain::Disease => "disease",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier over a flat feature vector, returning the predicted code.
pub trait TabularClassifier: Send + Sync {
    fn predict(&self, features: &[f32]) -> Result<i64>;
}

/// Classifier over a `[1, 3, H, W]` image tensor, returning one score per
/// class.
pub trait ImageClassifier: Send + Sync {
    fn scores(&self, input: Array4<f32>) -> Result<Vec<f32>>;
}

/// Fertilizer classifier and the scaler it was trained behind.
pub struct FertilizerModel {
    pub classifier: Box<dyn TabularClassifier>,
    pub scaler: StandardScaler,
}

/// Disease classifier and its fixed input transform.
pub struct DiseaseModel {
    pub classifier: Box<dyn ImageClassifier>,
    pub transform: ImageTransform,
    pub architecture: String,
}

/// A loaded handle for any domain.
#[derive(Clone)]
pub enum ModelHandle {
    Crop(Arc<dyn TabularClassifier>),
    Fertilizer(Arc<FertilizerModel>),
    Disease(Arc<DiseaseModel>),
}

impl ModelHandle {
    pub fn domain(&self) -> Domain {
        match self {
            ModelHandle::Crop(_) => Domain::Crop,
            ModelHandle::Fertilizer(_) => Domain::Fertilizer,
            ModelHandle::Disease(_) => Domain::Disease,
        }
    }
}

/// Reads artifacts from storage. Called at most once per domain by the
/// registry unless a load fails.
pub trait ArtifactLoader: Send + Sync {
    fn load_crop(&self) -> Result<Box<dyn TabularClassifier>>;
    fn load_fertilizer(&self) -> Result<FertilizerModel>;
    fn load_disease(&self) -> Result<DiseaseModel>;
}

pub struct ModelRegistry {
    loader: Box<dyn ArtifactLoader>,
    crop: OnceCell<Arc<dyn TabularClassifier>>,
    fertilizer: OnceCell<Arc<FertilizerModel>>,
    disease: OnceCell<Arc<DiseaseModel>>,
}

impl ModelRegistry {
    pub fn new(loader: impl ArtifactLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            crop: OnceCell::new(),
            fertilizer: OnceCell::new(),
            disease: OnceCell::new(),
        }
    }

    /// Registry backed by ONNX Runtime, reading the configured paths.
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(OnnxArtifactLoader::new(config.clone()))
    }

    pub fn crop(&self) -> Result<Arc<dyn TabularClassifier>> {
        self.crop
            .get_or_try_init(|| {
                timed_load(Domain::Crop, || self.loader.load_crop().map(Arc::from))
            })
            .cloned()
    }

    pub fn fertilizer(&self) -> Result<Arc<FertilizerModel>> {
        self.fertilizer
            .get_or_try_init(|| {
                timed_load(Domain::Fertilizer, || {
                    self.loader.load_fertilizer().map(Arc::new)
                })
            })
            .cloned()
    }

    pub fn disease(&self) -> Result<Arc<DiseaseModel>> {
        self.disease
            .get_or_try_init(|| {
                timed_load(Domain::Disease, || {
                    let model = self.loader.load_disease()?;
                    info!(
                        architecture = %model.architecture,
                        input_size = model.transform.size,
                        "Disease classifier ready"
                    );
                    Ok(Arc::new(model))
                })
            })
            .cloned()
    }

    /// Load the domain's artifacts if needed and return its handle.
    pub fn ensure_loaded(&self, domain: Domain) -> Result<ModelHandle> {
        match domain {
            Domain::Crop => self.crop().map(ModelHandle::Crop),
            Domain::Fertilizer => self.fertilizer().map(ModelHandle::Fertilizer),
            Domain::Disease => self.disease().map(ModelHandle::Disease),
        }
    }

    pub fn is_loaded(&self, domain: Domain) -> bool {
        match domain {
            Domain::Crop => self.crop.get().is_some(),
            Domain::Fertilizer => self.fertilizer.get().is_some(),
            Domain::Disease => self.disease.get().is_some(),
        }
    }

    /// Load every domain, logging failures instead of stopping at the first.
    pub fn preload_all(&self) -> Vec<(Domain, Result<()>)> {
        Domain::ALL
            .iter()
            .map(|&domain| {
                let result = self.ensure_loaded(domain).map(|_| ());
                if let Err(e) = &result {
                    warn!(domain = %domain, error = %e, "Model preload failed");
                }
                (domain, result)
            })
            .collect()
    }
}

fn timed_load<T>(domain: Domain, load: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    debug!(domain = %domain, "Loading model artifacts");
    let loaded = load()?;
    let latency_ms = start.elapsed().as_millis() as u64;
    crate::metrics::MODEL_LOADS
        .with_label_values(&[domain.as_str()])
        .inc();
    info!(domain = %domain, latency_ms = latency_ms, "✓ Model loaded");
    Ok(loaded)
}

// ============================================================================
// ONNX Runtime loader
// ============================================================================

/// Sidecar describing the disease classifier graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseManifest {
    pub architecture: String,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub num_classes: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default)]
    pub normalize: Option<ChannelNormalization>,
}

fn default_format_version() -> u32 {
    MANIFEST_FORMAT_VERSION
}

fn default_input_size() -> u32 {
    256
}

impl DiseaseManifest {
    /// Refuse graphs whose architecture or format this build does not know.
    pub fn check(&self) -> Result<()> {
        if !SUPPORTED_ARCHITECTURES.contains(&self.architecture.as_str()) {
            return Err(PredictError::Deserialization(format!(
                "Unregistered model architecture '{}' (known: {})",
                self.architecture,
                SUPPORTED_ARCHITECTURES.join(", ")
            )));
        }
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(PredictError::Deserialization(format!(
                "Unsupported manifest format version {} (expected {})",
                self.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        if self.input_size == 0 {
            return Err(PredictError::Deserialization(
                "Manifest input_size must be positive".to_string(),
            ));
        }
        if let Some(norm) = &self.normalize {
            let unusable = norm
                .std
                .iter()
                .chain(&norm.mean)
                .any(|v| !v.is_finite())
                || norm.std.iter().any(|s| *s == 0.0);
            if unusable {
                return Err(PredictError::Deserialization(format!(
                    "Manifest normalization has unusable mean/std: {:?} / {:?}",
                    norm.mean, norm.std
                )));
            }
        }
        if self.num_classes != DISEASES.len() {
            warn!(
                num_classes = self.num_classes,
                known_labels = DISEASES.len(),
                "Disease model class count differs from label table; unknown codes will get placeholders"
            );
        }
        Ok(())
    }

    pub fn transform(&self) -> ImageTransform {
        ImageTransform {
            size: self.input_size,
            normalization: self.normalize,
        }
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PredictError::ModelNotFound(path.to_path_buf()))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    ensure_exists(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| {
        PredictError::Deserialization(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        PredictError::Deserialization(format!("Failed to parse {}: {}", path.display(), e))
    })
}

fn open_session(path: &Path) -> Result<Session> {
    ensure_exists(path)?;
    Session::builder()
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| {
            PredictError::Deserialization(format!(
                "Failed to load ONNX model {}: {}",
                path.display(),
                e
            ))
        })
}

fn inference_error(e: ort::Error) -> PredictError {
    PredictError::Inference(e.to_string())
}

/// Tabular classifier exported to ONNX (e.g. via skl2onnx). The first
/// output is the predicted label tensor.
pub struct OnnxTabularClassifier {
    session: Mutex<Session>,
}

impl TabularClassifier for OnnxTabularClassifier {
    fn predict(&self, features: &[f32]) -> Result<i64> {
        let input = Tensor::from_array(([1usize, features.len()], features.to_vec()))
            .map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PredictError::Inference("model session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input]).map_err(inference_error)?;

        let label = match outputs[0].try_extract_tensor::<i64>() {
            Ok((_, labels)) => labels.first().copied(),
            // Regressors and some converters emit float labels
            Err(_) => {
                let (_, labels) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .map_err(inference_error)?;
                labels.first().map(|v| v.round() as i64)
            }
        };

        label.ok_or_else(|| PredictError::Inference("classifier returned no label".to_string()))
    }
}

/// Image classifier exported to ONNX. The first output holds class scores.
pub struct OnnxImageClassifier {
    session: Mutex<Session>,
}

impl ImageClassifier for OnnxImageClassifier {
    fn scores(&self, input: Array4<f32>) -> Result<Vec<f32>> {
        let tensor = Tensor::from_array(input).map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PredictError::Inference("model session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![tensor]).map_err(inference_error)?;
        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        Ok(scores.to_vec())
    }
}

/// Loads ONNX graphs and JSON sidecars from the configured paths.
pub struct OnnxArtifactLoader {
    config: ModelConfig,
}

impl OnnxArtifactLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

impl ArtifactLoader for OnnxArtifactLoader {
    fn load_crop(&self) -> Result<Box<dyn TabularClassifier>> {
        let path = &self.config.crop_model;
        info!(path = %path.display(), "Loading crop recommendation model");
        let session = open_session(path)?;
        Ok(Box::new(OnnxTabularClassifier {
            session: Mutex::new(session),
        }))
    }

    fn load_fertilizer(&self) -> Result<FertilizerModel> {
        let model_path = &self.config.fertilizer_model;
        let scaler_path = &self.config.fertilizer_scaler;
        info!(
            model = %model_path.display(),
            scaler = %scaler_path.display(),
            "Loading fertilizer model and scaler"
        );

        // Both files must be present before either is used
        ensure_exists(model_path)?;
        let scaler: StandardScaler = read_json(scaler_path)?;
        scaler.check(FERTILIZER_FIELDS.len())?;
        let session = open_session(model_path)?;

        Ok(FertilizerModel {
            classifier: Box::new(OnnxTabularClassifier {
                session: Mutex::new(session),
            }),
            scaler,
        })
    }

    fn load_disease(&self) -> Result<DiseaseModel> {
        let manifest_path = &self.config.disease_manifest;
        let model_path = &self.config.disease_model;
        info!(
            model = %model_path.display(),
            manifest = %manifest_path.display(),
            "Loading plant disease model"
        );

        let manifest: DiseaseManifest = read_json(manifest_path)?;
        manifest.check()?;
        let session = open_session(model_path)?;

        Ok(DiseaseModel {
            classifier: Box::new(OnnxImageClassifier {
                session: Mutex::new(session),
            }),
            transform: manifest.transform(),
            architecture: manifest.architecture,
        })
    }
}
