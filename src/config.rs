use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub model_config: ModelConfig,
    pub remediation_config: RemediationConfig,
    /// Load every artifact at startup instead of on first request
    pub preload_models: bool,
}

/// Artifact locations, one entry per file the registry reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub crop_model: PathBuf,
    pub fertilizer_model: PathBuf,
    pub fertilizer_scaler: PathBuf,
    pub disease_model: PathBuf,
    pub disease_manifest: PathBuf,
}

impl ModelConfig {
    /// Default file names under a single model directory.
    pub fn in_dir(model_dir: impl Into<PathBuf>) -> Self {
        let model_dir = model_dir.into();
        Self {
            crop_model: model_dir.join("crop_prediction_model.onnx"),
            fertilizer_model: model_dir.join("fertilizer_recommendation_model.onnx"),
            fertilizer_scaler: model_dir.join("fertilizer_recommendation_scaler.json"),
            disease_model: model_dir.join("plant_disease_model.onnx"),
            disease_manifest: model_dir.join("plant_disease_model.json"),
            model_dir,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Process-wide default credential, used when a request carries none
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

fn path_var(name: &str, default: PathBuf) -> PathBuf {
    env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .unwrap_or(5000);

        let preload_models = env::var("PRELOAD_MODELS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Model artifacts
        let defaults =
            ModelConfig::in_dir(env::var("MODEL_DIR").unwrap_or_else(|_| "./models".to_string()));
        let model_config = ModelConfig {
            crop_model: path_var("CROP_MODEL_PATH", defaults.crop_model.clone()),
            fertilizer_model: path_var("FERTILIZER_MODEL_PATH", defaults.fertilizer_model.clone()),
            fertilizer_scaler: path_var(
                "FERTILIZER_SCALER_PATH",
                defaults.fertilizer_scaler.clone(),
            ),
            disease_model: path_var("DISEASE_MODEL_PATH", defaults.disease_model.clone()),
            disease_manifest: path_var("DISEASE_MANIFEST_PATH", defaults.disease_manifest.clone()),
            model_dir: defaults.model_dir,
        };

        // Generative-text service
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        let base_url =
            env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());

        let timeout_secs = env::var("GEMINI_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        Ok(Self {
            api_host,
            api_port,
            model_config,
            remediation_config: RemediationConfig {
                api_key,
                model,
                base_url,
                timeout_secs,
            },
            preload_models,
        })
    }
}
