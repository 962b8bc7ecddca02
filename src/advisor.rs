//! Remediation Advisor
//!
//! Turns a disease label into treatment advice. Healthy classes short-circuit
//! to an empty solution; everything else goes to a generative-text service
//! with a fixed agricultural prompt. Failures come back as classified
//! `RemediationError`s and are never retried here.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RemediationConfig;
use crate::error::{RemediationError, UpstreamError};
use crate::mappings::{display_label, is_healthy_label};
use crate::metrics::REMEDIATION_REQUESTS;

/// A service that completes a text prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, api_key: &str) -> Result<String, UpstreamError>;
}

/// Prompt sent for a diseased plant, with the display name filled in.
pub fn build_prompt(disease_display_name: &str) -> String {
    format!(
        "You are an expert agricultural advisor. A farmer's plant has been diagnosed with: {disease}.\n\
         \n\
         Provide a concise, practical treatment plan with exactly two sections:\n\
         \n\
         **Immediate Actions:**\n\
         - 3-4 bullet points the farmer should do right now to control the disease\n\
         \n\
         **Prevention:**\n\
         - 3-4 bullet points to keep the disease from coming back\n\
         \n\
         Keep each bullet under 25 words. Prefer affordable, widely available treatments \
         and mention organic options where they exist.",
        disease = disease_display_name
    )
}

/// Successful advisor outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    /// Display form of the disease label
    pub disease: String,
    /// Generated advice; empty for healthy plants
    pub solution: String,
}

/// Wire form of an advisor outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RemediationReply {
    Success {
        success: bool,
        solution: String,
        disease: String,
    },
    Failure {
        success: bool,
        error: String,
        kind: &'static str,
    },
}

impl From<Result<Remediation, RemediationError>> for RemediationReply {
    fn from(result: Result<Remediation, RemediationError>) -> Self {
        match result {
            Ok(remediation) => RemediationReply::Success {
                success: true,
                solution: remediation.solution,
                disease: remediation.disease,
            },
            Err(e) => RemediationReply::Failure {
                success: false,
                error: e.to_string(),
                kind: e.kind(),
            },
        }
    }
}

pub struct RemediationAdvisor {
    generator: Arc<dyn TextGenerator>,
    default_api_key: Option<String>,
}

impl RemediationAdvisor {
    pub fn new(generator: Arc<dyn TextGenerator>, default_api_key: Option<String>) -> Self {
        Self {
            generator,
            default_api_key: default_api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Advisor backed by the Gemini REST API.
    pub fn from_config(config: &RemediationConfig) -> Result<Self, UpstreamError> {
        let client = GeminiClient::new(
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self::new(Arc::new(client), config.api_key.clone()))
    }

    /// Request-scoped credential wins over the process default. Blank
    /// values count as absent.
    pub fn resolve_api_key<'a>(&'a self, caller_api_key: Option<&'a str>) -> Option<&'a str> {
        caller_api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or(self.default_api_key.as_deref())
    }

    pub async fn advise(
        &self,
        disease_label: &str,
        caller_api_key: Option<&str>,
    ) -> Result<Remediation, RemediationError> {
        let result = self.advise_inner(disease_label, caller_api_key).await;
        let outcome = match &result {
            Ok(r) if r.solution.is_empty() => "healthy",
            Ok(_) => "generated",
            Err(e) => e.kind(),
        };
        REMEDIATION_REQUESTS.with_label_values(&[outcome]).inc();
        result
    }

    async fn advise_inner(
        &self,
        disease_label: &str,
        caller_api_key: Option<&str>,
    ) -> Result<Remediation, RemediationError> {
        let disease = display_label(disease_label);

        if is_healthy_label(disease_label) {
            debug!(disease = %disease, "Healthy class, no remediation needed");
            return Ok(Remediation {
                disease,
                solution: String::new(),
            });
        }

        let api_key = self
            .resolve_api_key(caller_api_key)
            .ok_or(RemediationError::MissingCredential)?;

        let prompt = build_prompt(&disease);
        match self.generator.generate(&prompt, api_key).await {
            Ok(solution) => {
                info!(disease = %disease, chars = solution.len(), "Remediation generated");
                Ok(Remediation { disease, solution })
            }
            Err(e) => {
                warn!(
                    disease = %disease,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Remediation generation failed"
                );
                Err(e.into())
            }
        }
    }
}

// ============================================================================
// Gemini client
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Map a non-success HTTP response to an error kind.
    fn classify_error(status: u16, body: &str) -> UpstreamError {
        let (message, api_status) = match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => (parsed.error.message, parsed.error.status),
            Err(_) => (body.to_string(), String::new()),
        };

        if status == 401
            || status == 403
            || api_status == "UNAUTHENTICATED"
            || api_status == "PERMISSION_DENIED"
            || message.contains("API key not valid")
        {
            UpstreamError::Authentication(message)
        } else if status == 429 || api_status == "RESOURCE_EXHAUSTED" {
            UpstreamError::RateLimited(message)
        } else {
            UpstreamError::Api { status, message }
        }
    }

    fn extract_text(response: GenerateResponse) -> Result<String, UpstreamError> {
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            Err(UpstreamError::MalformedResponse(
                "response contained no text".to_string(),
            ))
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, api_key: &str) -> Result<String, UpstreamError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status.as_u16(), &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::MalformedResponse(e.to_string()))?;

        Self::extract_text(parsed)
    }
}
