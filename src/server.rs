//! HTTP boundary: JSON prediction routes, image upload, remediation and
//! metrics.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::advisor::{RemediationAdvisor, RemediationReply};
use crate::error::{PredictError, ValidationError};
use crate::pipeline::{PredictionRequest, Predictor};

/// Header consulted when the request body carries no `api_key`.
pub const API_KEY_HEADER: &str = "X-Gemini-API-Key";

/// Uploads above this size are rejected before decoding.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Predictor,
    pub advisor: Arc<RemediationAdvisor>,
}

/// Failure body returned by every route: `{success: false, error}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    success: bool,
    error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            status,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }
}

impl From<PredictError> for ApiError {
    fn from(e: PredictError) -> Self {
        let status =
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        PredictError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

type ApiResult = std::result::Result<Json<Value>, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/predict_crop", post(predict_crop_handler))
        .route("/predict_fertilizer", post(predict_fertilizer_handler))
        .route("/predict_disease", post(predict_disease_handler))
        .route("/get_disease_solution", post(disease_solution_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "running",
        "message": "ML Prediction API is running"
    }))
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> String {
    crate::metrics::export_metrics()
}

fn parse_object(body: &Bytes) -> std::result::Result<Value, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(ValidationError::NotAnObject.into()),
    }
}

/// Run a prediction off the async runtime and wrap the result as
/// `{success: true, ...result}`.
async fn run_prediction(predictor: Predictor, request: PredictionRequest) -> ApiResult {
    let prediction = tokio::task::spawn_blocking(move || predictor.predict(&request))
        .await
        .map_err(|e| PredictError::Inference(format!("prediction task failed: {}", e)))??;

    let mut body = serde_json::to_value(&prediction)
        .map_err(|e| PredictError::Inference(format!("unserializable result: {}", e)))?;
    if let Value::Object(map) = &mut body {
        map.insert("success".to_string(), Value::Bool(true));
    }
    Ok(Json(body))
}

fn rejected(domain: &str, e: PredictError) -> ApiError {
    debug!(domain = domain, error = %e, "Rejected invalid input");
    e.into()
}

async fn predict_crop_handler(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let payload = parse_object(&body)?;
    let request = PredictionRequest::crop(&payload).map_err(|e| rejected("crop", e))?;
    run_prediction(state.predictor, request).await
}

async fn predict_fertilizer_handler(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let payload = parse_object(&body)?;
    let request = PredictionRequest::fertilizer(&payload).map_err(|e| rejected("fertilizer", e))?;
    run_prediction(state.predictor, request).await
}

async fn predict_disease_handler(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut multipart =
        multipart.map_err(|_| ApiError::bad_request("No image file provided"))?;

    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed upload: {}", e)))?;
        image = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) = image.ok_or_else(|| ApiError::bad_request("No image file provided"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("No image file selected"));
    }

    debug!(file_name = %file_name, size = bytes.len(), "Received image upload");
    run_prediction(state.predictor, PredictionRequest::Disease(bytes.to_vec())).await
}

#[derive(Debug, Deserialize)]
struct SolutionRequest {
    disease_name: Option<String>,
    api_key: Option<String>,
}

async fn disease_solution_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<RemediationReply>, ApiError> {
    let payload = parse_object(&body)?;
    let request: SolutionRequest = serde_json::from_value(payload)
        .map_err(|_| ApiError::bad_request("disease_name is required"))?;

    let disease_name = request
        .disease_name
        .ok_or_else(|| ApiError::bad_request("disease_name is required"))?;

    let api_key = request
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        });

    let result = state.advisor.advise(&disease_name, api_key.as_deref()).await;
    Ok(Json(result.into()))
}
