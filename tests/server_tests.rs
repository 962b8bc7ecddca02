use agro_inference_node::advisor::{RemediationAdvisor, TextGenerator};
use agro_inference_node::error::{PredictError, Result, UpstreamError};
use agro_inference_node::preprocess::{ImageTransform, StandardScaler};
use agro_inference_node::registry::{
    ArtifactLoader, DiseaseModel, FertilizerModel, ImageClassifier, ModelRegistry,
    TabularClassifier,
};
use agro_inference_node::{create_router, metrics, AppState, Predictor};
use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use ndarray::Array4;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

struct Const(i64);

impl TabularClassifier for Const {
    fn predict(&self, _features: &[f32]) -> Result<i64> {
        Ok(self.0)
    }
}

struct LateBlight;

impl ImageClassifier for LateBlight {
    fn scores(&self, _input: Array4<f32>) -> Result<Vec<f32>> {
        let mut scores = vec![0.0; 38];
        scores[21] = 1.0;
        Ok(scores)
    }
}

struct StubLoader {
    available: bool,
}

impl ArtifactLoader for StubLoader {
    fn load_crop(&self) -> Result<Box<dyn TabularClassifier>> {
        if !self.available {
            return Err(PredictError::ModelNotFound(
                "models/crop_prediction_model.onnx".into(),
            ));
        }
        Ok(Box::new(Const(11)))
    }

    fn load_fertilizer(&self) -> Result<FertilizerModel> {
        Ok(FertilizerModel {
            classifier: Box::new(Const(5)),
            scaler: StandardScaler {
                mean: vec![0.0; 8],
                scale: vec![1.0; 8],
            },
        })
    }

    fn load_disease(&self) -> Result<DiseaseModel> {
        Ok(DiseaseModel {
            classifier: Box::new(LateBlight),
            transform: ImageTransform {
                size: 16,
                normalization: None,
            },
            architecture: "ResNet9".to_string(),
        })
    }
}

#[derive(Default)]
struct EchoGenerator {
    last_key: Mutex<Option<String>>,
}

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str, api_key: &str) -> std::result::Result<String, UpstreamError> {
        *self.last_key.lock().unwrap() = Some(api_key.to_string());
        if api_key == "bad-key" {
            return Err(UpstreamError::Authentication("API key not valid".to_string()));
        }
        Ok(format!("advice ({} chars of prompt)", prompt.len()))
    }
}

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    generator: Arc<EchoGenerator>,
}

async fn start_server(models_available: bool) -> TestServer {
    metrics::init_metrics();

    let registry = ModelRegistry::new(StubLoader {
        available: models_available,
    });
    let generator = Arc::new(EchoGenerator::default());
    let state = AppState {
        predictor: Predictor::new(Arc::new(registry)),
        advisor: Arc::new(RemediationAdvisor::new(generator.clone(), None)),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
        generator,
    }
}

impl TestServer {
    async fn post_json(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post_form(&self, path: &str, form: Form) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

fn png() -> Vec<u8> {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(24, 24, Rgb([30, 140, 60]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn crop_body() -> Value {
    json!({"n": 90, "p": 42, "k": 43, "temp": 20.8, "humidity": 82, "ph": 6.5, "rainfall": 202.9})
}

#[tokio::test]
async fn test_health_route() {
    let server = start_server(true).await;
    let body: Value = server
        .client
        .get(format!("{}/", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"status": "running", "message": "ML Prediction API is running"})
    );
}

#[tokio::test]
async fn test_predict_crop_success_and_validation() {
    let server = start_server(true).await;

    let (status, body) = server.post_json("/predict_crop", crop_body()).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"success": true, "crop": "maize", "crop_index": 11}));

    let mut missing = crop_body();
    missing.as_object_mut().unwrap().remove("ph");
    let (status, body) = server.post_json("/predict_crop", missing).await;
    assert_eq!(status, 400);
    assert_eq!(
        body,
        json!({"success": false, "error": "Missing required field: ph"})
    );
}

#[tokio::test]
async fn test_missing_model_is_service_unavailable() {
    let server = start_server(false).await;
    let (status, body) = server.post_json("/predict_crop", crop_body()).await;
    assert_eq!(status, 503);
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("crop_prediction_model.onnx"));
}

#[tokio::test]
async fn test_predict_fertilizer_routes() {
    let server = start_server(true).await;
    let body = json!({
        "temp": 26, "humidity": 52, "moisture": 38, "soil_type": "Sandy", "crop_type": "Maize",
        "nitrogen": 37, "potassium": 0, "phosphorus": 0
    });

    let (status, response) = server.post_json("/predict_fertilizer", body.clone()).await;
    assert_eq!(status, 200);
    assert_eq!(response["fertilizer"], "DAP");
    assert_eq!(response["fertilizer_index"], 5);

    let mut bad = body;
    bad["nitrogen"] = json!(43);
    let (status, response) = server.post_json("/predict_fertilizer", bad).await;
    assert_eq!(status, 400);
    assert_eq!(response["error"], "nitrogen must be between 4 and 42");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let server = start_server(true).await;
    let response = server
        .client
        .post(format!("{}/predict_crop", server.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_predict_disease_upload() {
    let server = start_server(true).await;

    let part = Part::bytes(png())
        .file_name("leaf.png")
        .mime_str("image/png")
        .unwrap();
    let (status, body) = server
        .post_form("/predict_disease", Form::new().part("image", part))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["disease"], "Potato___Late_blight");
    assert_eq!(body["display_name"], "Potato - Late blight");
    assert_eq!(body["disease_index"], 21);
}

#[tokio::test]
async fn test_predict_disease_upload_errors() {
    let server = start_server(true).await;

    let (status, body) = server
        .post_form("/predict_disease", Form::new().text("note", "no image here"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No image file provided");

    let empty = Part::bytes(Vec::new()).file_name("");
    let (status, body) = server
        .post_form("/predict_disease", Form::new().part("image", empty))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No image file selected");

    let garbage = Part::bytes(b"not an image".to_vec()).file_name("leaf.jpg");
    let (status, body) = server
        .post_form("/predict_disease", Form::new().part("image", garbage))
        .await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image"));

    let (status, body) = server.post_json("/predict_disease", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No image file provided");
}

#[tokio::test]
async fn test_disease_solution_route() {
    let server = start_server(true).await;

    let (status, body) = server.post_json("/get_disease_solution", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "disease_name is required");

    let (status, body) = server
        .post_json(
            "/get_disease_solution",
            json!({"disease_name": "Tomato___healthy"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({"success": true, "solution": "", "disease": "Tomato - healthy"})
    );

    let (status, body) = server
        .post_json(
            "/get_disease_solution",
            json!({"disease_name": "Tomato___Late_blight"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "missing_credential");

    let (status, body) = server
        .post_json(
            "/get_disease_solution",
            json!({"disease_name": "Tomato___Late_blight", "api_key": "body-key"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["disease"], "Tomato - Late blight");
    assert_eq!(
        server.generator.last_key.lock().unwrap().as_deref(),
        Some("body-key")
    );
}

#[tokio::test]
async fn test_disease_solution_header_credential() {
    let server = start_server(true).await;

    let response = server
        .client
        .post(format!("{}/get_disease_solution", server.base_url))
        .header("X-Gemini-API-Key", "header-key")
        .json(&json!({"disease_name": "Apple___Black_rot"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(
        server.generator.last_key.lock().unwrap().as_deref(),
        Some("header-key")
    );

    let (status, body) = server
        .post_json(
            "/get_disease_solution",
            json!({"disease_name": "Apple___Black_rot", "api_key": "bad-key"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "authentication");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error generating solution: "));
}

#[tokio::test]
async fn test_metrics_route() {
    let server = start_server(true).await;
    server.post_json("/predict_crop", crop_body()).await;

    let text = server
        .client
        .get(format!("{}/metrics", server.base_url))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("predictions_total"));
    assert!(text.contains("model_loads_total"));
}
