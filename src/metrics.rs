use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Once;
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Prediction metrics
    pub static ref PREDICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("predictions_total", "Total number of successful predictions by domain"),
        &["domain"]
    ).unwrap();

    pub static ref PREDICTION_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed predictions by domain and error kind"),
        &["domain", "kind"]
    ).unwrap();

    // Latency metrics (in seconds)
    pub static ref INFERENCE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "inference_duration_seconds",
            "Model inference latency in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["domain"]
    ).unwrap();

    // Model lifecycle
    pub static ref MODEL_LOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("model_loads_total", "Total number of model artifact loads by domain"),
        &["domain"]
    ).unwrap();

    // Remediation advisor
    pub static ref REMEDIATION_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("remediation_requests_total", "Total remediation requests by outcome"),
        &["outcome"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Initialize metrics registry. Safe to call more than once.
pub fn init_metrics() {
    INIT.call_once(|| {
        REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone())).unwrap();
        REGISTRY.register(Box::new(PREDICTION_ERRORS.clone())).unwrap();
        REGISTRY.register(Box::new(INFERENCE_LATENCY.clone())).unwrap();
        REGISTRY.register(Box::new(MODEL_LOADS.clone())).unwrap();
        REGISTRY.register(Box::new(REMEDIATION_REQUESTS.clone())).unwrap();

        tracing::info!("Metrics registry initialized with {} collectors", REGISTRY.gather().len());
    });
}

/// Helper struct for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_domain(&self, domain: &str) {
        INFERENCE_LATENCY
            .with_label_values(&[domain])
            .observe(self.start.elapsed().as_secs_f64());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
