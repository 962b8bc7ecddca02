use agro_inference_node::{
    config::Config, metrics, server, ModelRegistry, Predictor, RemediationAdvisor,
};
use anyhow::Result;
use std::sync::Arc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // ONNX Runtime logs every graph optimization pass at info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ort=warn")),
        )
        .init();

    tracing::info!("Starting agronomic inference node...");

    metrics::init_metrics();

    let config = Config::load()?;
    tracing::info!(
        model_dir = %config.model_config.model_dir.display(),
        gemini_model = %config.remediation_config.model,
        gemini_key_configured = config.remediation_config.api_key.is_some(),
        "Configuration loaded"
    );

    let registry = Arc::new(ModelRegistry::from_config(&config.model_config));

    if config.preload_models {
        tracing::info!("🔧 Preloading model artifacts");
        let preload = registry.clone();
        let results = tokio::task::spawn_blocking(move || preload.preload_all()).await?;
        let loaded = results.iter().filter(|(_, r)| r.is_ok()).count();
        tracing::info!("✓ Preloaded {}/{} models", loaded, results.len());
    } else {
        tracing::info!("Models will load on first request");
    }

    let advisor = RemediationAdvisor::from_config(&config.remediation_config)
        .map_err(|e| anyhow::anyhow!("Failed to build remediation client: {}", e))?;

    let state = server::AppState {
        predictor: Predictor::new(registry),
        advisor: Arc::new(advisor),
    };
    let app = server::create_router(state);

    tracing::info!(
        "🌐 Prediction API listening on http://{}:{}",
        config.api_host,
        config.api_port
    );
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.api_host, config.api_port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
