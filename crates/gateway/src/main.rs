//! QueryBridge HTTP Gateway
//!
//! The single entry point for external requests:
//! - Connect/discover and refresh database schemas
//! - Upload documents for asynchronous ingestion, poll job status
//! - Run natural-language queries and read per-connection history
//! - Observability (structured logging, Prometheus metrics)

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use querybridge_common::{
    cache::ResponseCache, config::AppConfig, embeddings::create_embedder, metrics, VERSION,
};
use querybridge_engine::{create_translator, EngineRegistry};
use querybridge_ingestion::{ExtractorRegistry, IngestionPipeline, JobTracker};
use querybridge_search::VectorStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<EngineRegistry>,
    pub pipeline: IngestionPipeline,
    pub tracker: Arc<JobTracker>,
    pub cache: Arc<ResponseCache>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("Starting QueryBridge v{}", VERSION);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Prometheus exporter on {}", metrics_addr);
    }
    metrics::register_metrics();

    // Shared services
    let cache = Arc::new(ResponseCache::new((&config.cache).into()));
    Arc::clone(&cache).spawn_sweeper();

    let store = Arc::new(VectorStore::new());

    let tracker = Arc::new(JobTracker::new(Duration::from_secs(
        config.ingestion.job_retention_secs,
    )));
    Arc::clone(&tracker).spawn_sweeper();

    let embedder = create_embedder(
        &config.embedding.provider,
        config.embedding.api_key.clone(),
        config.embedding.model.clone(),
        config.embedding.dimension,
        config.embedding.api_base.clone(),
        Duration::from_secs(config.embedding.timeout_secs),
        config.embedding.max_retries,
    )?;
    info!(
        provider = %config.embedding.provider,
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedding client ready"
    );

    let translator = create_translator(&config.translator)?;

    let pipeline = IngestionPipeline::new(
        Arc::new(ExtractorRegistry::with_builtins()),
        Arc::clone(&tracker),
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.ingestion.clone(),
        config.embedding.batch_size,
    );

    let registry = Arc::new(EngineRegistry::new(
        Arc::clone(&config),
        Arc::clone(&cache),
        Arc::clone(&store),
        Arc::clone(&embedder),
        translator,
    ));

    let state = AppState {
        config: config.clone(),
        registry,
        pipeline,
        tracker,
        cache,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Schema endpoints
        .route("/ingest/database", post(handlers::schema::connect_database))
        .route("/schema/refresh", post(handlers::schema::refresh_schema))
        // Ingestion endpoints
        .route("/ingest/documents", post(handlers::ingest::upload_documents))
        .route("/ingest/jobs", get(handlers::ingest::list_jobs))
        .route("/ingest/status/{job_id}", get(handlers::ingest::job_status))
        // Query endpoints
        .route("/query", post(handlers::query::process_query))
        .route("/query/history", get(handlers::query::history));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
