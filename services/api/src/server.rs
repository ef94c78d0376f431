use crate::cli::ServeArgs;
use crate::infra::{bootstrap, in_memory_service, AppState};
use crate::routes::with_reward_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use insurepath::config::AppConfig;
use insurepath::error::AppError;
use insurepath::telemetry;
use insurepath::workflows::standard_reward::MemoryDocumentStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = MemoryDocumentStore::new();
    let reward_service = in_memory_service(&store);
    match bootstrap(&store, &reward_service, &config.bootstrap)? {
        Some(summary) => info!(
            office = %config.bootstrap.office_id,
            created = summary.created,
            replaced = summary.replaced,
            "bootstrap rate tables loaded"
        ),
        None => warn!(
            office = %config.bootstrap.office_id,
            "no APP_RATE_TABLE_CSV configured; office starts without rate tables"
        ),
    }

    let app = with_reward_routes(reward_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "standard reward service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
