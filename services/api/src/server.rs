use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryLoanRepository, InMemoryStageQueue, LoggingNotifier,
    TrustedTokenAuthenticator,
};
use crate::routes::with_loan_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lending_ai::config::AppConfig;
use lending_ai::error::AppError;
use lending_ai::telemetry;
use lending_ai::workflows::loan::{LoanPipelineService, SimulatedDecisions};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

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

    let repository = Arc::new(InMemoryLoanRepository::default());
    let queue = Arc::new(InMemoryStageQueue::default());
    let notifier = Arc::new(LoggingNotifier);
    let pipeline_service = Arc::new(LoanPipelineService::new(
        repository,
        queue,
        notifier,
        Arc::new(TrustedTokenAuthenticator),
        Arc::new(SimulatedDecisions::from_entropy()),
        config.pipeline.clone(),
    ));

    let recovered = pipeline_service.recover()?;
    if recovered > 0 {
        info!(tasks = recovered, "resumed in-flight pipelines");
    }

    let app = with_loan_routes(pipeline_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "agentic lending orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}
