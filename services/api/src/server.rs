use crate::cli::ServeArgs;
use crate::infra::{
    default_plan_catalog, standard_commission_rules, AppState, InMemoryBillingRepository,
    InMemoryCommissionRepository, InMemoryWorkflowRepository,
};
use crate::routes::platform_router;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use lendflow::billing::UsageMeteringService;
use lendflow::commissions::CommissionEngine;
use lendflow::config::AppConfig;
use lendflow::error::AppError;
use lendflow::telemetry;
use lendflow::workflows::application::ApplicationWorkflowService;
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

    let workflow_repository = Arc::new(InMemoryWorkflowRepository::default());
    let commission_repository = Arc::new(InMemoryCommissionRepository::with_rules(
        standard_commission_rules(),
    ));
    let commission_engine = Arc::new(CommissionEngine::new(commission_repository));
    let workflow_service = Arc::new(ApplicationWorkflowService::new(
        workflow_repository,
        commission_engine,
    ));

    let billing_repository = Arc::new(InMemoryBillingRepository::with_plans(
        default_plan_catalog(),
    ));
    let metering_service = Arc::new(UsageMeteringService::new(billing_repository.clone()));

    let app = platform_router(workflow_service, metering_service, billing_repository)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan origination platform ready");

    axum::serve(listener, app).await?;
    Ok(())
}
