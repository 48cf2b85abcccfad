use crate::cli::ServeArgs;
use crate::demo::seed_demo_institution;
use crate::infra::{AppState, InMemoryAdmissionRepository, TracingNotifier};
use crate::routes::with_admission_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use childcare_admission::admission::{AdmissionService, RandomSource};
use childcare_admission::config::AppConfig;
use childcare_admission::error::AppError;
use childcare_admission::telemetry;
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

    let repository = Arc::new(InMemoryAdmissionRepository::default());
    if args.demo_data {
        seed_demo_institution(&repository)?;
        info!("demo institution loaded");
    }
    let admission_service = Arc::new(AdmissionService::new(
        repository,
        Arc::new(TracingNotifier),
        config.admission.clone(),
    ));

    let app = with_admission_routes(admission_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        seeded = matches!(config.admission.random, RandomSource::Seeded(_)),
        "childcare admission service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
