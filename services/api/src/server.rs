use crate::cli::ServeArgs;
use crate::infra::{demo_store, AppState};
use crate::routes::with_inspection_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fire_inspect::config::AppConfig;
use fire_inspect::error::AppError;
use fire_inspect::telemetry;
use fire_inspect::workflows::inspections::schedule::parse_time_of_day;
use fire_inspect::workflows::inspections::{
    Clock, InMemorySchedulingStore, InspectionScheduler, LoggingNotificationPublisher,
    RetryPolicy, SchedulingError, SystemClock,
};
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

    let clock = Arc::new(SystemClock);
    let store = if args.no_seed {
        InMemorySchedulingStore::new()
    } else {
        let start = parse_time_of_day("09:00").map_err(SchedulingError::from)?;
        let end = parse_time_of_day("10:00").map_err(SchedulingError::from)?;
        demo_store(clock.today(), start, end).map_err(SchedulingError::from)?
    };
    let retry = RetryPolicy::from(&config.scheduling);
    let scheduler = Arc::new(InspectionScheduler::with_parts(
        Arc::new(store),
        Arc::new(LoggingNotificationPublisher),
        clock,
        retry,
    ));

    let app = with_inspection_routes(scheduler)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        retry_attempts = retry.max_attempts(),
        "inspection scheduler ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
