use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::inspections::SchedulingError;

/// Failures that stop the service binary or the demo walkthrough.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),
}
