//! Prometheus exposition for the `metrics` facade.

use crate::error::AppError;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, OnceLock};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Install the global Prometheus recorder.
///
/// Idempotent: later calls return the handle of the first recorder.
pub fn init_metrics() -> Result<PrometheusHandle, AppError> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| AppError::TelemetryError(anyhow::anyhow!(e)))?
        .install_recorder()
        .map_err(|e| {
            AppError::TelemetryError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
        })?;

    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Render all recorded metrics in Prometheus text format.
pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}
