//! Prometheus metrics for the notification queue
//!
//! Emitted by the drain loop alongside the in-memory delivery ledger, so
//! queue health is visible to the platform's scrape-based monitoring too.

use crate::models::NotificationKind;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Notification queue metrics helper
#[derive(Clone, Default)]
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record a message delivered by the provider
    pub fn message_sent(&self, kind: &NotificationKind) {
        counter!(
            "notifications_sent_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a message dropped after exhausting its attempts
    pub fn message_failed(&self, kind: &NotificationKind) {
        counter!(
            "notifications_failed_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Record a failed attempt that stays queued for retry
    pub fn message_retried(&self, kind: &NotificationKind) {
        counter!(
            "notifications_retried_total",
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    /// Update the queue depth gauge
    pub fn queue_depth(&self, depth: usize) {
        gauge!("notifications_queue_depth").set(depth as f64);
    }
}
