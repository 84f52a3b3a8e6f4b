//! Observability metrics for the preparation flow.
//!
//! Metrics are exported through the `metrics` crate facade. To expose them
//! to Prometheus, install a recorder at startup:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```

use std::time::Instant;

use metrics::{counter, gauge, histogram};

use cartage_core::SlotId;

use crate::request::RequestClass;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: slot acquisition attempts by slot and result.
    pub const SLOT_ACQUIRES_TOTAL: &str = "cartage_flow_slot_acquires_total";
    /// Counter: slot releases by slot.
    pub const SLOT_RELEASES_TOTAL: &str = "cartage_flow_slot_releases_total";
    /// Counter: queued requests promoted on release.
    pub const QUEUE_PROMOTIONS_TOTAL: &str = "cartage_flow_queue_promotions_total";
    /// Counter: manual overrides by request class.
    pub const OVERRIDES_TOTAL: &str = "cartage_flow_overrides_total";
    /// Counter: reconciliation passes by outcome.
    pub const RECONCILE_PASSES_TOTAL: &str = "cartage_flow_reconcile_passes_total";
    /// Histogram: reconciliation pass duration in seconds.
    pub const RECONCILE_PASS_SECONDS: &str = "cartage_flow_reconcile_pass_seconds";
    /// Counter: order polls by reported progress.
    pub const ORDERS_POLLED_TOTAL: &str = "cartage_flow_orders_polled_total";
    /// Counter: dispatch submissions by result.
    pub const DISPATCH_SUBMISSIONS_TOTAL: &str = "cartage_flow_dispatch_submissions_total";
    /// Gauge: open orders observed by the latest pass.
    pub const OPEN_ORDERS: &str = "cartage_flow_open_orders";
}

/// Label keys used across metrics.
pub mod labels {
    /// Slot identity label.
    pub const SLOT: &str = "slot";
    /// Result label (acquired, occupied, ok, failed, ...).
    pub const RESULT: &str = "result";
    /// Request class label (part, pack).
    pub const CLASS: &str = "class";
    /// Reported order progress label.
    pub const PROGRESS: &str = "progress";
    /// Pass outcome label (completed, skipped).
    pub const STATUS: &str = "status";
}

/// Records a slot acquisition attempt.
pub fn record_acquire(slot: SlotId, held: bool) {
    counter!(
        names::SLOT_ACQUIRES_TOTAL,
        labels::SLOT => slot.as_label(),
        labels::RESULT => if held { "acquired" } else { "occupied" },
    )
    .increment(1);
}

/// Records a slot release and its promotion fan-out.
pub fn record_release(slot: SlotId, promoted: usize) {
    counter!(names::SLOT_RELEASES_TOTAL, labels::SLOT => slot.as_label()).increment(1);
    if promoted > 0 {
        counter!(names::QUEUE_PROMOTIONS_TOTAL, labels::SLOT => slot.as_label())
            .increment(promoted as u64);
    }
}

/// Records a manual override.
pub fn record_override(class: RequestClass) {
    counter!(names::OVERRIDES_TOTAL, labels::CLASS => class.as_label()).increment(1);
}

/// Records one order poll result.
pub fn record_poll(progress_label: &'static str) {
    counter!(names::ORDERS_POLLED_TOTAL, labels::PROGRESS => progress_label).increment(1);
}

/// Records one dispatch submission result.
pub fn record_submission(ok: bool) {
    counter!(
        names::DISPATCH_SUBMISSIONS_TOTAL,
        labels::RESULT => if ok { "ok" } else { "failed" },
    )
    .increment(1);
}

/// Records a completed or skipped reconciliation pass.
pub fn record_pass(status: &'static str, open_orders: usize) {
    counter!(names::RECONCILE_PASSES_TOTAL, labels::STATUS => status).increment(1);
    gauge!(names::OPEN_ORDERS).set(open_orders as f64);
}

/// Measures a duration and records it on drop.
pub struct TimingGuard {
    start: Instant,
}

impl TimingGuard {
    /// Starts timing a reconciliation pass.
    #[must_use]
    pub fn pass() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        histogram!(names::RECONCILE_PASS_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}
