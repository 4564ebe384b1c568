//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use std::time::Duration;
use once_cell::sync::Lazy;

use crate::sources::models::SourceKind;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Source adapter metrics
    pub source_fetch_requests: CounterVec,
    pub source_fetch_duration: HistogramVec,

    // Last-seen metrics
    pub last_seen_resolutions: CounterVec,

    // Scoring metrics
    pub score_computes: CounterVec,
    pub fleet_recompute_duration: Histogram,
    pub fleet_recompute_failures: Histogram,

    // Follow-up metrics
    pub followup_scans: Counter,
    pub followup_flagged: Histogram,
    pub followup_recent_activity: Histogram,

    // Presence metrics
    pub presence_pushes: Counter,
    pub presence_observers: Gauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        // Source adapter metrics
        let source_fetch_requests = register_counter_vec_with_registry!(
            Opts::new("source_fetch_requests_total", "Total source fetch attempts"),
            &["source", "status"],
            registry
        )?;

        let source_fetch_duration = register_histogram_vec_with_registry!(
            "source_fetch_duration_seconds",
            "Source fetch duration in seconds",
            &["source"],
            registry
        )?;

        // Last-seen metrics
        let last_seen_resolutions = register_counter_vec_with_registry!(
            Opts::new("last_seen_resolutions_total", "Total last-seen resolutions"),
            &["degraded"],
            registry
        )?;

        // Scoring metrics
        let score_computes = register_counter_vec_with_registry!(
            Opts::new("score_computes_total", "Total per-lead score computations"),
            &["status"],
            registry
        )?;

        let fleet_recompute_duration = register_histogram_with_registry!(
            "fleet_recompute_duration_seconds",
            "Fleet score recompute duration in seconds",
            registry
        )?;

        let fleet_recompute_failures = register_histogram_with_registry!(
            "fleet_recompute_failures",
            "Failed leads per fleet recompute",
            registry
        )?;

        // Follow-up metrics
        let followup_scans = register_counter_with_registry!(
            Opts::new("followup_scans_total", "Total follow-up scans"),
            registry
        )?;

        let followup_flagged = register_histogram_with_registry!(
            "followup_flagged_leads",
            "Leads flagged per follow-up scan",
            registry
        )?;

        let followup_recent_activity = register_histogram_with_registry!(
            "followup_recent_activity_leads",
            "Leads with recent activity per scan",
            registry
        )?;

        // Presence metrics
        let presence_pushes = register_counter_with_registry!(
            Opts::new("presence_pushes_total", "Total presence push notifications applied"),
            registry
        )?;

        let presence_observers = register_gauge_with_registry!(
            Opts::new("presence_observers", "Currently observed leads"),
            registry
        )?;

        Ok(Self {
            registry,
            source_fetch_requests,
            source_fetch_duration,
            last_seen_resolutions,
            score_computes,
            fleet_recompute_duration,
            fleet_recompute_failures,
            followup_scans,
            followup_flagged,
            followup_recent_activity,
            presence_pushes,
            presence_observers,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one source fetch attempt
    pub fn record_source_fetch(&self, source: SourceKind, success: bool) {
        let status = if success { "success" } else { "error" };
        self.source_fetch_requests
            .with_label_values(&[source.as_str(), status])
            .inc();
    }

    /// Record how long a source fetch took
    pub fn observe_source_duration(&self, source: SourceKind, elapsed: Duration) {
        self.source_fetch_duration
            .with_label_values(&[source.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a last-seen resolution
    pub fn record_last_seen_resolution(&self, degraded: bool) {
        let label = if degraded { "true" } else { "false" };
        self.last_seen_resolutions.with_label_values(&[label]).inc();
    }

    /// Record one per-lead score computation
    pub fn record_score_compute(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.score_computes.with_label_values(&[status]).inc();
    }

    /// Record a fleet recompute
    pub fn record_fleet_recompute(&self, elapsed: Duration, _succeeded: usize, failed: usize) {
        self.fleet_recompute_duration.observe(elapsed.as_secs_f64());
        self.fleet_recompute_failures.observe(failed as f64);
    }

    /// Record a follow-up scan
    pub fn record_followup_scan(&self, flagged: usize, recent: usize) {
        self.followup_scans.inc();
        self.followup_flagged.observe(flagged as f64);
        self.followup_recent_activity.observe(recent as f64);
    }

    /// Record an applied presence push
    pub fn record_presence_push(&self) {
        self.presence_pushes.inc();
    }

    /// Record an observer starting
    pub fn observer_started(&self) {
        self.presence_observers.inc();
    }

    /// Record an observer stopping
    pub fn observer_stopped(&self) {
        self.presence_observers.dec();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
