//! Prometheus metrics collection for the chat hub.
//!
//! Provides observability via metrics exposed on an HTTP endpoint: connection
//! counts, broadcast throughput, moderation/backpressure events, and
//! collaborator health.

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Gauges (can increase/decrease)
    // ========================================================================

    /// Every live connection, authenticated or not.
    pub static ref CONNECTED_SUBSCRIBERS: IntGauge = IntGauge::new(
        "barertc_connected_subscribers",
        "Currently connected subscribers (authenticated or not)"
    ).unwrap();

    /// Subscribers that have completed login.
    pub static ref AUTHENTICATED_SUBSCRIBERS: IntGauge = IntGauge::new(
        "barertc_authenticated_subscribers",
        "Currently authenticated subscribers"
    ).unwrap();

    // ========================================================================
    // Counters (monotonic increasing)
    // ========================================================================

    /// Every public-channel `message`/`file` broadcast fanned out.
    pub static ref BROADCASTS_SENT: IntCounter = IntCounter::new(
        "barertc_broadcasts_sent_total",
        "Public broadcasts fanned out to the hub"
    ).unwrap();

    /// `me` updates that resulted in the NSFW video-flag bit being set,
    /// whether client-initiated or forced by a moderation rule/`/nsfw`.
    pub static ref NSFW_FLAGGED: IntCounter = IntCounter::new(
        "barertc_nsfw_flagged_total",
        "Times a subscriber's video flags gained the NSFW bit"
    ).unwrap();

    /// Subscriber teardowns triggered by an outbox overflow.
    pub static ref OUTBOX_OVERFLOWS: IntCounter = IntCounter::new(
        "barertc_outbox_overflows_total",
        "Subscriber teardowns caused by outbox overflow"
    ).unwrap();

    /// Failed webhook-out deliveries (non-2xx, timeout, or not configured).
    pub static ref WEBHOOK_FAILURES: IntCounter = IntCounter::new(
        "barertc_webhook_failures_total",
        "Webhook collaborator delivery failures"
    ).unwrap();

    /// Logins rejected for any reason (ban, strict JWT, conflicting session
    /// aside - that one succeeds as a takeover, not a rejection).
    pub static ref LOGIN_REJECTIONS: IntCounter = IntCounter::new(
        "barertc_login_rejections_total",
        "Login attempts rejected"
    ).unwrap();

    // ========================================================================
    // Histograms
    // ========================================================================

    /// Wall-clock time spent inside `handlers::dispatch` for one envelope,
    /// labeled implicitly by being a single series (low enough action
    /// cardinality that per-action buckets aren't worth the label churn).
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "barertc_dispatch_duration_seconds",
            "Time spent dispatching one client action"
        )
    ).unwrap();
}

/// Initialize the Prometheus metrics registry. Must be called once at server
/// startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(CONNECTED_SUBSCRIBERS.clone())).unwrap();
    REGISTRY.register(Box::new(AUTHENTICATED_SUBSCRIBERS.clone())).unwrap();
    REGISTRY.register(Box::new(BROADCASTS_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(NSFW_FLAGGED.clone())).unwrap();
    REGISTRY.register(Box::new(OUTBOX_OVERFLOWS.clone())).unwrap();
    REGISTRY.register(Box::new(WEBHOOK_FAILURES.clone())).unwrap();
    REGISTRY.register(Box::new(LOGIN_REJECTIONS.clone())).unwrap();
    REGISTRY.register(Box::new(DISPATCH_DURATION.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format, suitable for
/// the `/metrics` HTTP response.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Records one completed dispatch call's latency.
pub fn record_dispatch(duration_secs: f64) {
    DISPATCH_DURATION.observe(duration_secs);
}
