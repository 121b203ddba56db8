use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: bookings created. Labels: none.
pub const BOOKINGS_CREATED_TOTAL: &str = "deskbook_bookings_created_total";

/// Counter: booking attempts rejected on overlap.
pub const BOOKING_CONFLICTS_TOTAL: &str = "deskbook_booking_conflicts_total";

/// Counter: bookings cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "deskbook_bookings_cancelled_total";

/// Counter: mutations rejected by the authorization policy.
pub const FORBIDDEN_TOTAL: &str = "deskbook_forbidden_total";

/// Counter: notifications persisted and published.
pub const NOTIFICATIONS_TOTAL: &str = "deskbook_notifications_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active organizations (loaded engines).
pub const ORGS_ACTIVE: &str = "deskbook_orgs_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "deskbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "deskbook_wal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if
/// `port` is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber. Embedders with their own
/// subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
