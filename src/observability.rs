use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: room status flips. Labels: to.
pub const STATUS_CHANGES_TOTAL: &str = "dormat_status_changes_total";

/// Counter: bookings rejected because the room was at capacity.
pub const BOOKINGS_REJECTED_TOTAL: &str = "dormat_bookings_rejected_capacity_total";

/// Histogram: full-sweep duration per dormitory, in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "dormat_sweep_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms in the engine (per process, all dormitories).
pub const ROOMS_TOTAL: &str = "dormat_rooms_total";

/// Gauge: number of loaded dormitory engines.
pub const TENANTS_ACTIVE: &str = "dormat_tenants_active";

/// Histogram: WAL append+fsync duration in seconds.
pub const WAL_APPEND_DURATION_SECONDS: &str = "dormat_wal_append_duration_seconds";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
