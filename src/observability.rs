use std::net::SocketAddr;

// ── Allocation metrics ──────────────────────────────────────────

/// Counter: occupancies created by the allocator.
pub const OCCUPANCIES_CREATED_TOTAL: &str = "roomledger_occupancies_created_total";

/// Counter: rejected allocations. Labels: reason.
pub const ALLOCATION_FAILURES_TOTAL: &str = "roomledger_allocation_failures_total";

/// Counter: occupancies cancelled with their booking.
pub const OCCUPANCIES_CANCELLED_TOTAL: &str = "roomledger_occupancies_cancelled_total";

// ── Sweep metrics ───────────────────────────────────────────────

/// Counter: occupancies completed by expiry sweeps.
pub const OCCUPANCIES_COMPLETED_TOTAL: &str = "roomledger_occupancies_completed_total";

/// Histogram: duration of one sweep pass in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "roomledger_sweep_duration_seconds";

// ── Ledger log ──────────────────────────────────────────────────

/// Histogram: group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: records per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
