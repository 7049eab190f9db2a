use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::engine::Engine;

/// Background task that returns rooms to the pool after checkout.
/// The first pass runs immediately, then once per `period`.
pub async fn run_sweeper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        info!("processing expired room occupancies");
        let report = engine.process_expired_occupancies().await;
        if report.failed_pools > 0 {
            error!(
                completed = report.completed,
                failed_pools = report.failed_pools,
                "expiry sweep finished with failures"
            );
        } else {
            info!(
                completed = report.completed,
                rooms_released = report.rooms_released,
                "expiry sweep finished"
            );
        }
    }
}

/// Background task that compacts the ledger log once enough records pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, check_every: Duration) {
    let mut interval = tokio::time::interval(check_every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            debug!(appends, threshold, "compaction not due");
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            error!("ledger compaction failed: {e}");
        }
    }
}
