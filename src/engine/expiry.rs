use std::collections::HashSet;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::model::*;
use crate::observability;

use super::conflict::today;
use super::{Engine, EngineError};

fn is_expired(occ: &Occupancy, today: NaiveDate) -> bool {
    occ.status == OccupancyStatus::Active && occ.stay.check_out <= today
}

impl Engine {
    /// ACTIVE occupancies whose check-out is on or before `today`, across all hotels.
    pub async fn collect_expired_occupancies(&self, today: NaiveDate) -> Vec<OccupancyInfo> {
        let mut expired = Vec::new();
        for key in self.pool_keys() {
            let Some(pool) = self.get_pool(&key) else { continue };
            let guard = pool.read().await;
            expired.extend(
                guard
                    .active_occupancies()
                    .iter()
                    .filter(|o| is_expired(o, today))
                    .map(|o| OccupancyInfo::from_entry(&guard, o)),
            );
        }
        expired
    }

    pub async fn find_expired_occupancies_by_hotel(
        &self,
        hotel_id: HotelId,
        today: NaiveDate,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        let mut expired = Vec::new();
        for pool in self.hotel_pools(&hotel_id)? {
            let guard = pool.read().await;
            expired.extend(
                guard
                    .active_occupancies()
                    .iter()
                    .filter(|o| is_expired(o, today))
                    .map(|o| OccupancyInfo::from_entry(&guard, o)),
            );
        }
        Ok(expired)
    }

    /// One sweep pass against the local calendar day.
    pub async fn process_expired_occupancies(&self) -> SweepReport {
        self.process_expired_occupancies_at(today()).await
    }

    /// Mark every expired ACTIVE occupancy COMPLETED and re-derive its room's status.
    ///
    /// Each pool is committed on its own; a pool that fails is logged and skipped
    /// so the rest of the hotels still get their rooms back. Re-running is a no-op.
    pub async fn process_expired_occupancies_at(&self, today: NaiveDate) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        for key in self.pool_keys() {
            match self.sweep_pool(key, today).await {
                Ok((completed, released)) => {
                    report.completed += completed;
                    report.rooms_released += released;
                }
                Err(e) => {
                    error!(hotel_id = %key.hotel_id, room_type_id = %key.room_type_id, "sweep failed: {e}");
                    report.failed_pools += 1;
                }
            }
        }

        metrics::counter!(observability::OCCUPANCIES_COMPLETED_TOTAL).increment(report.completed as u64);
        metrics::histogram!(observability::SWEEP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        report
    }

    async fn sweep_pool(&self, key: PoolKey, today: NaiveDate) -> Result<(usize, usize), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_pool(&key).await?;

        let (ids, rooms): (Vec<OccupancyId>, HashSet<RoomId>) = guard
            .active_occupancies()
            .iter()
            .filter(|o| is_expired(o, today))
            .map(|o| (o.id, o.room_id))
            .unzip();
        if ids.is_empty() {
            return Ok((0, 0));
        }

        let completed = ids.len();
        self.persist_and_apply(&mut guard, Event::OccupanciesCompleted { pool: key, ids })
            .await?;

        let mut released = 0;
        for room in guard.rooms.iter().filter(|r| rooms.contains(&r.id)) {
            if room.status == RoomStatus::Available {
                released += 1;
            }
            info!(room = %room.room_number, status = ?room.status, "room occupancy completed after checkout");
        }
        Ok((completed, released))
    }
}
