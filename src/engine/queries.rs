use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::conflict::{validate_room_count, validate_stay};
use super::{Engine, EngineError};

/// `available = active rooms - distinct active rooms occupied during stay`.
fn summarize(ps: &PoolState, stay: &Stay, requested: u32) -> AvailabilitySummary {
    let total_rooms = ps.active_rooms().count() as u32;
    let occupied = ps.occupied_rooms(stay).len() as u32;
    let available_rooms = total_rooms.saturating_sub(occupied);
    AvailabilitySummary {
        available: available_rooms >= requested,
        available_rooms,
        total_rooms,
    }
}

impl Engine {
    // ── Availability engine ──────────────────────────────────

    /// Read-only check; it reserves nothing. Only `create_room_occupancy`
    /// turns a positive answer into held rooms.
    pub async fn is_room_type_available(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
        requested: u32,
    ) -> Result<bool, EngineError> {
        Ok(self
            .availability_summary(hotel_id, room_type_id, stay, requested)
            .await?
            .available)
    }

    pub async fn availability_summary(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
        requested: u32,
    ) -> Result<AvailabilitySummary, EngineError> {
        validate_room_count(requested)?;
        validate_stay(&stay)?;
        let pool = self.pool(&PoolKey::new(hotel_id, room_type_id))?;
        let guard = pool.read().await;
        Ok(summarize(&guard, &stay, requested))
    }

    /// Per-night availability for every day in `[start, end]`, end inclusive,
    /// taken from one consistent view of the pool.
    pub async fn daily_availability(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        start: NaiveDate,
        end: NaiveDate,
        requested: u32,
    ) -> Result<BTreeMap<NaiveDate, bool>, EngineError> {
        validate_room_count(requested)?;
        if end < start {
            return Err(EngineError::Validation("end date before start date"));
        }
        if (end - start).num_days() >= MAX_BATCH_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let pool = self.pool(&PoolKey::new(hotel_id, room_type_id))?;
        let guard = pool.read().await;

        let mut days = BTreeMap::new();
        for day in start.iter_days().take_while(|d| *d <= end) {
            let night = Stay::night_of(day)?;
            days.insert(day, summarize(&guard, &night, requested).available);
        }
        Ok(days)
    }

    pub async fn count_occupied_rooms_by_type(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
    ) -> Result<u32, EngineError> {
        validate_stay(&stay)?;
        let pool = self.pool(&PoolKey::new(hotel_id, room_type_id))?;
        let guard = pool.read().await;
        Ok(guard.occupied_rooms(&stay).len() as u32)
    }

    /// Same distinct-room overlap count across every room type of the hotel.
    pub async fn count_occupied_rooms_by_hotel(
        &self,
        hotel_id: HotelId,
        stay: Stay,
    ) -> Result<u32, EngineError> {
        validate_stay(&stay)?;
        let mut occupied = 0u32;
        for pool in self.hotel_pools(&hotel_id)? {
            occupied += pool.read().await.occupied_rooms(&stay).len() as u32;
        }
        Ok(occupied)
    }

    /// Free rooms in the order the allocator would pick them.
    pub async fn available_rooms(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
    ) -> Result<Vec<Room>, EngineError> {
        validate_stay(&stay)?;
        let pool = self.pool(&PoolKey::new(hotel_id, room_type_id))?;
        let guard = pool.read().await;
        Ok(guard.free_rooms(&stay).into_iter().cloned().collect())
    }

    pub async fn occupied_room_count(
        &self,
        hotel_id: HotelId,
        today: NaiveDate,
    ) -> Result<u32, EngineError> {
        self.count_occupied_rooms_by_hotel(hotel_id, Stay::night_of(today)?)
            .await
    }

    /// Dashboard counters for tonight: occupied rooms come from the ledger,
    /// maintenance from room status. A room under maintenance that is also
    /// booked tonight counts as occupied only.
    pub async fn room_stats(&self, hotel_id: HotelId, today: NaiveDate) -> Result<RoomStats, EngineError> {
        let tonight = Stay::night_of(today)?;
        let mut stats = RoomStats::default();
        for pool in self.hotel_pools(&hotel_id)? {
            let guard = pool.read().await;
            let occupied = guard.occupied_rooms(&tonight);
            stats.total_rooms += guard.active_rooms().count() as u32;
            stats.occupied_rooms += occupied.len() as u32;
            stats.maintenance_rooms += guard
                .active_rooms()
                .filter(|r| r.status == RoomStatus::Maintenance && !occupied.contains(&r.id))
                .count() as u32;
        }
        stats.available_rooms = stats
            .total_rooms
            .saturating_sub(stats.occupied_rooms)
            .saturating_sub(stats.maintenance_rooms);
        Ok(stats)
    }

    // ── Ledger views ─────────────────────────────────────────

    pub async fn occupancies_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        let pool = self.pool(&self.booking_pool_key(&booking_id)?)?;
        let guard = pool.read().await;
        Ok(guard
            .booking_occupancies(&booking_id)
            .into_iter()
            .map(|o| OccupancyInfo::from_entry(&guard, o))
            .collect())
    }

    /// Room numbers of ACTIVE or COMPLETED occupancies, sorted.
    pub async fn assigned_room_numbers(&self, booking_id: BookingId) -> Result<Vec<String>, EngineError> {
        let mut numbers: Vec<String> = self
            .occupancies_for_booking(booking_id)
            .await?
            .into_iter()
            .filter(|o| o.status != OccupancyStatus::Cancelled)
            .map(|o| o.room_number)
            .collect();
        numbers.sort_by(|a, b| room_number_cmp(a, b));
        Ok(numbers)
    }

    // ── Registry views ───────────────────────────────────────

    pub async fn get_room(&self, room_id: RoomId) -> Option<Room> {
        let pool = self.pool(&self.room_pool_key(&room_id).ok()?).ok()?;
        let guard = pool.read().await;
        guard.room(&room_id).cloned()
    }

    /// Every room of the hotel, grouped by room type, in allocation order.
    pub async fn list_rooms(&self, hotel_id: HotelId) -> Result<Vec<Room>, EngineError> {
        let mut rooms = Vec::new();
        for pool in self.hotel_pools(&hotel_id)? {
            rooms.extend(pool.read().await.rooms.iter().cloned());
        }
        Ok(rooms)
    }
}
