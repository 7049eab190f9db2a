use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_room_free, validate_room_count, validate_room_number, validate_stay};
use super::{Engine, EngineError};

/// The four booking fields the allocator reads, plus the booking's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRequest {
    pub booking_id: BookingId,
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
    pub stay: Stay,
    pub room_count: u32,
}

impl BookingRequest {
    pub fn pool(&self) -> PoolKey {
        PoolKey::new(self.hotel_id, self.room_type_id)
    }
}

impl Engine {
    // ── Room registry ────────────────────────────────────────

    pub async fn register_room_type(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        total_rooms: u32,
    ) -> Result<(), EngineError> {
        if total_rooms == 0 {
            return Err(EngineError::Validation("room type needs at least one room"));
        }
        if total_rooms > MAX_ROOMS_PER_ROOM_TYPE {
            return Err(EngineError::LimitExceeded("too many rooms for one room type"));
        }
        let key = PoolKey::new(hotel_id, room_type_id);
        let _gate = self.compaction_gate.read().await;

        // Publish the pool already write-locked; readers wait until the record is durable.
        let pool = Arc::new(RwLock::new(PoolState::new(key, total_rooms)));
        let _guard = pool.clone().write_owned().await;
        match self.pools.entry(key) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(room_type_id)),
            Entry::Vacant(slot) => {
                slot.insert(pool);
            }
        }

        let event = Event::RoomTypeRegistered { pool: key, total_rooms };
        if let Err(e) = self.wal.append(event).await {
            self.pools.remove(&key);
            return Err(e.into());
        }
        self.hotel_room_types
            .entry(hotel_id)
            .or_default()
            .push(room_type_id);
        info!(%hotel_id, %room_type_id, total_rooms, "room type registered");
        Ok(())
    }

    pub async fn add_room(
        &self,
        room_id: RoomId,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        room_number: impl Into<String>,
    ) -> Result<(), EngineError> {
        let room_number = room_number.into();
        validate_room_number(&room_number)?;
        let key = PoolKey::new(hotel_id, room_type_id);
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_pool(&key).await?;

        if guard.rooms.len() >= guard.total_rooms as usize {
            return Err(EngineError::CapacityExceeded(guard.total_rooms));
        }
        // Reserve id and number first: rooms of one hotel live in different pools.
        match self.index.room_to_pool.entry(room_id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(room_id)),
            Entry::Vacant(slot) => {
                slot.insert(key);
            }
        }
        let number_key = (hotel_id, room_number.clone());
        match self.index.room_numbers.entry(number_key.clone()) {
            Entry::Occupied(_) => {
                self.index.room_to_pool.remove(&room_id);
                return Err(EngineError::DuplicateRoomNumber(room_number));
            }
            Entry::Vacant(slot) => {
                slot.insert(room_id);
            }
        }

        let event = Event::RoomAdded {
            pool: key,
            id: room_id,
            room_number: room_number.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, event).await {
            self.index.room_to_pool.remove(&room_id);
            self.index.room_numbers.remove(&number_key);
            return Err(e);
        }
        info!(%hotel_id, %room_type_id, room = %room_number, "room added");
        Ok(())
    }

    /// Deactivated rooms leave the counted pool and are never allocated.
    pub async fn set_room_active(&self, room_id: RoomId, active: bool) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let key = self.room_pool_key(&room_id)?;
        let mut guard = self.lock_pool(&key).await?;
        let room = guard.room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        if room.active == active {
            return Ok(());
        }
        let event = Event::RoomActivityChanged { pool: key, id: room_id, active };
        self.persist_and_apply(&mut guard, event).await
    }

    /// `false` lifts maintenance; the status is then re-derived from the ledger.
    pub async fn set_room_maintenance(
        &self,
        room_id: RoomId,
        maintenance: bool,
    ) -> Result<RoomStatus, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let key = self.room_pool_key(&room_id)?;
        let mut guard = self.lock_pool(&key).await?;
        let current = guard
            .room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?
            .status;
        if (current == RoomStatus::Maintenance) == maintenance {
            return Ok(current);
        }
        let event = Event::RoomMaintenanceChanged { pool: key, id: room_id, maintenance };
        self.persist_and_apply(&mut guard, event).await?;
        Ok(guard
            .room(&room_id)
            .map(|r| r.status)
            .unwrap_or(RoomStatus::Available))
    }

    /// Refused while any ACTIVE occupancy still references the room.
    pub async fn delete_room(&self, room_id: RoomId) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let key = self.room_pool_key(&room_id)?;
        let mut guard = self.lock_pool(&key).await?;
        if guard.room(&room_id).is_none() {
            return Err(EngineError::NotFound(room_id));
        }
        if guard.has_active_occupancy(&room_id) {
            return Err(EngineError::RoomInUse(room_id));
        }
        self.persist_and_apply(&mut guard, Event::RoomDeleted { pool: key, id: room_id })
            .await?;
        info!(%room_id, "room deleted");
        Ok(())
    }

    // ── Allocator ────────────────────────────────────────────

    /// Pick the first `room_count` free rooms in room-number order and record one
    /// ACTIVE occupancy per room, all in a single ledger record.
    ///
    /// Selection and write happen under the pool's write lock, so concurrent
    /// bookings for the same room type are serialized and cannot oversell.
    pub async fn create_room_occupancy(
        &self,
        booking: &BookingRequest,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        let result = self.allocate(booking).await;
        match &result {
            Ok(created) => {
                metrics::counter!(observability::OCCUPANCIES_CREATED_TOTAL)
                    .increment(created.len() as u64);
            }
            Err(e) => {
                warn!(booking_id = %booking.booking_id, "allocation failed: {e}");
                metrics::counter!(observability::ALLOCATION_FAILURES_TOTAL, "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }

    async fn allocate(&self, booking: &BookingRequest) -> Result<Vec<OccupancyInfo>, EngineError> {
        validate_room_count(booking.room_count)?;
        validate_stay(&booking.stay)?;
        let key = booking.pool();
        let _gate = self.compaction_gate.read().await;
        let mut guard = self.lock_pool(&key).await?;

        if self.index.booking_to_pool.contains_key(&booking.booking_id) {
            return Err(EngineError::AlreadyExists(booking.booking_id));
        }

        let free = guard.free_rooms(&booking.stay);
        if free.len() < booking.room_count as usize {
            return Err(EngineError::InsufficientAvailability {
                requested: booking.room_count,
                available: free.len() as u32,
            });
        }
        let picked: Vec<RoomId> = free
            .iter()
            .take(booking.room_count as usize)
            .map(|r| r.id)
            .collect();
        for room_id in &picked {
            check_room_free(&guard, room_id, &booking.stay)?;
        }

        let allocations: Vec<Allocation> = picked
            .into_iter()
            .map(|room_id| Allocation {
                occupancy_id: Ulid::new(),
                room_id,
            })
            .collect();
        let event = Event::OccupanciesCreated {
            pool: key,
            booking_id: booking.booking_id,
            stay: booking.stay,
            allocations: allocations.clone(),
        };
        self.persist_and_apply(&mut guard, event).await?;

        let infos: Vec<OccupancyInfo> = allocations
            .iter()
            .map(|a| {
                let occ = a.occupancy(booking.booking_id, booking.stay);
                OccupancyInfo::from_entry(&guard, &occ)
            })
            .collect();
        for occ in &infos {
            info!(
                room = %occ.room_number,
                check_in = %occ.check_in,
                check_out = %occ.check_out,
                booking_id = %occ.booking_id,
                "room occupied"
            );
        }
        Ok(infos)
    }

    /// Cancel every ACTIVE occupancy of a booking. Terminal entries are left as
    /// they are, and a room only becomes AVAILABLE when no other ACTIVE occupancy
    /// still holds it. Returns the ids that changed; a repeat call returns none.
    pub async fn cancel_room_occupancy(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<OccupancyId>, EngineError> {
        let _gate = self.compaction_gate.read().await;
        let key = self.booking_pool_key(&booking_id)?;
        let mut guard = self.lock_pool(&key).await?;

        let ids = guard.active_booking_ids(&booking_id);
        if ids.is_empty() {
            tracing::debug!(%booking_id, "nothing left to cancel");
            return Ok(ids);
        }

        let event = Event::OccupanciesCancelled {
            pool: key,
            booking_id,
            ids: ids.clone(),
        };
        self.persist_and_apply(&mut guard, event).await?;

        let changed: HashSet<&OccupancyId> = ids.iter().collect();
        for occ in guard
            .booking_occupancies(&booking_id)
            .into_iter()
            .filter(|o| changed.contains(&o.id))
        {
            if let Some(room) = guard.room(&occ.room_id) {
                info!(room = %room.room_number, %booking_id, status = ?room.status, "room occupancy cancelled");
            }
        }
        metrics::counter!(observability::OCCUPANCIES_CANCELLED_TOTAL).increment(ids.len() as u64);
        Ok(ids)
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the log as a snapshot of the current registry and ledger.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.compaction_gate.write().await;

        let mut snapshot = Vec::new();
        for key in self.pool_keys() {
            let Some(pool) = self.get_pool(&key) else { continue };
            let guard = pool.read().await;
            snapshot.push(Event::RoomTypeRegistered {
                pool: key,
                total_rooms: guard.total_rooms,
            });
            for room in &guard.rooms {
                snapshot.push(Event::RoomRestored {
                    pool: key,
                    room: room.clone(),
                });
            }
            for occupancy in guard.occupancies() {
                snapshot.push(Event::OccupancyRestored {
                    pool: key,
                    occupancy: occupancy.clone(),
                });
            }
        }

        let records = snapshot.len();
        self.wal.compact(snapshot).await?;
        info!(records, "ledger compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal.appends_since_compact().await
    }
}
