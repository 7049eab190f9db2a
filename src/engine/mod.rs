mod conflict;
mod error;
mod expiry;
mod mutations;
mod queries;

pub use conflict::today;
pub use error::EngineError;
pub use mutations::BookingRequest;

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::model::*;
use crate::wal::{Wal, WalWriter};

pub type SharedPool = Arc<RwLock<PoolState>>;

/// Secondary lookups kept in step with pool contents.
#[derive(Default)]
pub(super) struct Index {
    pub(super) room_to_pool: DashMap<RoomId, PoolKey>,
    pub(super) booking_to_pool: DashMap<BookingId, PoolKey>,
    pub(super) room_numbers: DashMap<(HotelId, String), RoomId>,
}

/// Room registry plus occupancy ledger, partitioned into per-room-type pools.
///
/// Every mutation holds the write lock of exactly one pool from validation
/// through log append and apply, so availability checks and the rows they
/// justify are one atomic step per pool.
pub struct Engine {
    pub(super) pools: DashMap<PoolKey, SharedPool>,
    pub(super) hotel_room_types: DashMap<HotelId, Vec<RoomTypeId>>,
    pub(super) index: Index,
    pub(super) wal: WalWriter,
    /// Mutations share it, compaction takes it exclusively so no append
    /// can slip between the snapshot and the log rewrite.
    pub(super) compaction_gate: RwLock<()>,
}

/// Apply a ledger record to its pool (caller holds the pool's write lock).
fn apply_to_pool(ps: &mut PoolState, event: &Event, index: &Index) {
    match event {
        Event::RoomAdded { pool, id, room_number } => {
            restore_room(
                ps,
                Room {
                    id: *id,
                    hotel_id: pool.hotel_id,
                    room_type_id: pool.room_type_id,
                    room_number: room_number.clone(),
                    active: true,
                    status: RoomStatus::Available,
                },
                index,
            );
        }
        Event::RoomRestored { room, .. } => restore_room(ps, room.clone(), index),
        Event::RoomActivityChanged { id, active, .. } => {
            if let Some(room) = ps.room_mut(id) {
                room.active = *active;
            }
        }
        Event::RoomMaintenanceChanged { id, maintenance, .. } => {
            if let Some(room) = ps.room_mut(id) {
                room.status = if *maintenance {
                    RoomStatus::Maintenance
                } else {
                    RoomStatus::Available
                };
            }
            if !*maintenance {
                ps.reconcile_room_status(id);
            }
        }
        Event::RoomDeleted { pool, id } => {
            if let Some(room) = ps.remove_room(*id) {
                index
                    .room_numbers
                    .remove_if(&(pool.hotel_id, room.room_number), |_, owner| owner == id);
            }
            index.room_to_pool.remove(id);
        }
        Event::OccupanciesCreated {
            pool,
            booking_id,
            stay,
            allocations,
        } => {
            for a in allocations {
                ps.insert_occupancy(a.occupancy(*booking_id, *stay));
                ps.reconcile_room_status(&a.room_id);
            }
            index.booking_to_pool.insert(*booking_id, *pool);
        }
        Event::OccupanciesCancelled { ids, .. } => {
            close_occupancies(ps, ids, OccupancyStatus::Cancelled);
        }
        Event::OccupanciesCompleted { ids, .. } => {
            close_occupancies(ps, ids, OccupancyStatus::Completed);
        }
        Event::OccupancyRestored { pool, occupancy } => {
            index.booking_to_pool.insert(occupancy.booking_id, *pool);
            ps.insert_occupancy(occupancy.clone());
        }
        // pools themselves are created at the map level
        Event::RoomTypeRegistered { .. } => {}
    }
}

fn restore_room(ps: &mut PoolState, room: Room, index: &Index) {
    index.room_to_pool.insert(room.id, ps.key);
    index
        .room_numbers
        .insert((room.hotel_id, room.room_number.clone()), room.id);
    ps.insert_room(room);
}

/// Move ACTIVE entries to a terminal status and re-derive their rooms' status.
/// Entries already terminal are left untouched.
fn close_occupancies(ps: &mut PoolState, ids: &[OccupancyId], status: OccupancyStatus) {
    let ids: HashSet<OccupancyId> = ids.iter().copied().collect();
    let touched: HashSet<RoomId> = ps.close_occupancies(&ids, status).into_iter().collect();
    for room_id in touched {
        ps.reconcile_room_status(&room_id);
    }
}

impl Engine {
    /// Replay the ledger at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: &Path) -> std::io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = WalWriter::spawn(Wal::open(wal_path)?);

        let index = Index::default();
        let mut pools: HashMap<PoolKey, PoolState> = HashMap::new();
        for event in &events {
            match event {
                Event::RoomTypeRegistered { pool, total_rooms } => {
                    pools.insert(*pool, PoolState::new(*pool, *total_rooms));
                }
                other => {
                    if let Some(ps) = pools.get_mut(&other.pool()) {
                        apply_to_pool(ps, other, &index);
                    }
                }
            }
        }

        let engine = Self {
            pools: DashMap::new(),
            hotel_room_types: DashMap::new(),
            index,
            wal,
            compaction_gate: RwLock::new(()),
        };
        for (key, ps) in pools {
            engine.insert_pool(key, ps);
        }
        tracing::info!(
            path = %wal_path.display(),
            records = events.len(),
            pools = engine.pools.len(),
            "ledger replayed"
        );
        Ok(engine)
    }

    fn insert_pool(&self, key: PoolKey, ps: PoolState) {
        self.pools.insert(key, Arc::new(RwLock::new(ps)));
        self.hotel_room_types
            .entry(key.hotel_id)
            .or_default()
            .push(key.room_type_id);
    }

    pub fn get_pool(&self, key: &PoolKey) -> Option<SharedPool> {
        self.pools.get(key).map(|e| e.value().clone())
    }

    /// Every pool key, sorted.
    pub(super) fn pool_keys(&self) -> Vec<PoolKey> {
        let mut keys: Vec<PoolKey> = self.pools.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    pub(super) fn pool(&self, key: &PoolKey) -> Result<SharedPool, EngineError> {
        self.get_pool(key)
            .ok_or(EngineError::NotFound(key.room_type_id))
    }

    /// Write-lock a pool for a mutation. Fails with `NotFound` if the pool was
    /// unpublished while we waited, i.e. its registration never became durable.
    pub(super) async fn lock_pool(
        &self,
        key: &PoolKey,
    ) -> Result<OwnedRwLockWriteGuard<PoolState>, EngineError> {
        let pool = self.pool(key)?;
        let guard = pool.clone().write_owned().await;
        match self.pools.get(key) {
            Some(current) if Arc::ptr_eq(current.value(), &pool) => Ok(guard),
            _ => Err(EngineError::NotFound(key.room_type_id)),
        }
    }

    /// Pools of one hotel, in room-type order.
    pub(super) fn hotel_pools(&self, hotel_id: &HotelId) -> Result<Vec<SharedPool>, EngineError> {
        let mut room_types = self
            .hotel_room_types
            .get(hotel_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(*hotel_id))?;
        room_types.sort();
        Ok(room_types
            .into_iter()
            .filter_map(|rt| self.get_pool(&PoolKey::new(*hotel_id, rt)))
            .collect())
    }

    pub(super) fn room_pool_key(&self, room_id: &RoomId) -> Result<PoolKey, EngineError> {
        self.index
            .room_to_pool
            .get(room_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*room_id))
    }

    pub(super) fn booking_pool_key(&self, booking_id: &BookingId) -> Result<PoolKey, EngineError> {
        self.index
            .booking_to_pool
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*booking_id))
    }

    /// Durably log `event`, then apply it. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        ps: &mut PoolState,
        event: Event,
    ) -> Result<(), EngineError> {
        self.wal.append(event.clone()).await?;
        apply_to_pool(ps, &event, &self.index);
        Ok(())
    }
}
