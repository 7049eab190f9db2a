use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

pub type HotelId = Ulid;
pub type RoomTypeId = Ulid;
pub type RoomId = Ulid;
pub type BookingId = Ulid;
pub type OccupancyId = Ulid;

/// Half-open stay `[check_in, check_out)` in calendar days.
/// The check-out day is free for a new check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    /// `ValidationError` unless `check_in < check_out`.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, EngineError> {
        let stay = Self { check_in, check_out };
        if !stay.is_valid() {
            return Err(EngineError::Validation("check-out must be after check-in"));
        }
        Ok(stay)
    }

    /// The single night starting on `day`.
    pub fn night_of(day: NaiveDate) -> Result<Self, EngineError> {
        let next = day
            .checked_add_days(Days::new(1))
            .ok_or(EngineError::Validation("date out of range"))?;
        Self::new(day, next)
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn is_valid(&self) -> bool {
        self.check_in < self.check_out
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }
}

/// A room belongs to exactly one hotel and one room type, so the pair is the
/// unit of locking and of availability counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
}

impl PoolKey {
    pub fn new(hotel_id: HotelId, room_type_id: RoomTypeId) -> Self {
        Self {
            hotel_id,
            room_type_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OccupancyStatus {
    Active,
    Cancelled,
    Completed,
}

impl OccupancyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OccupancyStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
    /// Unique within the hotel.
    pub room_number: String,
    pub active: bool,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub id: OccupancyId,
    pub room_id: RoomId,
    pub booking_id: BookingId,
    pub stay: Stay,
    pub status: OccupancyStatus,
}

/// Allocation order for room numbers: purely numeric numbers first by value,
/// then everything else lexicographically.
pub fn room_number_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn room_order(a: &Room, b: &Room) -> Ordering {
    room_number_cmp(&a.room_number, &b.room_number).then_with(|| a.id.cmp(&b.id))
}

fn ledger_order(o: &Occupancy) -> (NaiveDate, OccupancyId) {
    (o.stay.check_in, o.id)
}

/// Rooms and ledger entries of one room type in one hotel.
///
/// ACTIVE occupancies are kept apart from terminal history, so overlap
/// checks, allocation and sweeps only ever walk live entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub key: PoolKey,
    /// Upper bound on the number of rooms of this type.
    pub total_rooms: u32,
    /// Rooms in allocation order.
    pub rooms: Vec<Room>,
    /// ACTIVE occupancies sorted by `(check_in, id)`.
    active: Vec<Occupancy>,
    /// CANCELLED and COMPLETED occupancies.
    closed: HashMap<OccupancyId, Occupancy>,
    bookings: HashMap<BookingId, BTreeSet<OccupancyId>>,
}

impl PoolState {
    pub fn new(key: PoolKey, total_rooms: u32) -> Self {
        Self {
            key,
            total_rooms,
            rooms: Vec::new(),
            active: Vec::new(),
            closed: HashMap::new(),
            bookings: HashMap::new(),
        }
    }

    pub fn insert_room(&mut self, room: Room) {
        let pos = self
            .rooms
            .binary_search_by(|r| room_order(r, &room))
            .unwrap_or_else(|e| e);
        self.rooms.insert(pos, room);
    }

    pub fn remove_room(&mut self, id: RoomId) -> Option<Room> {
        let pos = self.rooms.iter().position(|r| r.id == id)?;
        Some(self.rooms.remove(pos))
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == *id)
    }

    pub fn room_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|r| r.id == *id)
    }

    pub fn active_rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| r.active)
    }

    pub fn insert_occupancy(&mut self, occupancy: Occupancy) {
        self.bookings
            .entry(occupancy.booking_id)
            .or_default()
            .insert(occupancy.id);
        if occupancy.status.is_terminal() {
            self.closed.insert(occupancy.id, occupancy);
            return;
        }
        let key = ledger_order(&occupancy);
        let pos = self.active.partition_point(|o| ledger_order(o) < key);
        self.active.insert(pos, occupancy);
    }

    /// Move the ACTIVE entries among `ids` to `status` in one pass.
    /// Entries already terminal are left untouched. Returns the rooms they held.
    pub fn close_occupancies(
        &mut self,
        ids: &HashSet<OccupancyId>,
        status: OccupancyStatus,
    ) -> Vec<RoomId> {
        debug_assert!(status.is_terminal());
        let mut touched = Vec::new();
        let mut kept = Vec::with_capacity(self.active.len());
        for mut occ in std::mem::take(&mut self.active) {
            if ids.contains(&occ.id) {
                occ.status = status;
                touched.push(occ.room_id);
                self.closed.insert(occ.id, occ);
            } else {
                kept.push(occ);
            }
        }
        self.active = kept;
        touched
    }

    /// ACTIVE occupancies in `(check_in, id)` order.
    pub fn active_occupancies(&self) -> &[Occupancy] {
        &self.active
    }

    /// Every occupancy, live and terminal.
    pub fn occupancies(&self) -> impl Iterator<Item = &Occupancy> {
        self.active.iter().chain(self.closed.values())
    }

    /// All entries of one booking, in occupancy id order.
    pub fn booking_occupancies(&self, booking_id: &BookingId) -> Vec<&Occupancy> {
        let Some(ids) = self.bookings.get(booking_id) else {
            return Vec::new();
        };
        let live: Vec<&Occupancy> = self
            .active
            .iter()
            .filter(|o| o.booking_id == *booking_id)
            .collect();
        ids.iter()
            .filter_map(|id| {
                self.closed
                    .get(id)
                    .or_else(|| live.iter().copied().find(|o| o.id == *id))
            })
            .collect()
    }

    pub fn active_booking_ids(&self, booking_id: &BookingId) -> Vec<OccupancyId> {
        self.active
            .iter()
            .filter(|o| o.booking_id == *booking_id)
            .map(|o| o.id)
            .collect()
    }

    /// ACTIVE occupancies whose stay overlaps `query`.
    /// Binary search skips everything checking in on or after `query.check_out`.
    pub fn active_overlapping(&self, query: &Stay) -> impl Iterator<Item = &Occupancy> {
        let right_bound = self
            .active
            .partition_point(|o| o.stay.check_in < query.check_out);
        self.active[..right_bound]
            .iter()
            .filter(move |o| o.stay.check_out > query.check_in)
    }

    /// Distinct active rooms holding at least one ACTIVE occupancy overlapping `query`.
    pub fn occupied_rooms(&self, query: &Stay) -> HashSet<RoomId> {
        let occupied: HashSet<RoomId> = self.active_overlapping(query).map(|o| o.room_id).collect();
        self.active_rooms()
            .filter(|r| occupied.contains(&r.id))
            .map(|r| r.id)
            .collect()
    }

    /// Active rooms with no ACTIVE occupancy overlapping `query`, in allocation order.
    pub fn free_rooms(&self, query: &Stay) -> Vec<&Room> {
        let occupied = self.occupied_rooms(query);
        self.active_rooms()
            .filter(|r| !occupied.contains(&r.id))
            .collect()
    }

    pub fn has_active_occupancy(&self, room_id: &RoomId) -> bool {
        self.active.iter().any(|o| o.room_id == *room_id)
    }

    /// Derive a room's status from the ledger. Maintenance is only lifted explicitly.
    pub fn reconcile_room_status(&mut self, room_id: &RoomId) {
        let busy = self.has_active_occupancy(room_id);
        if let Some(room) = self.room_mut(room_id) {
            room.status = match (room.status, busy) {
                (RoomStatus::Maintenance, _) => RoomStatus::Maintenance,
                (_, true) => RoomStatus::Occupied,
                (_, false) => RoomStatus::Available,
            };
        }
    }
}

/// One allocated room inside an `OccupanciesCreated` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub occupancy_id: OccupancyId,
    pub room_id: RoomId,
}

impl Allocation {
    pub fn occupancy(&self, booking_id: BookingId, stay: Stay) -> Occupancy {
        Occupancy {
            id: self.occupancy_id,
            room_id: self.room_id,
            booking_id,
            stay,
            status: OccupancyStatus::Active,
        }
    }
}

/// The ledger record format. One record is one atomic unit of change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomTypeRegistered {
        pool: PoolKey,
        total_rooms: u32,
    },
    RoomAdded {
        pool: PoolKey,
        id: RoomId,
        room_number: String,
    },
    RoomActivityChanged {
        pool: PoolKey,
        id: RoomId,
        active: bool,
    },
    RoomMaintenanceChanged {
        pool: PoolKey,
        id: RoomId,
        maintenance: bool,
    },
    RoomDeleted {
        pool: PoolKey,
        id: RoomId,
    },
    OccupanciesCreated {
        pool: PoolKey,
        booking_id: BookingId,
        stay: Stay,
        allocations: Vec<Allocation>,
    },
    OccupanciesCancelled {
        pool: PoolKey,
        booking_id: BookingId,
        ids: Vec<OccupancyId>,
    },
    OccupanciesCompleted {
        pool: PoolKey,
        ids: Vec<OccupancyId>,
    },
    /// Compaction snapshot of a room, status included.
    RoomRestored {
        pool: PoolKey,
        room: Room,
    },
    /// Compaction snapshot of an occupancy, status included.
    OccupancyRestored {
        pool: PoolKey,
        occupancy: Occupancy,
    },
}

impl Event {
    pub fn pool(&self) -> PoolKey {
        match self {
            Event::RoomTypeRegistered { pool, .. }
            | Event::RoomAdded { pool, .. }
            | Event::RoomActivityChanged { pool, .. }
            | Event::RoomMaintenanceChanged { pool, .. }
            | Event::RoomDeleted { pool, .. }
            | Event::OccupanciesCreated { pool, .. }
            | Event::OccupanciesCancelled { pool, .. }
            | Event::OccupanciesCompleted { pool, .. }
            | Event::RoomRestored { pool, .. }
            | Event::OccupancyRestored { pool, .. } => *pool,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A booking-facing view of one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyInfo {
    pub id: OccupancyId,
    pub hotel_id: HotelId,
    pub room_type_id: RoomTypeId,
    pub room_id: RoomId,
    pub room_number: String,
    pub booking_id: BookingId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: OccupancyStatus,
}

impl OccupancyInfo {
    pub(crate) fn from_entry(pool: &PoolState, occupancy: &Occupancy) -> Self {
        let room_number = pool
            .room(&occupancy.room_id)
            .map(|r| r.room_number.clone())
            .unwrap_or_default();
        Self {
            id: occupancy.id,
            hotel_id: pool.key.hotel_id,
            room_type_id: pool.key.room_type_id,
            room_id: occupancy.room_id,
            room_number,
            booking_id: occupancy.booking_id,
            check_in: occupancy.stay.check_in,
            check_out: occupancy.stay.check_out,
            status: occupancy.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilitySummary {
    pub available: bool,
    pub available_rooms: u32,
    pub total_rooms: u32,
}

impl AvailabilitySummary {
    pub fn message(&self) -> String {
        if self.available {
            format!(
                "{} out of {} rooms available",
                self.available_rooms, self.total_rooms
            )
        } else {
            format!(
                "Only {} out of {} rooms available",
                self.available_rooms, self.total_rooms
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoomStats {
    pub total_rooms: u32,
    pub available_rooms: u32,
    pub occupied_rooms: u32,
    pub maintenance_rooms: u32,
}

/// Outcome of one expiry sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub completed: usize,
    pub rooms_released: usize,
    pub failed_pools: usize,
}
