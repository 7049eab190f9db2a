use async_trait::async_trait;
use chrono::NaiveDate;

use crate::engine::{BookingRequest, Engine, EngineError};
use crate::model::*;

/// What booking, cancellation and dashboard code may call on the occupancy core.
#[async_trait]
pub trait RoomOccupancyService: Send + Sync {
    /// Whether `requested` rooms of the type are free for the whole stay. Reserves nothing.
    async fn is_room_type_available(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
        requested: u32,
    ) -> Result<bool, EngineError>;

    /// Allocate rooms for a confirmed booking. All rooms or none.
    async fn create_room_occupancy(
        &self,
        booking: &BookingRequest,
    ) -> Result<Vec<OccupancyInfo>, EngineError>;

    /// Release the rooms of a cancelled booking. Safe to call twice.
    async fn cancel_room_occupancy(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<OccupancyId>, EngineError>;

    /// One expiry sweep pass for today.
    async fn process_expired_occupancies(&self) -> SweepReport;

    async fn find_expired_occupancies_by_hotel(
        &self,
        hotel_id: HotelId,
        today: NaiveDate,
    ) -> Result<Vec<OccupancyInfo>, EngineError>;

    async fn count_occupied_rooms_by_hotel(
        &self,
        hotel_id: HotelId,
        stay: Stay,
    ) -> Result<u32, EngineError>;

    async fn count_occupied_rooms_by_type(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
    ) -> Result<u32, EngineError>;
}

#[async_trait]
impl RoomOccupancyService for Engine {
    async fn is_room_type_available(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
        requested: u32,
    ) -> Result<bool, EngineError> {
        Engine::is_room_type_available(self, hotel_id, room_type_id, stay, requested).await
    }

    async fn create_room_occupancy(
        &self,
        booking: &BookingRequest,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        Engine::create_room_occupancy(self, booking).await
    }

    async fn cancel_room_occupancy(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<OccupancyId>, EngineError> {
        Engine::cancel_room_occupancy(self, booking_id).await
    }

    async fn process_expired_occupancies(&self) -> SweepReport {
        Engine::process_expired_occupancies(self).await
    }

    async fn find_expired_occupancies_by_hotel(
        &self,
        hotel_id: HotelId,
        today: NaiveDate,
    ) -> Result<Vec<OccupancyInfo>, EngineError> {
        Engine::find_expired_occupancies_by_hotel(self, hotel_id, today).await
    }

    async fn count_occupied_rooms_by_hotel(
        &self,
        hotel_id: HotelId,
        stay: Stay,
    ) -> Result<u32, EngineError> {
        Engine::count_occupied_rooms_by_hotel(self, hotel_id, stay).await
    }

    async fn count_occupied_rooms_by_type(
        &self,
        hotel_id: HotelId,
        room_type_id: RoomTypeId,
        stay: Stay,
    ) -> Result<u32, EngineError> {
        Engine::count_occupied_rooms_by_type(self, hotel_id, room_type_id, stay).await
    }
}
