pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod service;
pub mod sweeper;
pub mod wal;

pub use engine::{BookingRequest, Engine, EngineError};
pub use service::RoomOccupancyService;
