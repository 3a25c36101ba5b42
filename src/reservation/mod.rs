//! Reservation domain module
//!
//! Contains the reservation model, the pure status derivation, the overlap
//! check and the lifecycle service with its guarded transitions.

pub mod availability;
mod model;
mod service;
mod status;

pub use model::*;
pub use service::ReservationService;
pub use status::calculate_status;
