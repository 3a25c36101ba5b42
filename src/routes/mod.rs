//! Route definitions for the gearbook API

mod health;
mod reservation;
mod token;

pub use health::health_routes;
pub use reservation::reservation_routes;
pub use token::token_routes;
