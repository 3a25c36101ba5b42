//! API handlers for the gearbook backend

mod health;
mod reservation;
mod token;

pub use health::health_check;
pub use reservation::*;
pub use token::*;
