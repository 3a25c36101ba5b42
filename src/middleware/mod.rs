//! Middleware for the gearbook API
//!
//! Request tracing and authenticated-user extraction.

pub mod auth;
mod tracing;

pub use auth::AuthenticatedUser;
pub use tracing::request_tracing;
