//! Exchange token domain module
//!
//! Short-lived single-use tokens that mediate the physical handoff and
//! return of an item between lender and borrower.

pub mod code;
mod model;
mod service;

pub use model::*;
pub use service::ExchangeTokenService;
