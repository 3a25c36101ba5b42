//! GearBook Backend Library
//!
//! This library exports the core modules for the gearbook backend server.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod reservation;
pub mod routes;
pub mod state;
pub mod sweeper;
pub mod token;
