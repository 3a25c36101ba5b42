//! Identity resolution
//!
//! The authentication protocol itself lives outside this service; all that
//! is consumed here is a verified token identifying the caller. Every core
//! operation receives the resolved identity explicitly.

mod jwt;

pub use jwt::{verify_token, Claims, JwtError};
