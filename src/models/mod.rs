//! Shared data models for the gearbook backend

use serde::{Deserialize, Serialize};

/// User roles
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Borrower,
    Lender,
    Admin,
}
