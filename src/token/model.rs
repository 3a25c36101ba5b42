//! Exchange token models for gearbook

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which physical event a token confirms
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "exchange_token_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Pickup,
    Return,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Pickup => "pickup",
            TokenKind::Return => "return",
        }
    }
}

/// Exchange token model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ExchangeToken {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub token: String,
    pub kind: TokenKind,
    pub created_by_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Response for a freshly generated token
#[derive(Debug, Serialize)]
pub struct GenerateTokenResponse {
    pub token: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}
