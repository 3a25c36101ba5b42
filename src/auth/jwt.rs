//! JWT token validation
//!
//! Verifies HS256 access tokens minted by the identity provider. Token
//! issuance, refresh and revocation are out of scope here.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User role
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verify and decode a token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let validation = Validation::default();

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        _ => JwtError::DecodingFailed(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, ttl: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: uuid::Uuid::new_v4().to_string(),
            role: "borrower".to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_valid_token() {
        let token = make_token("test-secret", Duration::minutes(15));
        let claims = verify_token(&token, "test-secret").unwrap();
        assert_eq!(claims.role, "borrower");
    }

    #[test]
    fn test_verify_wrong_secret() {
        let token = make_token("test-secret", Duration::minutes(15));
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(JwtError::DecodingFailed(_))
        ));
    }

    #[test]
    fn test_verify_expired_token() {
        let token = make_token("test-secret", Duration::minutes(-5));
        assert!(matches!(
            verify_token(&token, "test-secret"),
            Err(JwtError::TokenExpired)
        ));
    }
}
