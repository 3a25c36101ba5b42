//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::catalog::CatalogService;
use crate::middleware::auth::JwtVerifier;
use crate::reservation::ReservationService;
use crate::token::ExchangeTokenService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub reservation_service: Arc<ReservationService>,
    pub token_service: Arc<ExchangeTokenService>,
    pub catalog_service: Arc<CatalogService>,
    pub jwt_verifier: JwtVerifier,
}

impl AppState {
    pub fn new(
        db_pool: PgPool,
        reservation_service: Arc<ReservationService>,
        token_service: Arc<ExchangeTokenService>,
        catalog_service: Arc<CatalogService>,
        jwt_verifier: JwtVerifier,
    ) -> Self {
        Self {
            db_pool,
            reservation_service,
            token_service,
            catalog_service,
            jwt_verifier,
        }
    }
}

impl FromRef<AppState> for Arc<ReservationService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.reservation_service.clone()
    }
}

impl FromRef<AppState> for Arc<ExchangeTokenService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.token_service.clone()
    }
}

impl FromRef<AppState> for Arc<CatalogService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.catalog_service.clone()
    }
}

impl FromRef<AppState> for JwtVerifier {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.jwt_verifier.clone()
    }
}
