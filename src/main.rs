//! GearBook Backend Server
//!
//! Main binary for the gearbook equipment-lending backend: wires up
//! configuration, the database pool, the reservation and exchange-token
//! services, the background expiry sweeps and the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use gearbook_server::catalog::CatalogService;
use gearbook_server::config::Config;
use gearbook_server::middleware::auth::JwtVerifier;
use gearbook_server::middleware::request_tracing;
use gearbook_server::notify::LogNotifier;
use gearbook_server::reservation::ReservationService;
use gearbook_server::routes::{health_routes, reservation_routes, token_routes};
use gearbook_server::state::AppState;
use gearbook_server::sweeper::{run_due_sweeps, run_expiry_sweeps, ExpirySweeper};
use gearbook_server::token::ExchangeTokenService;
use gearbook_server::{db, notify::NotificationPort};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting gearbook");

    // Database pool and migrations
    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    // Services
    let notifier: Arc<dyn NotificationPort> = Arc::new(LogNotifier);

    let reservation_service = Arc::new(ReservationService::new(
        db_pool.clone(),
        config.lifecycle,
        notifier.clone(),
    ));

    let token_service = Arc::new(ExchangeTokenService::new(
        db_pool.clone(),
        config.lifecycle,
        reservation_service.clone(),
    ));

    let catalog_service = Arc::new(CatalogService::new(db_pool.clone()));

    // Background sweeps
    let sweeper = Arc::new(ExpirySweeper::new(
        db_pool.clone(),
        config.lifecycle,
        notifier.clone(),
    ));
    tokio::spawn(run_expiry_sweeps(sweeper.clone(), config.sweep_interval_secs));
    tokio::spawn(run_due_sweeps(sweeper, config.notify_interval_secs));

    // Shared app state
    let app_state = AppState::new(
        db_pool,
        reservation_service,
        token_service,
        catalog_service,
        JwtVerifier::new(config.jwt_secret.clone()),
    );

    // CORS
    let cors = match &config.cors_allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .merge(health_routes())
        .merge(reservation_routes())
        .merge(token_routes())
        .layer(axum::middleware::from_fn(request_tracing))
        .layer(cors)
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
