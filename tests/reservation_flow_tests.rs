//! End-to-end reservation lifecycle tests
//!
//! These exercise the reservation and token services against a real
//! PostgreSQL instance (set TEST_DATABASE_URL). They are ignored by
//! default so the unit suite stays database-free.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gearbook_server::config::LifecycleConfig;
use gearbook_server::error::ApiError;
use gearbook_server::notify::LogNotifier;
use gearbook_server::reservation::{
    CreateReservationRequest, ReservationService, ReservationStatus,
};
use gearbook_server::token::ExchangeTokenService;

/// Helper to create a test database pool with migrations applied
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/gearbook_test".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn services(pool: &PgPool) -> (Arc<ReservationService>, ExchangeTokenService) {
    let lifecycle = LifecycleConfig::default();
    let reservations = Arc::new(ReservationService::new(
        pool.clone(),
        lifecycle,
        Arc::new(LogNotifier),
    ));
    let tokens = ExchangeTokenService::new(pool.clone(), lifecycle, reservations.clone());
    (reservations, tokens)
}

/// Insert a user row and return its id
async fn create_user(pool: &PgPool, role: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, name, role) VALUES ($1, $2, $3, $4::user_role)")
        .bind(id)
        .bind(format!("{}@example.com", id))
        .bind("Test User")
        .bind(role)
        .execute(pool)
        .await
        .expect("Failed to insert user");
    id
}

/// Insert an item owned by `lender` and return its id
async fn create_item(pool: &PgPool, lender: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO items (id, name, owned_by) VALUES ($1, $2, $3)")
        .bind(id)
        .bind("Camera")
        .bind(lender)
        .execute(pool)
        .await
        .expect("Failed to insert item");
    id
}

fn request_for(item_id: Uuid, start_days: i64, end_days: i64) -> CreateReservationRequest {
    let now = Utc::now();
    CreateReservationRequest {
        item_id,
        starts_at: now + Duration::days(start_days),
        ends_at: now + Duration::days(end_days),
        group_id: None,
        message: Some("Weekend shoot".to_string()),
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_full_pickup_and_return_flow() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    // Borrower requests the item for a five-day window.
    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .expect("creation should succeed");
    assert_eq!(reservation.lender_id, lender);
    assert_eq!(
        reservations.status_of(&reservation, Utc::now()),
        ReservationStatus::Pending
    );

    // Lender confirms with a candidate, borrower locks it in.
    let pickup_at = Utc::now() + Duration::hours(12);
    reservations
        .confirm(lender, reservation.id, vec![pickup_at])
        .await
        .expect("confirm should succeed");
    let confirmed = reservations
        .select_pickup(borrower, reservation.id, pickup_at)
        .await
        .expect("select_pickup should succeed");
    assert_eq!(
        reservations.status_of(&confirmed, Utc::now()),
        ReservationStatus::Confirmed
    );

    // Handoff via pickup token.
    let pickup_token = tokens
        .generate(lender, reservation.id)
        .await
        .expect("pickup token generation should succeed");
    let picked_up = tokens
        .redeem(borrower, &pickup_token.token)
        .await
        .expect("pickup redemption should succeed");
    assert!(picked_up.distribution_date.is_some());
    assert_eq!(
        reservations.status_of(&picked_up, Utc::now()),
        ReservationStatus::PickedUp
    );

    // Return via return token.
    let return_token = tokens
        .generate(lender, reservation.id)
        .await
        .expect("return token generation should succeed");
    let returned = tokens
        .redeem(borrower, &return_token.token)
        .await
        .expect("return redemption should succeed");
    assert!(returned.return_date.is_some());
    assert_eq!(
        reservations.status_of(&returned, Utc::now()),
        ReservationStatus::Returned
    );

    // Neither token can be redeemed again.
    for token in [&pickup_token.token, &return_token.token] {
        let err = tokens.redeem(borrower, token).await.unwrap_err();
        assert!(matches!(err, ApiError::TokenAlreadyUsed));
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_concurrent_overlapping_creation() {
    let pool = setup_test_db().await;
    let (reservations, _) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower_a = create_user(&pool, "borrower").await;
    let borrower_b = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let (a, b) = tokio::join!(
        reservations.create(borrower_a, request_for(item, 1, 5)),
        reservations.create(borrower_b, request_for(item, 3, 7)),
    );

    // Exactly one succeeds, the other gets an overlap validation error.
    assert_ne!(a.is_ok(), b.is_ok(), "exactly one creation must win");
    let err = if a.is_err() {
        a.unwrap_err()
    } else {
        b.unwrap_err()
    };
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_overlap_is_symmetric() {
    let pool = setup_test_db().await;
    let (reservations, _) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    reservations
        .create(borrower, request_for(item, 3, 7))
        .await
        .expect("first creation should succeed");

    // A window starting before and ending inside the existing one, one
    // starting inside and ending after, and windows merely touching a
    // boundary instant all conflict: (1,3) ends exactly at the existing
    // start, (7,9) starts exactly at the existing end.
    for (start, end) in [(1, 4), (6, 9), (3, 7), (1, 9), (1, 3), (7, 9)] {
        let other = create_user(&pool, "borrower").await;
        let err = reservations
            .create(other, request_for(item, start, end))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)), "[{start},{end}] must conflict");
    }

    // Fully disjoint windows pass.
    let other = create_user(&pool, "borrower").await;
    assert!(reservations
        .create(other, request_for(item, 8, 10))
        .await
        .is_ok());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_expired_token_redeems_as_token_expired() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .unwrap();
    let pickup_at = Utc::now() + Duration::hours(2);
    reservations
        .confirm(lender, reservation.id, vec![pickup_at])
        .await
        .unwrap();
    reservations
        .select_pickup(borrower, reservation.id, pickup_at)
        .await
        .unwrap();

    let issued = tokens.generate(lender, reservation.id).await.unwrap();

    // Push the token past its validity window.
    sqlx::query("UPDATE exchange_tokens SET expires_at = $1 WHERE token = $2")
        .bind(Utc::now() - Duration::minutes(1))
        .bind(&issued.token)
        .execute(&pool)
        .await
        .unwrap();

    // Expired is distinguished from used and from revoked.
    let err = tokens.redeem(borrower, &issued.token).await.unwrap_err();
    assert!(matches!(err, ApiError::TokenExpired));

    // The reservation itself is untouched.
    let current = reservations.get(borrower, reservation.id).await.unwrap();
    assert!(current.distribution_date.is_none());
    assert_eq!(
        reservations.status_of(&current, Utc::now()),
        ReservationStatus::Confirmed
    );
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_concurrent_token_redemption_single_winner() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);
    let tokens = Arc::new(tokens);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .unwrap();
    let pickup_at = Utc::now() + Duration::hours(2);
    reservations
        .confirm(lender, reservation.id, vec![pickup_at])
        .await
        .unwrap();
    reservations
        .select_pickup(borrower, reservation.id, pickup_at)
        .await
        .unwrap();

    let issued = tokens.generate(lender, reservation.id).await.unwrap();

    let (first, second) = tokio::join!(
        tokens.redeem(borrower, &issued.token),
        tokens.redeem(borrower, &issued.token),
    );

    // Exactly one success; the loser observes AlreadyUsed, never a second
    // silent success and never two failures.
    assert_ne!(first.is_ok(), second.is_ok());
    let err = if first.is_err() {
        first.unwrap_err()
    } else {
        second.unwrap_err()
    };
    assert!(matches!(err, ApiError::TokenAlreadyUsed));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_regeneration_invalidates_prior_token() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .unwrap();
    let pickup_at = Utc::now() + Duration::hours(2);
    reservations
        .confirm(lender, reservation.id, vec![pickup_at])
        .await
        .unwrap();
    reservations
        .select_pickup(borrower, reservation.id, pickup_at)
        .await
        .unwrap();

    let first = tokens.generate(lender, reservation.id).await.unwrap();
    let second = tokens.generate(lender, reservation.id).await.unwrap();
    assert_ne!(first.token, second.token);

    // The superseded token is dead even though it has not expired.
    let err = tokens.redeem(borrower, &first.token).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    // The fresh one still works.
    assert!(tokens.redeem(borrower, &second.token).await.is_ok());
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_token_generation_requires_lender_and_state() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .unwrap();

    // Borrower may not issue tokens.
    let err = tokens.generate(borrower, reservation.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    // Pending reservations have nothing to hand over yet.
    let err = tokens.generate(lender, reservation.id).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidState {
            observed: ReservationStatus::Pending,
            ..
        }
    ));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_cancel_forbidden_after_handoff() {
    let pool = setup_test_db().await;
    let (reservations, tokens) = services(&pool);

    let lender = create_user(&pool, "lender").await;
    let borrower = create_user(&pool, "borrower").await;
    let item = create_item(&pool, lender).await;

    let reservation = reservations
        .create(borrower, request_for(item, 1, 5))
        .await
        .unwrap();
    let pickup_at = Utc::now() + Duration::hours(2);
    reservations
        .confirm(lender, reservation.id, vec![pickup_at])
        .await
        .unwrap();
    reservations
        .select_pickup(borrower, reservation.id, pickup_at)
        .await
        .unwrap();

    let issued = tokens.generate(lender, reservation.id).await.unwrap();
    tokens.redeem(borrower, &issued.token).await.unwrap();

    // An active loan must be returned, not cancelled.
    let err = reservations.cancel(borrower, reservation.id).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::InvalidState {
            observed: ReservationStatus::PickedUp,
            ..
        }
    ));
}
