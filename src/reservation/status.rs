//! Pure status derivation for reservations
//!
//! The logical status is always a function of the commitment timestamps and
//! the current instant. The stored `cached_status` column is a denormalized
//! index for querying; every decision re-derives status through here.

use chrono::{DateTime, Utc};

use crate::config::LifecycleConfig;

use super::{Reservation, ReservationStatus};

/// Derive the logical status of a reservation at `now`.
///
/// Evaluated in strict priority order, first match wins. Recorded physical
/// facts (handoff, return) dominate time-based expiry: a reservation that
/// was collected late but *was* collected never reads as expired.
pub fn calculate_status(
    reservation: &Reservation,
    lifecycle: &LifecycleConfig,
    now: DateTime<Utc>,
) -> ReservationStatus {
    if reservation.deleted_at.is_some() {
        return reservation
            .cancel_reason
            .map(|r| r.status())
            // Soft-deleted rows always carry a reason; rejected is the
            // conservative reading if one is ever missing.
            .unwrap_or(ReservationStatus::Rejected);
    }

    if reservation.return_date.is_some() {
        return ReservationStatus::Returned;
    }

    if reservation.distribution_date.is_some() {
        return ReservationStatus::PickedUp;
    }

    if let Some(confirmed_pickup) = reservation.confirmed_pickup {
        if now > confirmed_pickup + lifecycle.confirmed_ttl() {
            return ReservationStatus::Expired;
        }
        return ReservationStatus::Confirmed;
    }

    if now > reservation.created_at + lifecycle.pending_ttl() {
        return ReservationStatus::Cancelled;
    }

    ReservationStatus::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::CancelReason;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn base_reservation(created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            lender_id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            group_id: None,
            starts_at: created_at + Duration::days(1),
            ends_at: created_at + Duration::days(5),
            message: None,
            proposed_pickups: vec![],
            proposed_by_id: None,
            confirmed_pickup: None,
            distribution_date: None,
            return_date: None,
            created_at,
            deleted_at: None,
            cancel_reason: None,
            cached_status: "pending".to_string(),
            due_soon_notified_on: None,
            overdue_notified_on: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn fresh_reservation_is_pending() {
        let r = base_reservation(t0());
        let status = calculate_status(&r, &LifecycleConfig::default(), t0());
        assert_eq!(status, ReservationStatus::Pending);
    }

    #[test]
    fn auto_cancel_boundary() {
        let r = base_reservation(t0());
        let lifecycle = LifecycleConfig::default();

        let just_before = t0() + Duration::hours(23) + Duration::minutes(59);
        assert_eq!(
            calculate_status(&r, &lifecycle, just_before),
            ReservationStatus::Pending
        );

        let just_after = t0() + Duration::hours(24) + Duration::seconds(1);
        assert_eq!(
            calculate_status(&r, &lifecycle, just_after),
            ReservationStatus::Cancelled
        );
    }

    #[test]
    fn auto_expire_boundary() {
        let mut r = base_reservation(t0());
        r.confirmed_pickup = Some(t0() + Duration::hours(2));
        let lifecycle = LifecycleConfig::default();
        let confirmed = r.confirmed_pickup.unwrap();

        assert_eq!(
            calculate_status(&r, &lifecycle, confirmed + Duration::hours(23)),
            ReservationStatus::Confirmed
        );
        assert_eq!(
            calculate_status(&r, &lifecycle, confirmed + Duration::hours(25)),
            ReservationStatus::Expired
        );

        // Once the handoff happened, expiry no longer applies.
        r.distribution_date = Some(confirmed + Duration::hours(26));
        assert_eq!(
            calculate_status(&r, &lifecycle, confirmed + Duration::hours(48)),
            ReservationStatus::PickedUp
        );
    }

    #[test]
    fn return_dominates_all_time_based_states() {
        let mut r = base_reservation(t0());
        r.confirmed_pickup = Some(t0() + Duration::hours(1));
        r.distribution_date = Some(t0() + Duration::hours(2));
        r.return_date = Some(t0() + Duration::days(30));

        // Far past every timeout, the physical fact still wins.
        let way_later = t0() + Duration::days(365);
        assert_eq!(
            calculate_status(&r, &LifecycleConfig::default(), way_later),
            ReservationStatus::Returned
        );
    }

    #[test]
    fn soft_delete_reads_as_tagged_reason() {
        let lifecycle = LifecycleConfig::default();

        for (reason, expected) in [
            (CancelReason::Rejected, ReservationStatus::Rejected),
            (CancelReason::Cancelled, ReservationStatus::Cancelled),
            (CancelReason::AutoExpired, ReservationStatus::Expired),
        ] {
            let mut r = base_reservation(t0());
            r.deleted_at = Some(t0() + Duration::hours(1));
            r.cancel_reason = Some(reason);
            assert_eq!(calculate_status(&r, &lifecycle, t0()), expected);
        }
    }

    #[test]
    fn soft_delete_dominates_return_date() {
        // Priority order: deleted_at is checked before return_date.
        let mut r = base_reservation(t0());
        r.return_date = Some(t0() + Duration::days(4));
        r.deleted_at = Some(t0() + Duration::days(5));
        r.cancel_reason = Some(CancelReason::Rejected);
        assert_eq!(
            calculate_status(&r, &LifecycleConfig::default(), t0() + Duration::days(6)),
            ReservationStatus::Rejected
        );
    }

    #[test]
    fn independent_ttls_apply_separately() {
        let lifecycle = LifecycleConfig {
            pending_ttl_hours: 48,
            confirmed_ttl_hours: 6,
            ..LifecycleConfig::default()
        };

        let r = base_reservation(t0());
        assert_eq!(
            calculate_status(&r, &lifecycle, t0() + Duration::hours(30)),
            ReservationStatus::Pending
        );

        let mut confirmed = base_reservation(t0());
        confirmed.confirmed_pickup = Some(t0());
        assert_eq!(
            calculate_status(&confirmed, &lifecycle, t0() + Duration::hours(7)),
            ReservationStatus::Expired
        );
    }
}
