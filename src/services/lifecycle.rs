//! Booking status transitions.
//!
//! Every status change goes through [`transition`], which checks the edge
//! against the table below, checks the caller's role, stamps the matching
//! timestamp and writes the record only if nobody else moved it first.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::queries;
use crate::db::store::{Collection, Filter, Record, RecordStore, StoreError};
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Review, Role};

use BookingStatus::{Accepted, Cancelled, Completed, InProgress, Pending, Rejected};

const DECLINED_BY_PROVIDER: &str = "Declined by provider";

/// Roles allowed to take the edge `from -> to`, or `None` if the edge does not exist.
pub fn allowed_roles(from: BookingStatus, to: BookingStatus) -> Option<&'static [Role]> {
    match (from, to) {
        (Pending, Accepted) => Some(&[Role::Provider, Role::Admin]),
        (Pending, Rejected) => Some(&[Role::Provider, Role::Admin]),
        (Pending, Cancelled) => Some(&[Role::Customer, Role::Admin]),
        (Accepted, InProgress) => Some(&[Role::Provider]),
        (Accepted, Cancelled) => Some(&[Role::Customer, Role::Admin, Role::Provider]),
        (InProgress, Completed) => Some(&[Role::Provider]),
        // exceptional, e.g. a dispute
        (InProgress, Cancelled) => Some(&[Role::Admin]),
        _ => None,
    }
}

/// Statuses `role` may move a booking to from `from`.
pub fn allowed_next(from: BookingStatus, role: Role) -> Vec<BookingStatus> {
    BookingStatus::ALL
        .into_iter()
        .filter(|to| allowed_roles(from, *to).is_some_and(|roles| roles.contains(&role)))
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionMeta {
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

/// Computes the booking after `role` moves it to `target`. Does not touch the store.
pub fn apply_transition(
    booking: &Booking,
    role: Role,
    target: BookingStatus,
    meta: &TransitionMeta,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    let from = booking.status;
    let roles = allowed_roles(from, target).ok_or(AppError::InvalidTransition { from, to: target })?;
    if !roles.contains(&role) {
        return Err(AppError::Forbidden(format!(
            "{role} cannot move a booking from {from} to {target}"
        )));
    }

    let mut next = booking.clone();
    next.status = target;
    next.updated_at = Some(now);

    match target {
        Accepted => next.accepted_at = Some(now),
        InProgress => next.started_at = Some(now),
        Completed => next.completed_at = Some(now),
        Cancelled | Rejected => {
            next.cancelled_at = Some(now);
            next.cancellation_reason = meta
                .cancellation_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .or_else(|| (target == Rejected).then(|| DECLINED_BY_PROVIDER.to_string()));
        }
        // no edge leads back to pending
        Pending => {}
    }

    Ok(next)
}

/// The fields a transition to `after.status` writes, as a store patch.
fn transition_patch(after: &Booking) -> Record {
    let stamp = |t: Option<DateTime<Utc>>| t.map(|t| json!(t)).unwrap_or(Value::Null);
    let mut patch = Record::new();
    patch.insert("status".to_string(), json!(after.status));
    patch.insert("updated_at".to_string(), stamp(after.updated_at));

    match after.status {
        Accepted => {
            patch.insert("accepted_at".to_string(), stamp(after.accepted_at));
        }
        InProgress => {
            patch.insert("started_at".to_string(), stamp(after.started_at));
        }
        Completed => {
            patch.insert("completed_at".to_string(), stamp(after.completed_at));
        }
        Cancelled | Rejected => {
            patch.insert("cancelled_at".to_string(), stamp(after.cancelled_at));
            if let Some(reason) = &after.cancellation_reason {
                patch.insert("cancellation_reason".to_string(), json!(reason));
            }
        }
        Pending => {}
    }
    patch
}

/// Moves `booking` to `target` on behalf of `role` and persists it.
///
/// The write is conditional on the stored status still being the one
/// `booking` was read with. If another actor got there first the booking is
/// re-read and the edge is judged against what is actually stored.
pub async fn transition(
    store: &dyn RecordStore,
    booking: &Booking,
    role: Role,
    target: BookingStatus,
    meta: &TransitionMeta,
) -> Result<Booking, AppError> {
    let next = apply_transition(booking, role, target, meta, Utc::now())?;
    let guard = queries::status_filter(&[booking.status]);

    match store
        .update_if(Collection::Bookings, &booking.id, &guard, transition_patch(&next))
        .await
    {
        Ok(record) => {
            tracing::info!(
                booking_id = %booking.id,
                from = %booking.status,
                to = %target,
                role = %role,
                "booking status changed"
            );
            queries::decode(record)
        }
        Err(StoreError::Conflict { .. }) => {
            let current = queries::get_booking(store, &booking.id).await?;
            tracing::warn!(
                booking_id = %booking.id,
                expected = %booking.status,
                actual = %current.status,
                "booking changed concurrently"
            );
            Err(AppError::InvalidTransition {
                from: current.status,
                to: target,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Checks and applies a rating to `booking`. Does not touch the store.
pub fn apply_rating(
    booking: &Booking,
    rating: u8,
    review: Option<String>,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    if booking.status != Completed {
        return Err(AppError::InvalidState(format!(
            "only completed bookings can be rated, this one is {}",
            booking.status
        )));
    }
    if booking.rating.is_some() {
        return Err(AppError::AlreadyRated);
    }
    if !(1..=5).contains(&rating) {
        return Err(AppError::Validation(format!(
            "rating must be between 1 and 5, got {rating}"
        )));
    }

    let mut next = booking.clone();
    next.rating = Some(rating);
    next.review = review
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    next.updated_at = Some(now);
    Ok(next)
}

/// Rates a completed booking once and records the matching review.
///
/// The review is written first and removed again if the booking cannot
/// take the rating, so a rated booking always has its review.
pub async fn attach_rating(
    store: &dyn RecordStore,
    booking: &Booking,
    rating: u8,
    review: Option<String>,
) -> Result<Booking, AppError> {
    let now = Utc::now();
    let next = apply_rating(booking, rating, review, now)?;

    let review = Review {
        id: uuid::Uuid::new_v4().to_string(),
        booking_id: booking.id.clone(),
        customer_id: booking.customer_id.clone(),
        provider_id: booking.provider_id.clone(),
        rating,
        comment: next.review.clone(),
        created_at: now,
    };
    let review = queries::create_review(store, &review).await?;

    let mut patch = Record::new();
    patch.insert("rating".to_string(), json!(rating));
    patch.insert("updated_at".to_string(), json!(now));
    if let Some(text) = &next.review {
        patch.insert("review".to_string(), json!(text));
    }
    let guard = queries::status_filter(&[Completed]).and(Filter::is_null("rating"));

    let updated = store
        .update_if(Collection::Bookings, &booking.id, &guard, patch)
        .await;
    let record = match updated {
        Ok(record) => record,
        Err(err) => {
            discard_review(store, &review).await;
            if !matches!(err, StoreError::Conflict { .. }) {
                return Err(err.into());
            }
            let current = queries::get_booking(store, &booking.id).await?;
            // re-run the checks against what is stored to report the right error
            apply_rating(&current, rating, None, now)?;
            return Err(AppError::AlreadyRated);
        }
    };

    tracing::info!(booking_id = %booking.id, rating, "booking rated");
    queries::decode(record)
}

async fn discard_review(store: &dyn RecordStore, review: &Review) {
    if let Err(e) = store.delete(Collection::Reviews, &review.id).await {
        tracing::warn!(
            review_id = %review.id,
            booking_id = %review.booking_id,
            error = %e,
            "could not remove review for unrated booking"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use rust_decimal::Decimal;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: "b1".to_string(),
            customer_id: "c1".to_string(),
            provider_id: "p1".to_string(),
            service_id: "s1".to_string(),
            service_name: Some("House Cleaning".to_string()),
            customer_name: Some("Alice".to_string()),
            provider_name: Some("Sparkle Co".to_string()),
            scheduled_date: "2025-06-16".to_string(),
            scheduled_time: "10:00".to_string(),
            address: Some("1 Main St".to_string()),
            notes: None,
            status,
            total_amount: Decimal::new(7500, 2),
            rating: None,
            review: None,
            created_at: Utc::now(),
            updated_at: None,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
        }
    }

    async fn stored(status: BookingStatus) -> (SqliteStore, Booking) {
        let store = SqliteStore::open(":memory:").unwrap();
        let b = booking(status);
        queries::create_as(&store, Collection::Bookings, &b).await.unwrap();
        (store, b)
    }

    const ROLES: [Role; 3] = [Role::Customer, Role::Provider, Role::Admin];

    #[test]
    fn test_transition_only_reaches_table_edges() {
        let meta = TransitionMeta::default();
        for from in BookingStatus::ALL {
            for to in BookingStatus::ALL {
                for role in ROLES {
                    let result = apply_transition(&booking(from), role, to, &meta, Utc::now());
                    match allowed_roles(from, to) {
                        Some(roles) if roles.contains(&role) => {
                            assert_eq!(result.unwrap().status, to)
                        }
                        Some(_) => assert!(matches!(result, Err(AppError::Forbidden(_)))),
                        None => assert!(matches!(
                            result,
                            Err(AppError::InvalidTransition { .. })
                        )),
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let meta = TransitionMeta::default();
        for from in [Completed, Cancelled, Rejected] {
            for to in BookingStatus::ALL {
                for role in ROLES {
                    let result = apply_transition(&booking(from), role, to, &meta, Utc::now());
                    assert!(
                        matches!(result, Err(AppError::InvalidTransition { .. })),
                        "{from} -> {to} by {role} should be invalid"
                    );
                }
            }
        }
    }

    #[test]
    fn test_forward_path_stamps_one_timestamp_each() {
        let meta = TransitionMeta::default();
        let t1 = Utc::now();
        let accepted = apply_transition(&booking(Pending), Role::Provider, Accepted, &meta, t1).unwrap();
        assert_eq!(accepted.accepted_at, Some(t1));
        assert!(accepted.started_at.is_none());

        let t2 = t1 + chrono::Duration::minutes(5);
        let started = apply_transition(&accepted, Role::Provider, InProgress, &meta, t2).unwrap();
        assert_eq!(started.accepted_at, Some(t1));
        assert_eq!(started.started_at, Some(t2));

        let t3 = t2 + chrono::Duration::minutes(60);
        let done = apply_transition(&started, Role::Provider, Completed, &meta, t3).unwrap();
        assert_eq!(done.accepted_at, Some(t1));
        assert_eq!(done.started_at, Some(t2));
        assert_eq!(done.completed_at, Some(t3));
        assert!(done.cancelled_at.is_none());
        assert_eq!(done.total_amount, Decimal::new(7500, 2));
    }

    #[test]
    fn test_reject_defaults_reason() {
        let rejected = apply_transition(
            &booking(Pending),
            Role::Provider,
            Rejected,
            &TransitionMeta::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(rejected.cancelled_at.is_some());
        assert_eq!(rejected.cancellation_reason.as_deref(), Some(DECLINED_BY_PROVIDER));

        let meta = TransitionMeta {
            cancellation_reason: Some("  Plans changed ".to_string()),
        };
        let cancelled =
            apply_transition(&booking(Pending), Role::Customer, Cancelled, &meta, Utc::now()).unwrap();
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Plans changed"));
    }

    #[test]
    fn test_allowed_next() {
        assert_eq!(allowed_next(Pending, Role::Customer), vec![Cancelled]);
        assert_eq!(allowed_next(Pending, Role::Provider), vec![Accepted, Rejected]);
        assert_eq!(allowed_next(InProgress, Role::Admin), vec![Cancelled]);
        assert!(allowed_next(Completed, Role::Admin).is_empty());
    }

    #[tokio::test]
    async fn test_provider_accepts_then_customer_cannot_start() {
        let (store, pending) = stored(Pending).await;
        let meta = TransitionMeta::default();

        let accepted = transition(&store, &pending, Role::Provider, Accepted, &meta)
            .await
            .unwrap();
        assert_eq!(accepted.status, Accepted);
        assert!(accepted.accepted_at.is_some());

        let persisted = queries::get_booking(&store, "b1").await.unwrap();
        assert_eq!(persisted.status, Accepted);
        assert!(persisted.accepted_at.is_some());

        let err = transition(&store, &accepted, Role::Customer, InProgress, &meta)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_admin_cannot_cancel_completed() {
        let (store, completed) = stored(Completed).await;
        let err = transition(&store, &completed, Role::Admin, Cancelled, &TransitionMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: Completed,
                to: Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_stale_read_loses_race() {
        let (store, pending) = stored(Pending).await;
        let meta = TransitionMeta::default();

        // customer cancels first
        transition(&store, &pending, Role::Customer, Cancelled, &meta)
            .await
            .unwrap();

        // provider still holds the pending copy
        let err = transition(&store, &pending, Role::Provider, Accepted, &meta)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: Cancelled,
                to: Accepted
            }
        ));
        let persisted = queries::get_booking(&store, "b1").await.unwrap();
        assert_eq!(persisted.status, Cancelled);
        assert!(persisted.accepted_at.is_none());
    }

    #[tokio::test]
    async fn test_rating_once_and_only_when_completed() {
        let (store, pending) = stored(Pending).await;
        let err = attach_rating(&store, &pending, 5, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let (store, completed) = stored(Completed).await;
        let err = attach_rating(&store, &completed, 6, None).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let rated = attach_rating(&store, &completed, 4, Some("Great job".to_string()))
            .await
            .unwrap();
        assert_eq!(rated.rating, Some(4));
        assert_eq!(rated.review.as_deref(), Some("Great job"));

        // same stale copy, second attempt
        let err = attach_rating(&store, &completed, 5, None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyRated));

        let err = attach_rating(&store, &rated, 5, None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyRated));

        let reviews: Vec<Review> = queries::list_as(
            &store,
            Collection::Reviews,
            &crate::db::store::ListQuery::new(),
        )
        .await
        .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating, 4);
        assert_eq!(reviews[0].provider_id, "p1");
    }

    #[tokio::test]
    async fn test_failed_rating_leaves_no_review() {
        let (store, completed) = stored(Completed).await;
        store.delete(Collection::Bookings, "b1").await.unwrap();

        let err = attach_rating(&store, &completed, 5, Some("Lovely".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let reviews: Vec<Review> = queries::list_as(
            &store,
            Collection::Reviews,
            &crate::db::store::ListQuery::new(),
        )
        .await
        .unwrap();
        assert!(reviews.is_empty());
    }
}
