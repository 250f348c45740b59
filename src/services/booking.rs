use chrono::{NaiveDate, NaiveTime, Utc};

use crate::db::queries;
use crate::db::store::{Collection, RecordStore};
use crate::errors::AppError;
use crate::models::{ApprovalStatus, Booking, BookingStatus, NewBooking, Service};
use crate::services::access::Actor;

/// Checks the booking form before anything is looked up.
pub fn validate_request(request: &NewBooking) -> Result<(), AppError> {
    let missing: Vec<&str> = [
        ("scheduled_date", request.scheduled_date.as_str()),
        ("scheduled_time", request.scheduled_time.as_str()),
        ("address", request.address.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    }

    NaiveDate::parse_from_str(request.scheduled_date.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!(
            "scheduled_date must be YYYY-MM-DD, got {:?}",
            request.scheduled_date
        ))
    })?;
    NaiveTime::parse_from_str(request.scheduled_time.trim(), "%H:%M").map_err(|_| {
        AppError::Validation(format!(
            "scheduled_time must be HH:MM, got {:?}",
            request.scheduled_time
        ))
    })?;

    Ok(())
}

fn ensure_bookable(service: &Service) -> Result<(), AppError> {
    if !service.is_active {
        return Err(AppError::InvalidState(format!(
            "service {} is not currently offered",
            service.id
        )));
    }
    if service.base_price.is_sign_negative() {
        return Err(AppError::InvalidState(format!(
            "service {} has a negative price",
            service.id
        )));
    }
    Ok(())
}

/// Creates a pending booking for `customer`, priced at the service's base price.
pub async fn create_booking(
    store: &dyn RecordStore,
    customer: &Actor,
    request: NewBooking,
) -> Result<Booking, AppError> {
    validate_request(&request)?;

    let service = queries::get_service(store, &request.service_id).await?;
    ensure_bookable(&service)?;

    let provider = queries::get_provider(store, &request.provider_id).await?;
    if provider.status != ApprovalStatus::Approved {
        return Err(AppError::InvalidState(format!(
            "provider {} is not approved",
            provider.id
        )));
    }
    if !provider.is_available {
        return Err(AppError::InvalidState(format!(
            "provider {} is not taking bookings",
            provider.id
        )));
    }
    if !provider.offers(&service.id) {
        return Err(AppError::InvalidState(format!(
            "provider {} does not offer service {}",
            provider.id, service.id
        )));
    }

    let now = Utc::now();
    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        customer_id: customer.user_id().to_string(),
        provider_id: provider.id.clone(),
        service_id: service.id.clone(),
        service_name: Some(service.name.clone()),
        customer_name: Some(customer.user.label().to_string()),
        provider_name: Some(provider.display_name().to_string()),
        scheduled_date: request.scheduled_date.trim().to_string(),
        scheduled_time: request.scheduled_time.trim().to_string(),
        address: Some(request.address.trim().to_string()),
        notes: request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        status: BookingStatus::Pending,
        total_amount: service.base_price,
        rating: None,
        review: None,
        created_at: now,
        updated_at: Some(now),
        accepted_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancellation_reason: None,
    };

    let created = queries::create_as(store, Collection::Bookings, &booking).await?;
    tracing::info!(
        booking_id = %created.id,
        customer_id = %created.customer_id,
        provider_id = %created.provider_id,
        service_id = %created.service_id,
        "booking created"
    );
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    use crate::db::SqliteStore;
    use crate::models::{Role, User};

    fn request() -> NewBooking {
        NewBooking {
            service_id: "s1".to_string(),
            provider_id: "p1".to_string(),
            scheduled_date: "2025-06-16".to_string(),
            scheduled_time: "10:00".to_string(),
            address: "1 Main St".to_string(),
            notes: Some("  ".to_string()),
        }
    }

    fn customer() -> Actor {
        Actor {
            user: User {
                id: "c1".to_string(),
                email: "alice@example.com".to_string(),
                display_name: Some("Alice".to_string()),
                role: Role::Customer,
                created_at: Utc::now(),
            },
            role: Role::Customer,
            provider_id: None,
        }
    }

    async fn seeded(provider_status: &str, service_active: bool) -> SqliteStore {
        seeded_with(provider_status, service_active, json!([])).await
    }

    async fn seeded_with(
        provider_status: &str,
        service_active: bool,
        provider_services: serde_json::Value,
    ) -> SqliteStore {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .create(
                Collection::Services,
                json!({
                    "id": "s1",
                    "name": "House Cleaning",
                    "category_id": "cleaning",
                    "base_price": "79.99",
                    "is_active": service_active,
                    "created_at": "2025-01-01T00:00:00Z"
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .await
            .unwrap();
        store
            .create(
                Collection::Providers,
                json!({
                    "id": "p1",
                    "user_id": "u-p1",
                    "business_name": "Sparkle Co",
                    "status": provider_status,
                    "services": provider_services,
                    "created_at": "2025-01-01T00:00:00Z"
                })
                .as_object()
                .unwrap()
                .clone(),
            )
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let mut req = request();
        req.address = " ".to_string();
        req.scheduled_time = String::new();
        let err = validate_request(&req).unwrap_err();
        match err {
            AppError::Validation(msg) => {
                assert!(msg.contains("address"));
                assert!(msg.contains("scheduled_time"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_formats() {
        let mut req = request();
        req.scheduled_date = "16/06/2025".to_string();
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));

        let mut req = request();
        req.scheduled_time = "10am".to_string();
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_prices_from_service() {
        let store = seeded("approved", true).await;
        let booking = create_booking(&store, &customer(), request()).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_amount, Decimal::new(7999, 2));
        assert_eq!(booking.customer_id, "c1");
        assert_eq!(booking.service_name.as_deref(), Some("House Cleaning"));
        assert_eq!(booking.provider_name.as_deref(), Some("Sparkle Co"));
        assert_eq!(booking.customer_name.as_deref(), Some("Alice"));
        assert!(booking.notes.is_none());

        let stored = queries::get_booking(&store, &booking.id).await.unwrap();
        assert_eq!(stored, booking);
    }

    #[tokio::test]
    async fn test_create_requires_approved_provider() {
        let store = seeded("pending", true).await;
        let err = create_booking(&store, &customer(), request()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_inactive_service() {
        let store = seeded("approved", false).await;
        let err = create_booking(&store, &customer(), request()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_create_requires_provider_to_offer_service() {
        let store = seeded_with("approved", true, json!(["s2"])).await;
        let err = create_booking(&store, &customer(), request()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let store = seeded_with("approved", true, json!(["s2", "s1"])).await;
        assert!(create_booking(&store, &customer(), request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_unknown_service() {
        let store = seeded("approved", true).await;
        let mut req = request();
        req.service_id = "nope".to_string();
        let err = create_booking(&store, &customer(), req).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
