use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::store::{Collection, Filter, ListQuery, Record, RecordStore, StoreError};
use crate::errors::AppError;
use crate::models::{
    ApprovalStatus, Booking, BookingStatus, Provider, Review, Service, ServiceCategory, Session,
    User,
};

pub fn encode<T: Serialize>(value: &T) -> Result<Record, AppError> {
    match serde_json::to_value(value).map_err(StoreError::from)? {
        serde_json::Value::Object(record) => Ok(record),
        _ => Err(AppError::StoreUnavailable(
            "records must serialize to objects".to_string(),
        )),
    }
}

pub fn decode<T: DeserializeOwned>(record: Record) -> Result<T, AppError> {
    Ok(serde_json::from_value(serde_json::Value::Object(record)).map_err(StoreError::from)?)
}

/// Lists and decodes a collection. Records that no longer match the model are
/// skipped rather than failing the whole screen.
pub async fn list_as<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    query: &ListQuery,
) -> Result<Vec<T>, AppError> {
    let records = store.list(collection, query).await?;
    let mut items = Vec::with_capacity(records.len());
    for record in records {
        let id = record
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value(serde_json::Value::Object(record)) {
            Ok(item) => items.push(item),
            Err(e) => {
                tracing::warn!(collection = collection.as_str(), id = %id, error = %e, "skipping malformed record");
            }
        }
    }
    Ok(items)
}

pub async fn get_as<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    id: &str,
) -> Result<T, AppError> {
    match store.get(collection, id).await? {
        Some(record) => decode(record),
        None => Err(AppError::NotFound(format!("{} {id}", collection.as_str()))),
    }
}

pub async fn create_as<T: Serialize + DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
    value: &T,
) -> Result<T, AppError> {
    let created = store.create(collection, encode(value)?).await?;
    decode(created)
}

pub fn status_filter(statuses: &[BookingStatus]) -> Filter {
    let spellings: Vec<&str> = statuses
        .iter()
        .flat_map(|s| s.stored_spellings().iter().copied())
        .collect();
    Filter::any_of("status", &spellings)
}

// ── Bookings ──

pub async fn get_booking(store: &dyn RecordStore, id: &str) -> Result<Booking, AppError> {
    get_as(store, Collection::Bookings, id).await
}

pub async fn all_bookings(store: &dyn RecordStore) -> Result<Vec<Booking>, AppError> {
    list_as(store, Collection::Bookings, &ListQuery::new().newest_first()).await
}

pub async fn bookings_for_customer(
    store: &dyn RecordStore,
    customer_id: &str,
) -> Result<Vec<Booking>, AppError> {
    let query = ListQuery::new()
        .filter(Filter::eq("customer_id", customer_id))
        .newest_first();
    list_as(store, Collection::Bookings, &query).await
}

/// A provider's bookings, optionally narrowed to some statuses.
pub async fn bookings_for_provider(
    store: &dyn RecordStore,
    provider_id: &str,
    statuses: &[BookingStatus],
    limit: Option<usize>,
) -> Result<Vec<Booking>, AppError> {
    let mut filter = Filter::eq("provider_id", provider_id);
    if !statuses.is_empty() {
        filter = filter.and(status_filter(statuses));
    }
    let mut query = ListQuery::new().filter(filter).newest_first();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    list_as(store, Collection::Bookings, &query).await
}

// ── Reference records ──

pub async fn get_user(store: &dyn RecordStore, id: &str) -> Result<User, AppError> {
    get_as(store, Collection::Users, id).await
}

pub async fn all_users(store: &dyn RecordStore) -> Result<Vec<User>, AppError> {
    list_as(store, Collection::Users, &ListQuery::new().newest_first()).await
}

pub async fn get_provider(store: &dyn RecordStore, id: &str) -> Result<Provider, AppError> {
    get_as(store, Collection::Providers, id).await
}

pub async fn provider_for_user(
    store: &dyn RecordStore,
    user_id: &str,
) -> Result<Option<Provider>, AppError> {
    let query = ListQuery::new()
        .filter(Filter::eq("user_id", user_id))
        .limit(1);
    let mut found: Vec<Provider> = list_as(store, Collection::Providers, &query).await?;
    Ok(found.pop())
}

pub async fn all_providers(store: &dyn RecordStore) -> Result<Vec<Provider>, AppError> {
    list_as(store, Collection::Providers, &ListQuery::new().newest_first()).await
}

/// Approved, available providers offering `service_id`, best rated first.
/// Unrated providers come last; ties keep insertion order.
pub async fn providers_offering(
    store: &dyn RecordStore,
    service_id: &str,
) -> Result<Vec<Provider>, AppError> {
    let filter = Filter::eq("status", ApprovalStatus::Approved.as_str())
        .and(Filter::eq_or_missing("is_available", true));
    let providers: Vec<Provider> =
        list_as(store, Collection::Providers, &ListQuery::new().filter(filter)).await?;

    let mut offering: Vec<Provider> = providers
        .into_iter()
        .filter(|p| p.offers(service_id))
        .collect();
    offering.sort_by(|a, b| {
        let a = a.rating.unwrap_or(f64::NEG_INFINITY);
        let b = b.rating.unwrap_or(f64::NEG_INFINITY);
        b.total_cmp(&a)
    });
    Ok(offering)
}

pub async fn get_service(store: &dyn RecordStore, id: &str) -> Result<Service, AppError> {
    get_as(store, Collection::Services, id).await
}

/// Services in catalogue (insertion) order.
pub async fn all_services(store: &dyn RecordStore) -> Result<Vec<Service>, AppError> {
    list_as(store, Collection::Services, &ListQuery::new()).await
}

/// Services open for booking. A record without `is_active` counts as active.
pub async fn active_services(store: &dyn RecordStore) -> Result<Vec<Service>, AppError> {
    let query = ListQuery::new().filter(Filter::eq_or_missing("is_active", true));
    list_as(store, Collection::Services, &query).await
}

pub async fn all_categories(store: &dyn RecordStore) -> Result<Vec<ServiceCategory>, AppError> {
    list_as(store, Collection::Categories, &ListQuery::new()).await
}

pub async fn create_review(store: &dyn RecordStore, review: &Review) -> Result<Review, AppError> {
    create_as(store, Collection::Reviews, review).await
}

pub async fn get_session(
    store: &dyn RecordStore,
    token: &str,
) -> Result<Option<Session>, AppError> {
    match store.get(Collection::Sessions, token).await? {
        Some(record) => Ok(Some(decode(record)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use serde_json::json;

    fn booking_record(id: &str, provider: &str, status: &str) -> Record {
        json!({
            "id": id,
            "customer_id": "c1",
            "provider_id": provider,
            "service_id": "s1",
            "scheduled_date": "2025-06-16",
            "scheduled_time": "10:00",
            "status": status,
            "total_amount": 80,
            "created_at": "2025-06-01T09:00:00Z"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[tokio::test]
    async fn test_status_filter_matches_legacy_spelling() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .create(Collection::Bookings, booking_record("b1", "p1", "confirmed"))
            .await
            .unwrap();
        store
            .create(Collection::Bookings, booking_record("b2", "p1", "pending"))
            .await
            .unwrap();

        let jobs = bookings_for_provider(&store, "p1", &[BookingStatus::Accepted], None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "b1");
        assert_eq!(jobs[0].status, BookingStatus::Accepted);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .create(Collection::Bookings, booking_record("b1", "p1", "pending"))
            .await
            .unwrap();
        store
            .create(
                Collection::Bookings,
                json!({"id": "junk", "provider_id": "p1"}).as_object().unwrap().clone(),
            )
            .await
            .unwrap();

        let all = all_bookings(&store).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    async fn seed(store: &SqliteStore, collection: Collection, value: serde_json::Value) {
        store
            .create(collection, value.as_object().unwrap().clone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_active_services_include_records_without_flag() {
        let store = SqliteStore::open(":memory:").unwrap();
        let created = "2025-01-01T00:00:00Z";
        seed(&store, Collection::Services, json!({"id": "s1", "name": "A", "category_id": "c", "is_active": true, "created_at": created})).await;
        seed(&store, Collection::Services, json!({"id": "s2", "name": "B", "category_id": "c", "is_active": false, "created_at": created})).await;
        seed(&store, Collection::Services, json!({"id": "s3", "name": "C", "category_id": "c", "created_at": created})).await;

        let active = active_services(&store).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);
        assert!(active.iter().all(|s| s.is_active));
    }

    #[tokio::test]
    async fn test_providers_offering_sorted_by_rating() {
        let store = SqliteStore::open(":memory:").unwrap();
        let created = "2025-01-01T00:00:00Z";
        for body in [
            json!({"id": "p1", "user_id": "u1", "status": "approved", "rating": 4.2, "services": ["s1"], "created_at": created}),
            json!({"id": "p2", "user_id": "u2", "status": "approved", "services": ["s1", "s2"], "created_at": created}),
            json!({"id": "p3", "user_id": "u3", "status": "approved", "rating": 4.9, "created_at": created}),
            json!({"id": "p4", "user_id": "u4", "status": "pending", "rating": 5.0, "created_at": created}),
            json!({"id": "p5", "user_id": "u5", "status": "approved", "rating": 5.0, "is_available": false, "created_at": created}),
            json!({"id": "p6", "user_id": "u6", "status": "approved", "rating": 4.5, "services": ["s2"], "created_at": created}),
        ] {
            seed(&store, Collection::Providers, body).await;
        }

        let offering = providers_offering(&store, "s1").await.unwrap();
        let ids: Vec<&str> = offering.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1", "p2"]);
    }

    #[tokio::test]
    async fn test_get_missing_booking_is_not_found() {
        let store = SqliteStore::open(":memory:").unwrap();
        let err = get_booking(&store, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
