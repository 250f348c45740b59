use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Provider, Role, Service};
use crate::services::lifecycle::{self, TransitionMeta};
use crate::state::AppState;

use super::authenticate;

// GET /api/bookings/:id
#[derive(Serialize)]
pub struct TrackingResponse {
    booking: Booking,
    service: Option<Service>,
    provider: Option<Provider>,
    /// Statuses the caller may move this booking to.
    next: Vec<BookingStatus>,
}

/// Looks up a reference record that may have been removed since booking.
async fn optional<T>(
    lookup: impl std::future::Future<Output = Result<T, AppError>>,
) -> Result<Option<T>, AppError> {
    match lookup.await {
        Ok(value) => Ok(Some(value)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn track(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TrackingResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let store = state.store.as_ref();

    let booking = queries::get_booking(store, &id).await?;
    actor.ensure_party(&booking)?;

    let service = optional(queries::get_service(store, &booking.service_id)).await?;
    let provider = optional(queries::get_provider(store, &booking.provider_id)).await?;
    let next = lifecycle::allowed_next(booking.status, actor.role);

    Ok(Json(TrackingResponse {
        booking,
        service,
        provider,
        next,
    }))
}

// POST /api/bookings/:id/transition
#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: BookingStatus,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
}

pub async fn transition(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let store = state.store.as_ref();

    let booking = queries::get_booking(store, &id).await?;
    actor.ensure_party(&booking)?;

    let meta = TransitionMeta {
        cancellation_reason: body.cancellation_reason,
    };
    let updated = lifecycle::transition(store, &booking, actor.role, body.status, &meta).await?;
    Ok(Json(updated))
}

// POST /api/bookings/:id/rating
#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
    #[serde(default)]
    pub review: Option<String>,
}

pub async fn rate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RatingRequest>,
) -> Result<Json<Booking>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    actor.require(Role::Customer)?;
    let store = state.store.as_ref();

    let booking = queries::get_booking(store, &id).await?;
    actor.ensure_party(&booking)?;

    let rated = lifecycle::attach_rating(store, &booking, body.rating, body.review).await?;
    Ok(Json(rated))
}
