use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, NewBooking, Role};
use crate::services::analytics::{self, BookingTab, CustomerStats};
use crate::services::booking;
use crate::state::AppState;

use super::authenticate;

// GET /api/customer/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub tab: Option<String>,
}

#[derive(Serialize)]
pub struct TabCounts {
    all: usize,
    active: usize,
    completed: usize,
    cancelled: usize,
}

#[derive(Serialize)]
pub struct BookingsResponse {
    counts: TabCounts,
    bookings: Vec<Booking>,
}

fn parse_tab(tab: Option<&str>) -> Result<BookingTab, AppError> {
    match tab.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(BookingTab::All),
        Some(t) => BookingTab::parse(t)
            .ok_or_else(|| AppError::Validation(format!("unknown tab {t:?}"))),
    }
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<BookingsResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    actor.require(Role::Customer)?;
    let tab = parse_tab(query.tab.as_deref())?;

    let mine = queries::bookings_for_customer(state.store.as_ref(), actor.user_id()).await?;
    let count = |t| analytics::partition_tab(&mine, t).len();
    let counts = TabCounts {
        all: mine.len(),
        active: count(BookingTab::Active),
        completed: count(BookingTab::Completed),
        cancelled: count(BookingTab::Cancelled),
    };

    Ok(Json(BookingsResponse {
        counts,
        bookings: analytics::partition_tab(&mine, tab),
    }))
}

// POST /api/customer/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let actor = authenticate(&state, &headers).await?;
    actor.require(Role::Customer)?;

    let created = booking::create_booking(state.store.as_ref(), &actor, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// GET /api/customer/stats
#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    stats: CustomerStats,
    recent_bookings: Vec<Booking>,
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    actor.require(Role::Customer)?;

    let mine = queries::bookings_for_customer(state.store.as_ref(), actor.user_id()).await?;
    Ok(Json(StatsResponse {
        stats: analytics::customer_stats(&mine),
        recent_bookings: mine.into_iter().take(3).collect(),
    }))
}
