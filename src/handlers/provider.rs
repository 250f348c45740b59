use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus};
use crate::services::analytics::{self, Earnings, Period, ProviderProfile, ProviderStats};
use crate::state::AppState;

use super::authenticate;

// GET /api/provider/requests
pub async fn requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let provider_id = actor.require_provider()?;

    let pending = queries::bookings_for_provider(
        state.store.as_ref(),
        provider_id,
        &[BookingStatus::Pending],
        None,
    )
    .await?;
    Ok(Json(pending))
}

// GET /api/provider/jobs
pub async fn jobs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Booking>>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let provider_id = actor.require_provider()?;

    let active = queries::bookings_for_provider(
        state.store.as_ref(),
        provider_id,
        &[BookingStatus::Accepted, BookingStatus::InProgress],
        None,
    )
    .await?;
    Ok(Json(active))
}

// GET /api/provider/dashboard
#[derive(Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    stats: ProviderStats,
    profile: ProviderProfile,
    pending_requests: usize,
    recent_jobs: Vec<Booking>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let provider_id = actor.require_provider()?;

    let store = state.store.as_ref();

    let provider = queries::get_provider(store, provider_id).await?;
    let all = queries::bookings_for_provider(store, provider_id, &[], None).await?;
    let pending_requests = all
        .iter()
        .filter(|b| b.status == BookingStatus::Pending)
        .count();

    Ok(Json(DashboardResponse {
        stats: analytics::provider_stats(&all, Utc::now()),
        profile: analytics::provider_profile(&provider, &all),
        pending_requests,
        recent_jobs: all.into_iter().take(5).collect(),
    }))
}

// GET /api/provider/earnings
#[derive(Deserialize)]
pub struct EarningsQuery {
    pub period: Option<String>,
}

#[derive(Serialize)]
pub struct EarningsResponse {
    summary: Earnings,
    period: String,
    jobs: Vec<Booking>,
}

pub async fn earnings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<EarningsQuery>,
) -> Result<Json<EarningsResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    let provider_id = actor.require_provider()?;

    let period_name = query
        .period
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("all");
    let period = Period::parse(period_name)
        .ok_or_else(|| AppError::Validation(format!("unknown period {period_name:?}")))?;

    let completed = queries::bookings_for_provider(
        state.store.as_ref(),
        provider_id,
        &[BookingStatus::Completed],
        None,
    )
    .await?;
    let now = Utc::now();

    Ok(Json(EarningsResponse {
        summary: analytics::earnings(&completed, now),
        period: period_name.to_string(),
        jobs: analytics::filter_by_period(&completed, period, now),
    }))
}
