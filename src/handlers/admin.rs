use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::queries;
use crate::db::store::{Collection, Filter, Record, StoreError};
use crate::errors::AppError;
use crate::models::{ApprovalStatus, Booking, BookingStatus, Provider, Role, Service, User};
use crate::services::access::Actor;
use crate::services::analytics::{self, AdminAnalytics, AdminOverview};
use crate::services::filtering::{self, CategoryFilter};
use crate::state::AppState;

use super::authenticate;

const TOP_SERVICES: usize = 5;

async fn admin(state: &AppState, headers: &HeaderMap) -> Result<Actor, AppError> {
    let actor = authenticate(state, headers).await?;
    actor.require(Role::Admin)?;
    Ok(actor)
}

#[derive(Deserialize)]
pub struct FilterQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub role: Option<String>,
    pub category: Option<String>,
}

impl FilterQuery {
    fn text(&self) -> &str {
        self.q.as_deref().unwrap_or_default()
    }
}

// GET /api/admin/overview
#[derive(Serialize)]
pub struct OverviewResponse {
    #[serde(flatten)]
    overview: AdminOverview,
    recent_bookings: Vec<Booking>,
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<OverviewResponse>, AppError> {
    admin(&state, &headers).await?;
    let store = state.store.as_ref();

    let users = queries::all_users(store).await?;
    let providers = queries::all_providers(store).await?;
    let bookings = queries::all_bookings(store).await?;

    Ok(Json(OverviewResponse {
        overview: analytics::admin_overview(&users, &providers, &bookings),
        recent_bookings: bookings.into_iter().take(5).collect(),
    }))
}

// GET /api/admin/analytics
#[derive(Serialize)]
pub struct AnalyticsResponse {
    #[serde(flatten)]
    analytics: AdminAnalytics,
    by_status: BTreeMap<BookingStatus, usize>,
}

pub async fn analytics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AnalyticsResponse>, AppError> {
    admin(&state, &headers).await?;
    let store = state.store.as_ref();

    let bookings = queries::all_bookings(store).await?;
    let services = queries::all_services(store).await?;

    Ok(Json(AnalyticsResponse {
        analytics: analytics::admin_analytics(&bookings, &services, TOP_SERVICES),
        by_status: analytics::count_by_status(&bookings),
    }))
}

// GET /api/admin/bookings
#[derive(Serialize)]
pub struct BookingsResponse {
    counts: BTreeMap<BookingStatus, usize>,
    bookings: Vec<Booking>,
}

pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FilterQuery>,
) -> Result<Json<BookingsResponse>, AppError> {
    admin(&state, &headers).await?;

    let bookings = queries::all_bookings(state.store.as_ref()).await?;
    // accept the legacy spelling of a status as the filter value
    let status = match CategoryFilter::parse(query.status.as_deref()) {
        CategoryFilter::Only(v) => CategoryFilter::Only(
            BookingStatus::parse(&v)
                .map(|s| s.as_str().to_string())
                .unwrap_or(v),
        ),
        all => all,
    };

    Ok(Json(BookingsResponse {
        counts: analytics::count_by_status(&bookings),
        bookings: filtering::apply(&bookings, query.text(), &status),
    }))
}

// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    admin(&state, &headers).await?;

    let users = queries::all_users(state.store.as_ref()).await?;
    let role = CategoryFilter::parse(query.role.as_deref());
    Ok(Json(filtering::apply(&users, query.text(), &role)))
}

// DELETE /api/admin/users/:id
#[derive(Serialize)]
pub struct DeletedUser {
    id: String,
    sessions_revoked: usize,
}

/// Removes the account and signs it out everywhere. Its bookings stay.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DeletedUser>, AppError> {
    let actor = admin(&state, &headers).await?;
    if actor.user_id() == id {
        return Err(AppError::InvalidState(
            "admins cannot delete their own account".to_string(),
        ));
    }

    let user = queries::get_user(state.store.as_ref(), &id).await?;
    let sessions_revoked = state.auth.revoke_user(&user.id).await?;
    state.store.delete(Collection::Users, &user.id).await?;

    tracing::info!(user_id = %user.id, role = %user.role, sessions_revoked, "user deleted");
    Ok(Json(DeletedUser {
        id: user.id,
        sessions_revoked,
    }))
}

// GET /api/admin/providers
#[derive(Serialize)]
pub struct ProvidersResponse {
    counts: BTreeMap<&'static str, usize>,
    providers: Vec<Provider>,
}

pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FilterQuery>,
) -> Result<Json<ProvidersResponse>, AppError> {
    admin(&state, &headers).await?;

    let providers = queries::all_providers(state.store.as_ref()).await?;
    let mut counts: BTreeMap<&'static str, usize> = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
    ]
    .into_iter()
    .map(|s| (s.as_str(), 0))
    .collect();
    for provider in &providers {
        *counts.entry(provider.status.as_str()).or_default() += 1;
    }

    let status = CategoryFilter::parse(query.status.as_deref());
    Ok(Json(ProvidersResponse {
        counts,
        providers: filtering::apply(&providers, query.text(), &status),
    }))
}

async fn decide_provider(
    state: &AppState,
    id: &str,
    decision: ApprovalStatus,
) -> Result<Provider, AppError> {
    let mut patch = Record::new();
    patch.insert("status".to_string(), json!(decision));

    let guard = Filter::eq_or_missing("status", ApprovalStatus::Pending.as_str());
    let record = match state
        .store
        .update_if(Collection::Providers, id, &guard, patch)
        .await
    {
        Ok(record) => record,
        Err(StoreError::Conflict { .. }) => {
            let current = queries::get_provider(state.store.as_ref(), id).await?;
            return Err(AppError::InvalidState(format!(
                "provider {id} is already {}",
                current.status.as_str()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(provider_id = %id, status = decision.as_str(), "provider reviewed");
    queries::decode(record)
}

// POST /api/admin/providers/:id/approve
pub async fn approve_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Provider>, AppError> {
    admin(&state, &headers).await?;
    Ok(Json(decide_provider(&state, &id, ApprovalStatus::Approved).await?))
}

// POST /api/admin/providers/:id/reject
pub async fn reject_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Provider>, AppError> {
    admin(&state, &headers).await?;
    Ok(Json(decide_provider(&state, &id, ApprovalStatus::Rejected).await?))
}

// GET /api/admin/services
#[derive(Serialize)]
pub struct ServicesResponse {
    active: usize,
    inactive: usize,
    services: Vec<Service>,
}

pub async fn list_services(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FilterQuery>,
) -> Result<Json<ServicesResponse>, AppError> {
    admin(&state, &headers).await?;

    let services = queries::all_services(state.store.as_ref()).await?;
    let active = services.iter().filter(|s| s.is_active).count();
    let category = CategoryFilter::parse(query.category.as_deref());

    Ok(Json(ServicesResponse {
        active,
        inactive: services.len() - active,
        services: filtering::apply(&services, query.text(), &category),
    }))
}

// POST /api/admin/services/:id/active
#[derive(Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}

pub async fn set_service_active(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ActiveRequest>,
) -> Result<Json<Service>, AppError> {
    admin(&state, &headers).await?;

    let mut patch = Record::new();
    patch.insert("is_active".to_string(), json!(body.is_active));
    let record = state
        .store
        .update(Collection::Services, &id, patch)
        .await?;

    tracing::info!(service_id = %id, is_active = body.is_active, "service availability changed");
    Ok(Json(queries::decode(record)?))
}
