pub mod admin;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod customer;
pub mod health;
pub mod provider;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::errors::AppError;
use crate::services::access::Actor;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/session", post(auth::create_session))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/services", get(catalog::list_services))
        .route("/api/services/:id", get(catalog::service_details))
        .route("/api/categories", get(catalog::list_categories))
        .route(
            "/api/customer/bookings",
            get(customer::list_bookings).post(customer::create_booking),
        )
        .route("/api/customer/stats", get(customer::stats))
        .route("/api/provider/requests", get(provider::requests))
        .route("/api/provider/jobs", get(provider::jobs))
        .route("/api/provider/dashboard", get(provider::dashboard))
        .route("/api/provider/earnings", get(provider::earnings))
        .route("/api/bookings/:id", get(bookings::track))
        .route("/api/bookings/:id/transition", post(bookings::transition))
        .route("/api/bookings/:id/rating", post(bookings::rate))
        .route("/api/admin/overview", get(admin::overview))
        .route("/api/admin/analytics", get(admin::analytics))
        .route("/api/admin/bookings", get(admin::list_bookings))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id", delete(admin::delete_user))
        .route("/api/admin/providers", get(admin::list_providers))
        .route(
            "/api/admin/providers/:id/approve",
            post(admin::approve_provider),
        )
        .route(
            "/api/admin/providers/:id/reject",
            post(admin::reject_provider),
        )
        .route("/api/admin/services", get(admin::list_services))
        .route(
            "/api/admin/services/:id/active",
            post(admin::set_service_active),
        )
        .with_state(state)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the caller from the bearer token.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Actor, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let user = state.auth.me(token).await?;
    Actor::resolve(state.store.as_ref(), user).await
}
