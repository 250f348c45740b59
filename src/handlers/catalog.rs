use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Provider, Service, ServiceCategory};
use crate::services::filtering::{self, CategoryFilter};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

// GET /api/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    let services = queries::active_services(state.store.as_ref()).await?;
    let category = CategoryFilter::parse(query.category.as_deref());
    Ok(Json(filtering::apply(
        &services,
        query.q.as_deref().unwrap_or_default(),
        &category,
    )))
}

// GET /api/services/:id
#[derive(Serialize)]
pub struct ServiceDetails {
    service: Service,
    /// Providers a customer can book this service with, best rated first.
    providers: Vec<Provider>,
}

pub async fn service_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceDetails>, AppError> {
    let store = state.store.as_ref();

    let service = queries::get_service(store, &id).await?;
    if !service.is_active {
        return Err(AppError::NotFound(format!("services {id}")));
    }
    let providers = queries::providers_offering(store, &service.id).await?;

    Ok(Json(ServiceDetails { service, providers }))
}

// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ServiceCategory>>, AppError> {
    Ok(Json(queries::all_categories(state.store.as_ref()).await?))
}
