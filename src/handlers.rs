use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::error::ApiError;
use crate::gateway::{AppState, InternalState};
use crate::product::Product;
use crate::provision::ProvisioningEvent;
use crate::store::RecordStore;

/// Every record in the table, unpaginated.
pub fn list_all(store: &dyn RecordStore) -> Result<Vec<Product>, ApiError> {
    let products = store.scan_all()?.collect::<Result<Vec<_>, _>>()?;
    Ok(products)
}

/// Looks up one record. A missing or empty id is rejected before the store
/// is touched.
pub fn find_one(store: &dyn RecordStore, id: Option<&str>) -> Result<Product, ApiError> {
    let id = id.filter(|id| !id.is_empty()).ok_or(ApiError::Validation)?;
    store.get(id)?.ok_or(ApiError::NotFound)
}

pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(list_all(state.store.as_ref())?))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(find_one(state.store.as_ref(), Some(&id))?))
}

/// `GET /products/` — the id segment is present but empty.
pub async fn get_product_without_id(State(state): State<AppState>) -> Result<Json<Product>, ApiError> {
    Ok(Json(find_one(state.store.as_ref(), None)?))
}

pub async fn unknown_route() -> ApiError {
    ApiError::UnknownRoute
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

// Internal listener only.

pub async fn run_seed(State(state): State<InternalState>) -> Response {
    match state.seeder.invoke().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            error!(error = %e, "Error seeding data");
            let body = json!({ "error": "Failed to seed data", "cause": e.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

pub async fn provision(State(state): State<InternalState>, Json(event): Json<ProvisioningEvent>) -> Response {
    let Some(trigger) = state.trigger else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match trigger.handle(&event).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            warn!(error = %e, "Provisioning callback not delivered");
            let body = json!({ "error": e.to_string() });
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}
