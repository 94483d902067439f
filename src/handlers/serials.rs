use crate::errors::ServiceError;
use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct AvailableSerialsQuery {
    pub product_id: Uuid,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReserveSerialRequest {
    pub sale_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FinalizeSerialRequest {
    pub sale_id: Uuid,
}

pub fn serial_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/available", get(list_available))
        .route("/:id/reserve", post(reserve_serial))
        .route("/:id/finalize", post(finalize_serial))
        .route("/:id/release", post(release_serial))
}

/// Available serial units for a product, optionally per warehouse.
pub async fn list_available(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableSerialsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let units = state
        .services
        .serial_allocator
        .list_available(query.product_id, query.warehouse_id)
        .await?;
    let total = units.len();

    Ok(Json(json!({
        "serials": units,
        "total": total,
    })))
}

/// Reserve an available serial unit for a sale.
#[utoipa::path(
    post,
    path = "/api/v1/serials/{id}/reserve",
    params(("id" = Uuid, Path, description = "Serial unit ID")),
    request_body = ReserveSerialRequest,
    responses(
        (status = 200, description = "Serial reserved"),
        (status = 404, description = "Serial not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Serial not available", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "serials"
)]
pub async fn reserve_serial(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReserveSerialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let unit = state
        .services
        .serial_allocator
        .reserve(id, payload.sale_id)
        .await?;
    Ok(Json(unit))
}

/// Turn a reservation into a sale.
pub async fn finalize_serial(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FinalizeSerialRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let unit = state
        .services
        .serial_allocator
        .finalize(id, payload.sale_id)
        .await?;
    Ok(Json(unit))
}

/// Return a reserved serial unit to the available pool.
pub async fn release_serial(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let unit = state.services.serial_allocator.release(id).await?;
    Ok(Json(unit))
}
