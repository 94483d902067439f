use crate::entities::stock_movement::{MovementOrigin, MovementType};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::movement_registrar::NewMovement;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RegisterMovementRequest {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    /// "inbound" or "outbound"
    #[validate(length(min = 1))]
    pub movement_type: String,
    /// "manual", "sale", "purchase" or "adjustment"
    #[validate(length(min = 1))]
    pub origin: String,
    pub quantity: Decimal,
    pub counterparty_id: Option<Uuid>,
    #[validate(length(max = 120))]
    pub reference: Option<String>,
    pub created_by: Option<Uuid>,
    pub new_cost_price: Option<Decimal>,
    pub new_sale_price: Option<Decimal>,
}

pub fn movement_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register_movement))
        .route("/:id", get(get_movement))
}

/// Register a stock movement.
///
/// The single write path for stock quantities. An outbound movement that would
/// drive stock negative is rejected with 422 and a shortfall list.
#[utoipa::path(
    post,
    path = "/api/v1/stock/movements",
    request_body = RegisterMovementRequest,
    responses(
        (status = 201, description = "Movement registered"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "movements"
)]
pub async fn register_movement(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterMovementRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let movement_type = MovementType::from_str(&payload.movement_type).ok_or_else(|| {
        ServiceError::ValidationError(format!(
            "Unknown movement type '{}'",
            payload.movement_type
        ))
    })?;
    let origin = MovementOrigin::from_str(&payload.origin).ok_or_else(|| {
        ServiceError::ValidationError(format!("Unknown movement origin '{}'", payload.origin))
    })?;

    // Transfer movements are written by the transfer orchestrator only.
    if matches!(
        origin,
        MovementOrigin::Transfer | MovementOrigin::TransferReversal
    ) {
        return Err(ServiceError::ValidationError(
            "Transfer movements are created through the transfers API".to_string(),
        ));
    }

    let movement = state
        .services
        .movement_registrar
        .register(NewMovement {
            warehouse_id: payload.warehouse_id,
            product_id: payload.product_id,
            movement_type,
            origin,
            quantity: payload.quantity,
            counterparty_id: payload.counterparty_id,
            reference: payload.reference,
            created_by: payload.created_by,
            new_cost_price: payload.new_cost_price,
            new_sale_price: payload.new_sale_price,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(movement)))
}

pub async fn get_movement(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state.services.movement_registrar.get(id).await?;
    Ok(Json(movement))
}
