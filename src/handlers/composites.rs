use crate::errors::ServiceError;
use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct ValidateCompositeQuery {
    pub warehouse_id: Uuid,
    pub quantity: Option<Decimal>,
    /// When true, a mandatory shortfall becomes a 422 error instead of a
    /// report with `can_assemble: false`.
    pub enforce: Option<bool>,
}

pub fn composite_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id/validate", get(validate_composite))
}

/// Check whether a composite product can be assembled from component stock.
#[utoipa::path(
    get,
    path = "/api/v1/composites/{id}/validate",
    params(
        ("id" = Uuid, Path, description = "Composite product ID"),
        ValidateCompositeQuery
    ),
    responses(
        (status = 200, description = "Validation report returned", body = crate::services::composite_validator::CompositeValidation),
        (status = 400, description = "Not a composite or cyclic definition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Mandatory component shortfall", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "composites"
)]
pub async fn validate_composite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ValidateCompositeQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = query.quantity.unwrap_or(dec!(1));

    let validation = if query.enforce.unwrap_or(false) {
        state
            .services
            .composite_validator
            .ensure_assemblable(id, query.warehouse_id, quantity)
            .await?
    } else {
        state
            .services
            .composite_validator
            .validate(id, query.warehouse_id, quantity)
            .await?
    };

    Ok(Json(validation))
}
