use crate::errors::ServiceError;
use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct ResolvePriceQuery {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

pub fn pricing_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/resolve", get(resolve_price))
        .route("/tiers/:product_id", get(list_tiers))
}

/// Resolve the unit price for a product at a given quantity.
///
/// Quantity tiers win over the product's base sale price; the response names
/// which one applied.
#[utoipa::path(
    get,
    path = "/api/v1/pricing/resolve",
    params(ResolvePriceQuery),
    responses(
        (status = 200, description = "Price resolved", body = crate::services::pricing::PriceResolution),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "pricing"
)]
pub async fn resolve_price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolvePriceQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let resolution = state
        .services
        .pricing
        .resolve(query.product_id, query.quantity)
        .await?;

    Ok(Json(resolution))
}

pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let tiers = state.services.pricing.tiers_for_product(product_id).await?;
    let total = tiers.len();

    Ok(Json(json!({
        "product_id": product_id,
        "tiers": tiers,
        "total": total,
    })))
}
