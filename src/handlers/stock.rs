use crate::handlers::AppState;
use crate::errors::ServiceError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateStockRecordRequest {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct StockListQuery {
    pub warehouse_id: Uuid,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub fn stock_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/records", post(create_stock_record).get(list_stock))
        .route("/records/:warehouse_id/:product_id", get(get_stock_record))
        .route("/records/:warehouse_id/:product_id/movements", get(movement_log))
        .route("/low", get(low_stock))
        .route("/total/:product_id", get(total_for_product))
}

/// Ensure a stock record exists for a (warehouse, product) pair.
///
/// Safe to call repeatedly; an existing record is returned unchanged.
#[utoipa::path(
    post,
    path = "/api/v1/stock/records",
    request_body = CreateStockRecordRequest,
    responses(
        (status = 200, description = "Stock record returned or created"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn create_stock_record(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateStockRecordRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state
        .services
        .stock_ledger
        .get_or_create(payload.warehouse_id, payload.product_id)
        .await?;

    Ok((StatusCode::OK, Json(record)))
}

/// List stock records for one warehouse.
#[utoipa::path(
    get,
    path = "/api/v1/stock/records",
    params(StockListQuery),
    responses(
        (status = 200, description = "Stock listing returned"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn list_stock(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StockListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50).min(200);

    let (records, total) = state
        .services
        .stock_ledger
        .list_for_warehouse(query.warehouse_id, page, limit)
        .await?;

    Ok(Json(json!({
        "records": records,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

pub async fn get_stock_record(
    State(state): State<Arc<AppState>>,
    Path((warehouse_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    let quantity = state
        .services
        .stock_ledger
        .current_quantity(warehouse_id, product_id)
        .await?;

    Ok(Json(json!({
        "warehouse_id": warehouse_id,
        "product_id": product_id,
        "quantity_on_hand": quantity,
    })))
}

/// Movement log for a (warehouse, product) pair, newest first.
pub async fn movement_log(
    State(state): State<Arc<AppState>>,
    Path((warehouse_id, product_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50).min(200);

    let (movements, total) = state
        .services
        .stock_ledger
        .movements(warehouse_id, product_id, page, limit)
        .await?;

    Ok(Json(json!({
        "movements": movements,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct LowStockQuery {
    pub warehouse_id: Uuid,
}

/// Records at or below their minimum threshold.
pub async fn low_stock(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LowStockQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let records = state
        .services
        .stock_ledger
        .low_stock(query.warehouse_id)
        .await?;
    let total = records.len();

    Ok(Json(json!({
        "records": records,
        "total": total,
    })))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductTotalResponse {
    pub product_id: Uuid,
    pub total_on_hand: rust_decimal::Decimal,
}

/// Total stock of one product across every warehouse.
pub async fn total_for_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let total = state
        .services
        .stock_ledger
        .total_across_warehouses(product_id)
        .await?;

    Ok(Json(ProductTotalResponse {
        product_id,
        total_on_hand: total,
    }))
}
