use crate::entities::transfer::TransferStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::transfer_orchestrator::{
    NewTransfer, NewTransferLine, ReceivedLine, TransferFilter,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferLineRequest {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateTransferRequest {
    pub company_id: Uuid,
    pub source_warehouse_id: Uuid,
    pub destination_warehouse_id: Uuid,
    pub created_by: Uuid,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub lines: Vec<TransferLineRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiveLineRequest {
    pub line_id: Uuid,
    pub quantity_received: Decimal,
}

/// Body for receiving a transfer. An empty or absent `lines` list receives
/// everything in full.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReceiveTransferRequest {
    #[serde(default)]
    pub lines: Vec<ReceiveLineRequest>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelTransferRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct TransferListQuery {
    pub company_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct StatisticsQuery {
    pub company_id: Option<Uuid>,
}

pub fn transfer_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_transfer).get(list_transfers))
        .route("/statistics", get(transfer_statistics))
        .route("/:id", get(get_transfer))
        .route("/:id/send", post(send_transfer))
        .route("/:id/receive", post(receive_transfer))
        .route("/:id/cancel", post(cancel_transfer))
}

/// Create a transfer between two warehouses.
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = CreateTransferRequest,
    responses(
        (status = 201, description = "Transfer created", body = crate::services::transfer_orchestrator::TransferWithLines),
        (status = 400, description = "Invalid route or payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock at source", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;

    let transfer = state
        .services
        .transfers
        .create(NewTransfer {
            company_id: payload.company_id,
            source_warehouse_id: payload.source_warehouse_id,
            destination_warehouse_id: payload.destination_warehouse_id,
            created_by: payload.created_by,
            notes: payload.notes,
            lines: payload
                .lines
                .into_iter()
                .map(|l| NewTransferLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                })
                .collect(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Dispatch a pending transfer, deducting stock at the source.
#[utoipa::path(
    post,
    path = "/api/v1/transfers/{id}/send",
    params(("id" = Uuid, Path, description = "Transfer ID")),
    responses(
        (status = 200, description = "Transfer sent"),
        (status = 404, description = "Transfer not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transfer not pending", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock at source", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "transfers"
)]
pub async fn send_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transfer = state.services.transfers.send(id).await?;
    Ok(Json(transfer))
}

/// Confirm arrival at the destination, fully or partially.
pub async fn receive_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReceiveTransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let received = payload
        .lines
        .into_iter()
        .map(|l| ReceivedLine {
            line_id: l.line_id,
            quantity_received: l.quantity_received,
        })
        .collect();

    let transfer = state.services.transfers.receive(id, received).await?;
    Ok(Json(transfer))
}

/// Cancel a pending or in-transit transfer.
pub async fn cancel_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelTransferRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let transfer = state.services.transfers.cancel(id, payload.reason).await?;
    Ok(Json(transfer))
}

pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let transfer = state.services.transfers.get(id).await?;
    Ok(Json(transfer))
}

/// List transfers with optional filters.
pub async fn list_transfers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransferListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = match &query.status {
        Some(raw) => Some(TransferStatus::from_str(raw).ok_or_else(|| {
            ServiceError::ValidationError(format!("Unknown transfer status '{}'", raw))
        })?),
        None => None,
    };

    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50).min(200);

    let (transfers, total) = state
        .services
        .transfers
        .list(
            TransferFilter {
                company_id: query.company_id,
                warehouse_id: query.warehouse_id,
                status,
            },
            page,
            limit,
        )
        .await?;

    Ok(Json(json!({
        "transfers": transfers,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

/// Per-status transfer counts.
pub async fn transfer_statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let stats = state.services.transfers.statistics(query.company_id).await?;
    Ok(Json(stats))
}
