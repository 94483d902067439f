use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

/// One product lacking stock for a requested deduction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockShortfall {
    pub product_id: Uuid,
    pub available: Decimal,
    pub requested: Decimal,
}

/// One kit component lacking stock for a requested kit quantity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentShortfall {
    pub component_id: Uuid,
    pub required: Decimal,
    pub available: Decimal,
    pub shortfall: Decimal,
    pub is_mandatory: bool,
}

/// Error payload returned to callers. `code` is the machine-readable reason
/// callers branch on; `details` carries structured data such as shortfall
/// lists so the UI never has to parse the human-readable message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "code": "insufficient_stock",
    "message": "Insufficient stock for 1 product(s)",
    "details": [{"product_id": "550e8400-e29b-41d4-a716-446655440000", "available": "2", "requested": "5"}],
    "timestamp": "2026-08-28T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable reason
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Structured error data (shortfall lists, transition info)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A deduction would drive quantity_on_hand negative.
    #[error("Insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),

    /// The serial unit is not in `available` state.
    #[error("Serial unit {0} is not available")]
    SerialUnavailable(Uuid),

    /// One or more mandatory kit components lack stock.
    #[error("Composite product is short on {} component(s)", .0.len())]
    CompositeShortfall(Vec<ComponentShortfall>),

    /// Source equals destination, or an endpoint warehouse is inactive.
    #[error("Invalid transfer route: {0}")]
    InvalidTransferRoute(String),

    /// The transfer is not in the state the requested action needs.
    #[error("Cannot {action} a transfer in state {from}")]
    InvalidTransition { from: String, action: String },

    /// The sale a reservation references no longer exists.
    #[error("Sale {0} no longer exists")]
    SaleExpired(Uuid),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientStock(_) | Self::CompositeShortfall(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::SerialUnavailable(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InvalidTransferRoute(_) | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::SaleExpired(_) => StatusCode::GONE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable reason code callers branch on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::SerialUnavailable(_) => "serial_unavailable",
            Self::CompositeShortfall(_) => "composite_shortfall",
            Self::InvalidTransferRoute(_) => "invalid_transfer_route",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::SaleExpired(_) => "sale_expired",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "internal_error"
            }
        }
    }

    /// Structured payload for the `details` field, when the variant carries one.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InsufficientStock(shortfalls) => serde_json::to_value(shortfalls).ok(),
            Self::CompositeShortfall(components) => serde_json::to_value(components).ok(),
            Self::SerialUnavailable(serial_id) => Some(json!({ "serial_id": serial_id })),
            Self::SaleExpired(sale_id) => Some(json!({ "sale_id": sale_id })),
            Self::InvalidTransition { from, action } => {
                Some(json!({ "from": from, "action": action }))
            }
            _ => None,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a generic
    /// message so implementation details never leak to clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            details: self.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
