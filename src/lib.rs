//! StockPilot API Library
//!
//! Inventory engine exposing stock ledgers, movement registration, quantity
//! pricing, serial tracking, composite validation and warehouse transfers.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Full v1 API surface.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest(
            "/stock",
            handlers::stock::stock_routes().nest("/movements", handlers::movements::movement_routes()),
        )
        .nest("/pricing", handlers::pricing::pricing_routes())
        .nest("/serials", handlers::serials::serial_routes())
        .nest("/composites", handlers::composites::composite_routes())
        .nest("/transfers", handlers::transfers::transfer_routes())
}

/// Liveness plus a database round trip.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_ok = state.db.ping().await.is_ok();

    Json(json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "database": if db_ok { "up" } else { "down" },
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Build metadata and runtime environment.
pub async fn app_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Prometheus exposition of the engine counters.
pub async fn metrics_handler() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Operational routes living outside the versioned API.
pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(app_status))
        .route("/metrics", get(metrics_handler))
}
