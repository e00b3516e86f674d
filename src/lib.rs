//! Storefront API Library
//!
//! Retail store backend: order fulfillment, multi-warehouse inventory
//! allocation, purchase receiving, and promotion lifecycle.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]

pub mod audit;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::clock::SharedClock;

/// Shared application state handed to the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub audit: audit::AuditSink,
    pub inventory_service: services::inventory::InventoryService,
    pub promotion_service: services::promotions::PromotionService,
    pub combo_promotion_service: services::combo_promotions::ComboPromotionService,
    pub catalog_service: services::catalog::CatalogService,
    pub order_service: services::orders::OrderService,
    pub purchasing_service: services::purchasing::PurchasingService,
}

impl AppState {
    /// Wires every service over one pool, clock, and event/audit pair.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        audit: audit::AuditSink,
        clock: SharedClock,
    ) -> Self {
        let inventory_service = services::inventory::InventoryService::new(
            db.clone(),
            Some(event_sender.clone()),
            clock.clone(),
        );
        let promotion_service =
            services::promotions::PromotionService::new(db.clone(), clock.clone());
        let combo_promotion_service =
            services::combo_promotions::ComboPromotionService::new(db.clone(), clock.clone());
        let catalog_service = services::catalog::CatalogService::new(db.clone(), clock.clone());
        let order_service = services::orders::OrderService::new(
            db.clone(),
            inventory_service.clone(),
            promotion_service.clone(),
            catalog_service.clone(),
            audit.clone(),
            Some(event_sender.clone()),
            clock.clone(),
        );
        let purchasing_service = services::purchasing::PurchasingService::new(
            db.clone(),
            inventory_service.clone(),
            audit.clone(),
            Some(event_sender.clone()),
            clock,
        );

        Self {
            db,
            config,
            event_sender,
            audit,
            inventory_service,
            promotion_service,
            combo_promotion_service,
            catalog_service,
            order_service,
            purchasing_service,
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Builds the application router. Domain routing lives with the admin UI
/// gateway; this process only exposes liveness.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
