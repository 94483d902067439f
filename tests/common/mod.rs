#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use stockpilot_api::{
    config::AppConfig,
    db,
    entities::{
        composite_component, price_tier, product, serial_unit, serial_unit::SerialStatus,
        stock_movement::{MovementOrigin, MovementType},
        warehouse,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::movement_registrar::NewMovement,
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness backed by a throwaway SQLite database. Each instance gets its
/// own temp directory so tests can run in parallel.
pub struct TestApp {
    pub state: Arc<AppState>,
    _event_task: tokio::task::JoinHandle<()>,
    _tmp: TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let db_path = tmp.path().join("stockpilot_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone());

        let state = Arc::new(AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        });

        Self {
            state,
            _event_task: event_task,
            _tmp: tmp,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Insert an active warehouse.
    pub async fn seed_warehouse(&self, company_id: Uuid, code: &str) -> warehouse::Model {
        warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            code: Set(code.to_string()),
            name: Set(format!("Warehouse {}", code)),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed warehouse")
    }

    /// Insert an inactive warehouse, for transfer route tests.
    pub async fn seed_inactive_warehouse(&self, company_id: Uuid, code: &str) -> warehouse::Model {
        warehouse::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            code: Set(code.to_string()),
            name: Set(format!("Warehouse {}", code)),
            is_active: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed warehouse")
    }

    /// Insert a plain (non-serialized, non-composite) product.
    pub async fn seed_product(&self, company_id: Uuid, sku: &str, sale_price: Decimal) -> product::Model {
        self.seed_product_with(company_id, sku, sale_price, false, false)
            .await
    }

    pub async fn seed_product_with(
        &self,
        company_id: Uuid,
        sku: &str,
        sale_price: Decimal,
        is_serialized: bool,
        is_composite: bool,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id),
            sku: Set(sku.to_string()),
            name: Set(format!("Product {}", sku)),
            cost_price: Set(Decimal::ZERO),
            sale_price: Set(sale_price),
            is_serialized: Set(is_serialized),
            is_composite: Set(is_composite),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product")
    }

    /// Insert a price tier for a product.
    pub async fn seed_tier(
        &self,
        product_id: Uuid,
        min: Decimal,
        max: Option<Decimal>,
        unit_price: Decimal,
    ) -> price_tier::Model {
        price_tier::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            minimum_quantity: Set(min),
            maximum_quantity: Set(max),
            unit_price: Set(unit_price),
            tier_label: Set(format!("from-{}", min)),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed tier")
    }

    /// Insert an available serial unit.
    pub async fn seed_serial(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        code: &str,
    ) -> serial_unit::Model {
        serial_unit::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            warehouse_id: Set(warehouse_id),
            serial_code: Set(code.to_string()),
            status: Set(SerialStatus::Available.as_str().to_string()),
            sale_id: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed serial")
    }

    /// Insert one component line of a composite.
    pub async fn seed_component(
        &self,
        composite_id: Uuid,
        component_id: Uuid,
        quantity_required: Decimal,
        is_mandatory: bool,
    ) -> composite_component::Model {
        composite_component::ActiveModel {
            id: Set(Uuid::new_v4()),
            composite_id: Set(composite_id),
            component_id: Set(component_id),
            quantity_required: Set(quantity_required),
            is_mandatory: Set(is_mandatory),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed component")
    }

    /// Add stock through the registrar, the same path production code uses.
    pub async fn add_stock(&self, warehouse_id: Uuid, product_id: Uuid, quantity: Decimal) {
        self.state
            .services
            .movement_registrar
            .register(NewMovement {
                warehouse_id,
                product_id,
                movement_type: MovementType::Inbound,
                origin: MovementOrigin::Adjustment,
                quantity,
                counterparty_id: None,
                reference: Some("test-seed".to_string()),
                created_by: None,
                new_cost_price: None,
                new_sale_price: None,
            })
            .await
            .expect("seed stock");
    }

    pub async fn quantity(&self, warehouse_id: Uuid, product_id: Uuid) -> Decimal {
        self.state
            .services
            .stock_ledger
            .current_quantity(warehouse_id, product_id)
            .await
            .expect("read quantity")
    }
}
