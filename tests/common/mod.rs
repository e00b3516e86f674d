#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, IntoActiveModel};
use uuid::Uuid;

use storefront_api::{
    audit,
    clock::{FixedClock, SharedClock},
    config::AppConfig,
    db,
    entities::{
        combo_promotion, combo_promotion_item, customer, inventory_record,
        product::{self, ProductStatus},
        promotion, promotion_product, purchase_item, purchase_order, supplier, user, warehouse,
    },
    events, AppState,
};

/// The instant every test clock is pinned to.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

/// Test harness over a throwaway SQLite database with real services.
pub struct TestApp {
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    _event_task: tokio::task::JoinHandle<()>,
    _audit_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_path = std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4()));
        let _ = std::fs::remove_file(&db_path);

        let mut config = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        config.auto_migrate = true;
        config.db_max_connections = 1;
        config.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("failed to create test database");
        let db = Arc::new(pool);

        let (event_sender, event_task) = events::channel(64);
        let (audit_sink, audit_task) = audit::channel(64);
        let clock: SharedClock = Arc::new(FixedClock(test_now()));

        let state = AppState::new(db.clone(), config, event_sender, audit_sink, clock);

        Self {
            state,
            db,
            _event_task: event_task,
            _audit_task: audit_task,
        }
    }

    pub async fn seed_user(&self, username: &str) -> user::Model {
        user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            created_at: Set(test_now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_customer(&self, name: &str) -> customer::Model {
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            phone: Set(None),
            created_at: Set(test_now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed customer")
    }

    pub async fn seed_supplier(&self, name: &str) -> supplier::Model {
        supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            phone: Set(None),
            created_at: Set(test_now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed supplier")
    }

    pub async fn seed_warehouse(&self, name: &str) -> warehouse::Model {
        warehouse::ActiveModel {
            name: Set(name.to_string()),
            address: Set(None),
            created_at: Set(test_now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed warehouse")
    }

    pub async fn seed_product(&self, name: &str, sku: &str, unit_price: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            sku: Set(sku.to_string()),
            unit: Set("piece".to_string()),
            unit_price: Set(unit_price),
            cost_price: Set(Decimal::ZERO),
            status: Set(ProductStatus::Active),
            created_at: Set(test_now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_stock(&self, product_id: Uuid, warehouse_id: i32, quantity: i32) {
        inventory_record::ActiveModel {
            product_id: Set(product_id),
            warehouse_id: Set(warehouse_id),
            quantity: Set(quantity),
            updated_at: Set(test_now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed stock");
    }

    pub async fn seed_promotion(&self, model: promotion::Model) -> promotion::Model {
        model
            .into_active_model()
            .insert(&*self.db)
            .await
            .expect("seed promotion")
    }

    pub async fn seed_promotion_product(
        &self,
        promotion_id: Uuid,
        product_id: Uuid,
        required_quantity: i32,
    ) {
        promotion_product::ActiveModel {
            promotion_id: Set(promotion_id),
            product_id: Set(product_id),
            required_quantity: Set(required_quantity),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed promotion product");
    }

    pub async fn seed_combo_promotion(&self, model: combo_promotion::Model) -> combo_promotion::Model {
        model
            .into_active_model()
            .insert(&*self.db)
            .await
            .expect("seed combo promotion")
    }

    pub async fn seed_combo_item(&self, combo_id: Uuid, product_id: Uuid, required_quantity: i32) {
        combo_promotion_item::ActiveModel {
            combo_promotion_id: Set(combo_id),
            product_id: Set(product_id),
            required_quantity: Set(required_quantity),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed combo item");
    }

    /// Seeds a pending purchase order directly, bypassing the service, for
    /// exercising the staged-receiving transition.
    pub async fn seed_pending_purchase_order(
        &self,
        supplier_id: Uuid,
        warehouse_id: i32,
        items: &[(Uuid, i32, Decimal)],
    ) -> purchase_order::Model {
        let po_id = Uuid::new_v4();
        let header = purchase_order::ActiveModel {
            id: Set(po_id),
            po_number: Set(format!("PO-{}", po_id.to_string()[..8].to_uppercase())),
            supplier_id: Set(supplier_id),
            warehouse_id: Set(warehouse_id),
            user_id: Set(None),
            status: Set(purchase_order::PurchaseOrderStatus::Pending),
            total_amount: Set(Decimal::ZERO),
            created_at: Set(test_now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .expect("seed purchase order");

        for &(product_id, quantity, cost_price) in items {
            purchase_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(po_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                cost_price: Set(cost_price),
                subtotal: Set(cost_price * Decimal::from(quantity)),
            }
            .insert(&*self.db)
            .await
            .expect("seed purchase item");
        }

        header
    }
}

/// A promotion model with sensible defaults, active around `test_now()`.
pub fn promotion_fixture(code: &str) -> promotion::Model {
    promotion::Model {
        id: Uuid::new_v4(),
        name: format!("Promotion {}", code),
        code: code.to_string(),
        promo_type: promotion::PromotionType::Percent,
        scope: promotion::PromotionScope::Order,
        discount_value: Decimal::from(10),
        min_order_amount: Decimal::ZERO,
        usage_limit: 0,
        used_count: 0,
        start_date: test_now() - chrono::Duration::days(7),
        end_date: test_now() + chrono::Duration::days(7),
        status: promotion::PromotionStatus::Active,
        created_at: test_now() - chrono::Duration::days(7),
        updated_at: None,
    }
}

/// A combo promotion model with sensible defaults, active around `test_now()`.
pub fn combo_fixture(name: &str) -> combo_promotion::Model {
    combo_promotion::Model {
        id: Uuid::new_v4(),
        name: name.to_string(),
        promo_type: promotion::PromotionType::Percent,
        discount_value: Decimal::from(15),
        usage_limit: 0,
        used_count: 0,
        start_date: test_now() - chrono::Duration::days(7),
        end_date: test_now() + chrono::Duration::days(7),
        status: promotion::PromotionStatus::Active,
        created_at: test_now() - chrono::Duration::days(7),
        updated_at: None,
    }
}
