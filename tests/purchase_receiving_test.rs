//! Purchase receiving: atomic credit + cost-price update, the
//! single-crediting guarantee across creation and explicit status
//! transitions, and deletion rules.

mod common;

use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use storefront_api::entities::product::Entity as ProductEntity;
use storefront_api::entities::purchase_order::PurchaseOrderStatus;
use storefront_api::errors::ServiceError;
use storefront_api::services::purchasing::{CreatePurchaseOrderRequest, PurchaseLineRequest};
use uuid::Uuid;

#[tokio::test]
async fn receiving_credits_inventory_and_updates_the_cost_price() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Highland Beans Co").await;
    let warehouse = app.seed_warehouse("Overflow").await;
    let product = app.seed_product("Robusta 1kg", "ROB-1KG", dec!(95000)).await;

    let receipt = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![PurchaseLineRequest {
                product_id: product.id,
                quantity: 20,
                cost_price: dec!(500),
            }],
        })
        .await
        .expect("receiving should succeed");

    assert_eq!(receipt.status, PurchaseOrderStatus::Completed);
    assert_eq!(receipt.total_amount, dec!(10000));
    assert_eq!(receipt.supplier_name.as_deref(), Some("Highland Beans Co"));
    assert!(receipt.po_number.starts_with("PO-"));
    assert_eq!(receipt.items.len(), 1);
    assert_eq!(receipt.items[0].subtotal, dec!(10000));

    assert_eq!(
        app.state
            .inventory_service
            .available_at(&*app.db, product.id, warehouse.id)
            .await
            .unwrap(),
        20
    );

    let reloaded = ProductEntity::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.cost_price, dec!(500));
}

#[tokio::test]
async fn cost_price_updates_are_last_write_wins() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Highland Beans Co").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Arabica 1kg", "ARA-1KG", dec!(120000)).await;

    for cost in [dec!(700), dec!(650)] {
        app.state
            .purchasing_service
            .create_purchase_order(CreatePurchaseOrderRequest {
                supplier_id: supplier.id,
                warehouse_id: warehouse.id,
                user_id: None,
                items: vec![PurchaseLineRequest {
                    product_id: product.id,
                    quantity: 5,
                    cost_price: cost,
                }],
            })
            .await
            .unwrap();
    }

    let reloaded = ProductEntity::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.cost_price, dec!(650));
    assert_eq!(
        app.state
            .inventory_service
            .available_at(&*app.db, product.id, warehouse.id)
            .await
            .unwrap(),
        10
    );
}

#[tokio::test]
async fn inventory_is_credited_exactly_once_per_receipt() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Dairy Direct").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Milk 1L", "MLK-1L", dec!(32000)).await;

    let receipt = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![PurchaseLineRequest {
                product_id: product.id,
                quantity: 12,
                cost_price: dec!(20000),
            }],
        })
        .await
        .unwrap();

    // Creation already completed the order; re-completing must be rejected
    // and must not credit again.
    let err = app
        .state
        .purchasing_service
        .update_status(receipt.id, PurchaseOrderStatus::Completed)
        .await
        .expect_err("completed receipts are immutable");
    assert!(matches!(err, ServiceError::InvalidState(_)));

    assert_eq!(
        app.state
            .inventory_service
            .available_at(&*app.db, product.id, warehouse.id)
            .await
            .unwrap(),
        12
    );
}

#[tokio::test]
async fn staged_pending_orders_credit_on_the_completion_edge_only() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Paper Goods Ltd").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Napkins", "NPK-01", dec!(3000)).await;

    let pending = app
        .seed_pending_purchase_order(
            supplier.id,
            warehouse.id,
            &[(product.id, 40, dec!(1500))],
        )
        .await;

    assert_eq!(
        app.state
            .inventory_service
            .total_available(&*app.db, product.id)
            .await
            .unwrap(),
        0,
        "pending orders must not have credited anything"
    );

    let completed = app
        .state
        .purchasing_service
        .update_status(pending.id, PurchaseOrderStatus::Completed)
        .await
        .unwrap();
    assert_eq!(completed.status, PurchaseOrderStatus::Completed);
    assert_eq!(completed.total_amount, dec!(60000));
    assert_eq!(
        app.state
            .inventory_service
            .available_at(&*app.db, product.id, warehouse.id)
            .await
            .unwrap(),
        40
    );

    // The edge fires once.
    let err = app
        .state
        .purchasing_service
        .update_status(pending.id, PurchaseOrderStatus::Completed)
        .await
        .expect_err("second completion");
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(
        app.state
            .inventory_service
            .available_at(&*app.db, product.id, warehouse.id)
            .await
            .unwrap(),
        40
    );
}

#[tokio::test]
async fn completed_receipts_cannot_be_deleted() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Glassware Inc").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Glass Cup", "GLS-01", dec!(28000)).await;

    let receipt = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![PurchaseLineRequest {
                product_id: product.id,
                quantity: 6,
                cost_price: dec!(15000),
            }],
        })
        .await
        .unwrap();

    let err = app
        .state
        .purchasing_service
        .delete_purchase_order(receipt.id)
        .await
        .expect_err("completed receipts are immutable");
    assert!(matches!(err, ServiceError::InvalidState(_)));

    // Still there, stock still credited.
    let reloaded = app
        .state
        .purchasing_service
        .get_purchase_order(receipt.id)
        .await
        .unwrap();
    assert_eq!(reloaded.status, PurchaseOrderStatus::Completed);
}

#[tokio::test]
async fn pending_orders_delete_without_touching_inventory() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Paper Goods Ltd").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Straws", "STR-01", dec!(2000)).await;

    let pending = app
        .seed_pending_purchase_order(supplier.id, warehouse.id, &[(product.id, 100, dec!(900))])
        .await;

    app.state
        .purchasing_service
        .delete_purchase_order(pending.id)
        .await
        .expect("pending orders are deletable");

    let err = app
        .state
        .purchasing_service
        .get_purchase_order(pending.id)
        .await
        .expect_err("deleted order is gone");
    assert!(matches!(err, ServiceError::NotFound(_)));

    assert_eq!(
        app.state
            .inventory_service
            .total_available(&*app.db, product.id)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn receipts_against_unknown_products_fail_whole() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Mystery Vendor").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Known Item", "KNW-01", dec!(10000)).await;

    let err = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![
                PurchaseLineRequest {
                    product_id: product.id,
                    quantity: 5,
                    cost_price: dec!(4000),
                },
                PurchaseLineRequest {
                    product_id: Uuid::new_v4(),
                    quantity: 5,
                    cost_price: dec!(4000),
                },
            ],
        })
        .await
        .expect_err("unknown product");
    assert!(matches!(err, ServiceError::NotFound(_)));

    // The first line's credit rolled back with the rest.
    assert_eq!(
        app.state
            .inventory_service
            .total_available(&*app.db, product.id)
            .await
            .unwrap(),
        0
    );
    assert!(app
        .state
        .purchasing_service
        .list_purchase_orders()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn nonpositive_quantities_and_negative_costs_are_rejected() {
    let app = TestApp::new().await;
    let supplier = app.seed_supplier("Vendor").await;
    let warehouse = app.seed_warehouse("Main").await;
    let product = app.seed_product("Item", "ITM-01", dec!(10000)).await;

    let err = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![PurchaseLineRequest {
                product_id: product.id,
                quantity: 0,
                cost_price: dec!(4000),
            }],
        })
        .await
        .expect_err("zero quantity");
    assert!(matches!(err, ServiceError::InvalidQuantity(_)));

    let err = app
        .state
        .purchasing_service
        .create_purchase_order(CreatePurchaseOrderRequest {
            supplier_id: supplier.id,
            warehouse_id: warehouse.id,
            user_id: None,
            items: vec![PurchaseLineRequest {
                product_id: product.id,
                quantity: 1,
                cost_price: dec!(-1),
            }],
        })
        .await
        .expect_err("negative cost");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}
