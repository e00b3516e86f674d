use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{AuditRecord, AuditSink},
    clock::SharedClock,
    entities::product::{self, Entity as ProductEntity},
    entities::purchase_item::{self, Entity as PurchaseItemEntity},
    entities::purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
    entities::supplier::Entity as SupplierEntity,
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::InventoryService,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePurchaseOrderRequest {
    pub supplier_id: Uuid,
    pub warehouse_id: i32,
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1, message = "Purchase order must contain at least one line"))]
    pub items: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub cost_price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PurchaseItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    pub cost_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderResponse {
    pub id: Uuid,
    pub po_number: String,
    pub supplier_id: Uuid,
    pub supplier_name: Option<String>,
    pub warehouse_id: i32,
    pub user_id: Option<Uuid>,
    pub status: PurchaseOrderStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub items: Vec<PurchaseItemResponse>,
}

fn generate_po_number(id: Uuid) -> String {
    format!("PO-{}", id.to_string()[..8].to_uppercase())
}

/// Purchase receiving: records a goods receipt and credits inventory in the
/// same atomic step. Creation is the sole crediting point in the normal
/// flow; the explicit status transition credits only on a genuine
/// pending-to-completed edge, so no call sequence credits twice.
#[derive(Clone)]
pub struct PurchasingService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    audit: AuditSink,
    event_sender: Option<EventSender>,
    clock: SharedClock,
}

impl PurchasingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        audit: AuditSink,
        event_sender: Option<EventSender>,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            inventory,
            audit,
            event_sender,
            clock,
        }
    }

    /// Receives goods in one transaction: header, lines, product cost-price
    /// update (last write wins), ledger credit per line, then the header is
    /// completed with the final total. Any failure rolls everything back.
    #[instrument(skip(self, request), fields(supplier_id = %request.supplier_id, lines = request.items.len()))]
    pub async fn create_purchase_order(
        &self,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        request.validate()?;
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "line quantity must be positive, got {}",
                    line.quantity
                )));
            }
            if line.cost_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Cost price must not be negative".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;
        let now = self.clock.now();

        SupplierEntity::find_by_id(request.supplier_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Supplier {} not found", request.supplier_id))
            })?;

        let po_id = Uuid::new_v4();
        let header = purchase_order::ActiveModel {
            id: Set(po_id),
            po_number: Set(generate_po_number(po_id)),
            supplier_id: Set(request.supplier_id),
            warehouse_id: Set(request.warehouse_id),
            user_id: Set(request.user_id),
            status: Set(PurchaseOrderStatus::Pending),
            total_amount: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(None),
        };
        let header = header.insert(&txn).await?;

        let mut total_amount = Decimal::ZERO;
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            // The receiving path, unlike ordering, does not skip unknown
            // products: a receipt against a missing product is a data error.
            let product = ProductEntity::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            let subtotal = line.cost_price * Decimal::from(line.quantity);
            total_amount += subtotal;

            let item = purchase_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(po_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                cost_price: Set(line.cost_price),
                subtotal: Set(subtotal),
            };
            items.push(item.insert(&txn).await?);

            let mut product_active: product::ActiveModel = product.into();
            product_active.cost_price = Set(line.cost_price);
            product_active.updated_at = Set(Some(now));
            product_active.update(&txn).await?;

            self.inventory
                .credit(&txn, line.product_id, request.warehouse_id, line.quantity)
                .await?;
        }

        let mut header_active: purchase_order::ActiveModel = header.into();
        header_active.status = Set(PurchaseOrderStatus::Completed);
        header_active.total_amount = Set(total_amount);
        header_active.updated_at = Set(Some(now));
        let header = header_active.update(&txn).await?;

        txn.commit().await?;

        info!(%po_id, %total_amount, "Purchase order received");

        self.audit.log(AuditRecord {
            action: "create".to_string(),
            entity_type: "purchase_order".to_string(),
            entity_id: po_id.to_string(),
            entity_name: header.po_number.clone(),
            old_values: None,
            new_values: Some(serde_json::json!({
                "total_amount": total_amount,
                "warehouse_id": request.warehouse_id,
                "items": items
                    .iter()
                    .map(|i| serde_json::json!({
                        "product_id": i.product_id,
                        "quantity": i.quantity,
                        "cost_price": i.cost_price,
                    }))
                    .collect::<Vec<_>>(),
            })),
            summary: format!(
                "Purchase order {} received into warehouse {}",
                header.po_number, request.warehouse_id
            ),
            actor_user_id: request.user_id,
            actor_username: None,
            extra: None,
            recorded_at: now,
        });

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderReceived {
                    purchase_order_id: po_id,
                    warehouse_id: request.warehouse_id,
                    total_amount,
                })
                .await;
        }

        self.hydrate(header, items).await
    }

    /// Explicit status transition for a staged-receiving workflow. Crediting
    /// happens exactly once, on the pending-to-completed edge; completed
    /// receipts are immutable.
    #[instrument(skip(self), fields(purchase_order_id = %purchase_order_id))]
    pub async fn update_status(
        &self,
        purchase_order_id: Uuid,
        new_status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let txn = self.db.begin().await?;
        let now = self.clock.now();

        let header = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        match (header.status, new_status) {
            (PurchaseOrderStatus::Pending, PurchaseOrderStatus::Completed) => {}
            (PurchaseOrderStatus::Completed, _) => {
                return Err(ServiceError::InvalidState(
                    "Completed purchase orders are immutable".to_string(),
                ));
            }
            (PurchaseOrderStatus::Pending, PurchaseOrderStatus::Pending) => {
                return Err(ServiceError::InvalidState(
                    "Purchase order is already pending".to_string(),
                ));
            }
        }

        let items = PurchaseItemEntity::find()
            .filter(purchase_item::Column::PurchaseOrderId.eq(purchase_order_id))
            .all(&txn)
            .await?;

        let mut total_amount = Decimal::ZERO;
        for item in &items {
            total_amount += item.subtotal;
            self.inventory
                .credit(&txn, item.product_id, header.warehouse_id, item.quantity)
                .await?;
        }

        let warehouse_id = header.warehouse_id;
        let mut header_active: purchase_order::ActiveModel = header.into();
        header_active.status = Set(PurchaseOrderStatus::Completed);
        header_active.total_amount = Set(total_amount);
        header_active.updated_at = Set(Some(now));
        let header = header_active.update(&txn).await?;

        txn.commit().await?;

        info!(%purchase_order_id, "Purchase order completed");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderReceived {
                    purchase_order_id,
                    warehouse_id,
                    total_amount,
                })
                .await;
        }

        self.hydrate(header, items).await
    }

    /// Completed receipts are immutable. A pending order has never credited
    /// inventory, so deletion removes the header and items with nothing to
    /// reverse.
    #[instrument(skip(self), fields(purchase_order_id = %purchase_order_id))]
    pub async fn delete_purchase_order(
        &self,
        purchase_order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let header = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        if header.status == PurchaseOrderStatus::Completed {
            return Err(ServiceError::InvalidState(
                "Completed purchase orders cannot be deleted".to_string(),
            ));
        }

        PurchaseItemEntity::delete_many()
            .filter(purchase_item::Column::PurchaseOrderId.eq(purchase_order_id))
            .exec(&txn)
            .await?;
        let po_number = header.po_number.clone();
        header.delete(&txn).await?;

        txn.commit().await?;

        info!(%purchase_order_id, po_number, "Purchase order deleted");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseOrderDeleted(purchase_order_id))
                .await;
        }

        Ok(())
    }

    pub async fn get_purchase_order(
        &self,
        purchase_order_id: Uuid,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let header = PurchaseOrderEntity::find_by_id(purchase_order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", purchase_order_id))
            })?;

        let items = PurchaseItemEntity::find()
            .filter(purchase_item::Column::PurchaseOrderId.eq(purchase_order_id))
            .all(&*self.db)
            .await?;

        self.hydrate(header, items).await
    }

    pub async fn list_purchase_orders(
        &self,
    ) -> Result<Vec<PurchaseOrderResponse>, ServiceError> {
        let headers = PurchaseOrderEntity::find()
            .order_by_desc(purchase_order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let items = PurchaseItemEntity::find()
                .filter(purchase_item::Column::PurchaseOrderId.eq(header.id))
                .all(&*self.db)
                .await?;
            orders.push(self.hydrate(header, items).await?);
        }
        Ok(orders)
    }

    async fn hydrate(
        &self,
        header: purchase_order::Model,
        items: Vec<purchase_item::Model>,
    ) -> Result<PurchaseOrderResponse, ServiceError> {
        let supplier_name = SupplierEntity::find_by_id(header.supplier_id)
            .one(&*self.db)
            .await?
            .map(|s| s.name);

        Ok(PurchaseOrderResponse {
            id: header.id,
            po_number: header.po_number,
            supplier_id: header.supplier_id,
            supplier_name,
            warehouse_id: header.warehouse_id,
            user_id: header.user_id,
            status: header.status,
            total_amount: header.total_amount,
            created_at: header.created_at,
            items: items
                .into_iter()
                .map(|item| PurchaseItemResponse {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    cost_price: item.cost_price,
                    subtotal: item.subtotal,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn po_numbers_are_prefixed_and_uppercase() {
        let id = Uuid::new_v4();
        let number = generate_po_number(id);
        assert!(number.starts_with("PO-"));
        assert_eq!(number.len(), 11);
        assert_eq!(number, number.to_uppercase());
    }
}
