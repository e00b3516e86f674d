use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::{info, instrument};

use crate::{
    clock::SharedClock,
    entities::inventory_record::{self, Entity as InventoryRecordEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use uuid::Uuid;

/// Warehouse id used by the warehouse-less stock correction path.
pub const IMPLICIT_WAREHOUSE_ID: i32 = 0;

/// One warehouse's share of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockDeduction {
    pub warehouse_id: i32,
    pub quantity: i32,
}

/// Greedy allocation plan over `(warehouse_id, quantity)` counters already
/// sorted by ascending warehouse id: drain each warehouse before moving to
/// the next. Returns the total available on a shortfall, mutating nothing.
fn plan_allocation(records: &[(i32, i32)], requested: i32) -> Result<Vec<StockDeduction>, i32> {
    let available: i32 = records.iter().map(|(_, qty)| qty).sum();
    if available < requested {
        return Err(available);
    }

    let mut plan = Vec::new();
    let mut remaining = requested;
    for &(warehouse_id, quantity) in records {
        if remaining == 0 {
            break;
        }
        let take = quantity.min(remaining);
        if take > 0 {
            plan.push(StockDeduction {
                warehouse_id,
                quantity: take,
            });
            remaining -= take;
        }
    }
    Ok(plan)
}

/// The single place that mutates stock counters. Transaction-scoped
/// operations are generic over the connection so order fulfillment and
/// purchase receiving can run them inside their own atomic unit.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
    clock: SharedClock,
}

impl InventoryService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<EventSender>,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            event_sender,
            clock,
        }
    }

    /// Total quantity across all warehouses for a product.
    pub async fn total_available<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let records = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .all(conn)
            .await?;

        Ok(records.iter().map(|r| r.quantity).sum())
    }

    /// Single-warehouse quantity; zero when the pair has no record yet.
    pub async fn available_at<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        warehouse_id: i32,
    ) -> Result<i32, ServiceError> {
        let record = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
            .one(conn)
            .await?;

        Ok(record.map(|r| r.quantity).unwrap_or(0))
    }

    /// Deducts `requested` units, draining warehouses in ascending id order.
    /// All-or-nothing: a cross-warehouse shortfall fails without mutating any
    /// record. `product_label` names the product in the error.
    #[instrument(skip(self, conn))]
    pub async fn allocate<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        product_label: &str,
        requested: i32,
    ) -> Result<Vec<StockDeduction>, ServiceError> {
        if requested <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "allocation quantity must be positive, got {}",
                requested
            )));
        }

        let records = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .order_by_asc(inventory_record::Column::WarehouseId)
            .all(conn)
            .await?;

        let counters: Vec<(i32, i32)> = records
            .iter()
            .map(|r| (r.warehouse_id, r.quantity))
            .collect();

        let plan = plan_allocation(&counters, requested).map_err(|available| {
            ServiceError::InsufficientStock {
                product: product_label.to_string(),
                requested,
                available,
            }
        })?;

        let now = self.clock.now();
        for deduction in &plan {
            let record = records
                .iter()
                .find(|r| r.warehouse_id == deduction.warehouse_id)
                .cloned()
                .ok_or_else(|| {
                    ServiceError::InternalError("allocation plan referenced unknown warehouse".to_string())
                })?;

            let new_quantity = record.quantity - deduction.quantity;
            let mut active: inventory_record::ActiveModel = record.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(now);
            active.update(conn).await?;
        }

        Ok(plan)
    }

    /// Adds `qty` to the `(product, warehouse)` counter, creating the record
    /// lazily on first movement.
    #[instrument(skip(self, conn))]
    pub async fn credit<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
        warehouse_id: i32,
        qty: i32,
    ) -> Result<(), ServiceError> {
        if qty <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "credit quantity must be positive, got {}",
                qty
            )));
        }

        let now = self.clock.now();
        let existing = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::WarehouseId.eq(warehouse_id))
            .one(conn)
            .await?;

        match existing {
            Some(record) => {
                let new_quantity = record.quantity + qty;
                let mut active: inventory_record::ActiveModel = record.into();
                active.quantity = Set(new_quantity);
                active.updated_at = Set(now);
                active.update(conn).await?;
            }
            None => {
                let record = inventory_record::ActiveModel {
                    product_id: Set(product_id),
                    warehouse_id: Set(warehouse_id),
                    quantity: Set(qty),
                    updated_at: Set(now),
                    ..Default::default()
                };
                record.insert(conn).await?;
            }
        }

        Ok(())
    }

    /// Administrative overwrite used by manual stock correction. Writes the
    /// implicit warehouse record, creating it if absent.
    #[instrument(skip(self))]
    pub async fn set_absolute(&self, product_id: Uuid, qty: i32) -> Result<(), ServiceError> {
        if qty < 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "stock level must not be negative, got {}",
                qty
            )));
        }

        let txn = self.db.begin().await?;
        let now = self.clock.now();

        let existing = InventoryRecordEntity::find()
            .filter(inventory_record::Column::ProductId.eq(product_id))
            .filter(inventory_record::Column::WarehouseId.eq(IMPLICIT_WAREHOUSE_ID))
            .one(&txn)
            .await?;

        let old_quantity = existing.as_ref().map(|r| r.quantity).unwrap_or(0);

        match existing {
            Some(record) => {
                let mut active: inventory_record::ActiveModel = record.into();
                active.quantity = Set(qty);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
            None => {
                let record = inventory_record::ActiveModel {
                    product_id: Set(product_id),
                    warehouse_id: Set(IMPLICIT_WAREHOUSE_ID),
                    quantity: Set(qty),
                    updated_at: Set(now),
                    ..Default::default()
                };
                record.insert(&txn).await?;
            }
        }

        txn.commit().await?;

        info!(%product_id, old_quantity, new_quantity = qty, "Stock level corrected");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::InventoryAdjusted {
                    product_id,
                    warehouse_id: IMPLICIT_WAREHOUSE_ID,
                    old_quantity,
                    new_quantity: qty,
                })
                .await;
        }

        Ok(())
    }
}
