use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{AuditRecord, AuditSink},
    clock::SharedClock,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::payment::{self, Entity as PaymentEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::CatalogService,
    services::inventory::InventoryService,
    services::promotions::{compute_discount, PricedLine, PromotionService},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub promo_code: Option<String>,
    #[validate(length(min = 1, message = "Order must contain at least one line"))]
    pub items: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(length(min = 1, message = "Payment method is required"))]
    pub method: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub method: String,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub promotion_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn generate_order_number(id: Uuid) -> String {
    format!("ORD-{}", id.to_string()[..8].to_uppercase())
}

/// Order fulfillment: produces a financially consistent order or fails the
/// whole operation with no partial effects.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    inventory: InventoryService,
    promotions: PromotionService,
    catalog: CatalogService,
    audit: AuditSink,
    event_sender: Option<EventSender>,
    clock: SharedClock,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: InventoryService,
        promotions: PromotionService,
        catalog: CatalogService,
        audit: AuditSink,
        event_sender: Option<EventSender>,
        clock: SharedClock,
    ) -> Self {
        Self {
            db,
            inventory,
            promotions,
            catalog,
            audit,
            event_sender,
            clock,
        }
    }

    /// Creates an order in one transaction: price snapshot, availability
    /// check and multi-warehouse allocation per line, optional promotion
    /// applied and consumed, header and items persisted. Any failure rolls
    /// the whole thing back.
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        for line in &request.items {
            if line.quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "line quantity must be positive, got {}",
                    line.quantity
                )));
            }
        }

        let txn = self.db.begin().await?;
        let now = self.clock.now();

        let user_id = self.catalog.resolve_user(&txn, request.user_id).await?;

        // Price each line at the product's current price; a dangling product
        // reference skips the line rather than failing the order.
        let mut priced = Vec::new();
        let mut total_amount = Decimal::ZERO;
        for line in &request.items {
            let Some(product) = self.catalog.get_product(&txn, line.product_id).await? else {
                debug!(product_id = %line.product_id, "Skipping order line for unknown product");
                continue;
            };

            let available = self.inventory.total_available(&txn, product.id).await?;
            if available < line.quantity {
                return Err(ServiceError::InsufficientStock {
                    product: product.name.clone(),
                    requested: line.quantity,
                    available,
                });
            }

            let subtotal = product.unit_price * Decimal::from(line.quantity);
            total_amount += subtotal;
            priced.push((product, line.quantity, subtotal));
        }

        // Deduct stock line by line, each line draining warehouses in
        // ascending id order.
        for (product, quantity, _) in &priced {
            self.inventory
                .allocate(&txn, product.id, &product.name, *quantity)
                .await?;
        }

        // A promo code that fails validation is silently ignored; the order
        // proceeds at full price.
        let mut discount_amount = Decimal::ZERO;
        let mut promotion_id = None;
        if let Some(code) = request.promo_code.as_deref().filter(|c| !c.is_empty()) {
            if let Some(promo) = self
                .promotions
                .find_for_redemption(&txn, code, total_amount)
                .await?
            {
                let scope_products = self.promotions.scope_products(&txn, promo.id).await?;
                let lines: Vec<PricedLine> = priced
                    .iter()
                    .map(|(product, quantity, subtotal)| PricedLine {
                        product_id: product.id,
                        quantity: *quantity,
                        subtotal: *subtotal,
                    })
                    .collect();

                let discount = compute_discount(&promo, &scope_products, total_amount, &lines);
                if discount > Decimal::ZERO {
                    self.promotions.consume(&txn, promo.id).await?;
                    discount_amount = discount;
                    promotion_id = Some(promo.id);
                } else {
                    debug!(code, "Promotion matched but yields no discount");
                }
            }
        }

        let order_id = Uuid::new_v4();
        let header = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(order_id)),
            customer_id: Set(request.customer_id),
            user_id: Set(user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total_amount),
            discount_amount: Set(discount_amount),
            promotion_id: Set(promotion_id),
            created_at: Set(now),
        };
        let header = header.insert(&txn).await?;

        let mut items = Vec::with_capacity(priced.len());
        for (product, quantity, subtotal) in &priced {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                quantity: Set(*quantity),
                unit_price: Set(product.unit_price),
                subtotal: Set(*subtotal),
            };
            items.push(item.insert(&txn).await?);
        }

        txn.commit().await?;

        info!(
            %order_id,
            %total_amount,
            %discount_amount,
            promotion_applied = promotion_id.is_some(),
            "Order created"
        );

        self.audit.log(AuditRecord {
            action: "create".to_string(),
            entity_type: "order".to_string(),
            entity_id: order_id.to_string(),
            entity_name: header.order_number.clone(),
            old_values: None,
            new_values: Some(serde_json::json!({
                "total_amount": total_amount,
                "discount_amount": discount_amount,
                "promotion_id": promotion_id,
                "items": items
                    .iter()
                    .map(|i| serde_json::json!({
                        "product_id": i.product_id,
                        "quantity": i.quantity,
                        "unit_price": i.unit_price,
                    }))
                    .collect::<Vec<_>>(),
            })),
            summary: format!(
                "Order {} created with {} line(s)",
                header.order_number,
                items.len()
            ),
            actor_user_id: user_id,
            actor_username: None,
            extra: None,
            recorded_at: now,
        });

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderCreated {
                    order_id,
                    total_amount,
                    discount_amount,
                    promotion_id,
                })
                .await;
            if let Some(promotion_id) = promotion_id {
                sender
                    .send_or_log(Event::PromotionRedeemed {
                        promotion_id,
                        order_id,
                        discount_amount,
                    })
                    .await;
            }
        }

        self.hydrate(header, items, Vec::new()).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let header = OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        let payments = PaymentEntity::find()
            .filter(payment::Column::OrderId.eq(order_id))
            .order_by_asc(payment::Column::PaidAt)
            .all(&*self.db)
            .await?;

        self.hydrate(header, items, payments).await
    }

    /// Lists orders newest first with pagination.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let headers = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut orders = Vec::with_capacity(headers.len());
        for header in headers {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(header.id))
                .all(&*self.db)
                .await?;
            let payments = PaymentEntity::find()
                .filter(payment::Column::OrderId.eq(header.id))
                .all(&*self.db)
                .await?;
            orders.push(self.hydrate(header, items, payments).await?);
        }

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Records a payment. The first payment moves the order to paid; the
    /// model permits further payments without reconciling amounts.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn record_payment(
        &self,
        order_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = self.clock.now();

        let header = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if header.status == OrderStatus::Canceled {
            return Err(ServiceError::InvalidState(
                "Cannot record a payment against a canceled order".to_string(),
            ));
        }

        let record = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            method: Set(request.method),
            amount: Set(request.amount),
            paid_at: Set(now),
        };
        record.insert(&txn).await?;

        let header = if header.status == OrderStatus::Pending {
            let mut active: order::ActiveModel = header.into();
            active.status = Set(OrderStatus::Paid);
            active.update(&txn).await?
        } else {
            header
        };

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderPaymentRecorded {
                    order_id,
                    amount: request.amount,
                })
                .await;
        }

        self.get_order(header.id).await
    }

    /// Cancels a pending order. Paid and canceled orders are terminal.
    /// Cancellation does not restock; manual corrections go through the
    /// inventory service.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let header = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match header.status {
            OrderStatus::Pending => {}
            OrderStatus::Paid => {
                return Err(ServiceError::InvalidState(
                    "A paid order cannot be canceled".to_string(),
                ));
            }
            OrderStatus::Canceled => {
                return Err(ServiceError::InvalidState(
                    "Order is already canceled".to_string(),
                ));
            }
        }

        let mut active: order::ActiveModel = header.into();
        active.status = Set(OrderStatus::Canceled);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(%order_id, "Order canceled");

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderCanceled(order_id)).await;
        }

        self.get_order(order_id).await
    }

    async fn hydrate(
        &self,
        header: order::Model,
        items: Vec<order_item::Model>,
        payments: Vec<payment::Model>,
    ) -> Result<OrderResponse, ServiceError> {
        let customer_name = match header.customer_id {
            Some(id) => self.catalog.customer_name(id).await?,
            None => None,
        };
        let username = match header.user_id {
            Some(id) => self.catalog.username(id).await?,
            None => None,
        };

        Ok(OrderResponse {
            id: header.id,
            order_number: header.order_number,
            customer_id: header.customer_id,
            customer_name,
            user_id: header.user_id,
            username,
            status: header.status,
            total_amount: header.total_amount,
            discount_amount: header.discount_amount,
            promotion_id: header.promotion_id,
            created_at: header.created_at,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    subtotal: item.subtotal,
                })
                .collect(),
            payments: payments
                .into_iter()
                .map(|p| PaymentResponse {
                    id: p.id,
                    method: p.method,
                    amount: p.amount,
                    paid_at: p.paid_at,
                })
                .collect(),
        })
    }
}
