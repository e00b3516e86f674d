use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after a transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        total_amount: Decimal,
        discount_amount: Decimal,
        promotion_id: Option<Uuid>,
    },
    OrderPaymentRecorded {
        order_id: Uuid,
        amount: Decimal,
    },
    OrderCanceled(Uuid),
    InventoryAdjusted {
        product_id: Uuid,
        warehouse_id: i32,
        old_quantity: i32,
        new_quantity: i32,
    },
    PromotionRedeemed {
        promotion_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    },
    PurchaseOrderReceived {
        purchase_order_id: Uuid,
        warehouse_id: i32,
        total_amount: Decimal,
    },
    PurchaseOrderDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing the failure to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged and swallowed so
    /// event emission can never fail a committed transaction.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(error = %e, ?event, "Dropping event");
        }
    }
}

/// Builds an event channel plus a drain task that logs everything received.
/// Consumers wanting more than logs subscribe by replacing the drain task.
pub fn channel(buffer: usize) -> (EventSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(buffer);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(target: "events", ?event, "event");
        }
    });
    (EventSender::new(tx), handle)
}
