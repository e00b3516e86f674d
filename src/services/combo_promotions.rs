use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::combo_promotion::{self, Entity as ComboPromotionEntity},
    entities::combo_promotion_item::{self, Entity as ComboPromotionItemEntity},
    errors::ServiceError,
};

use super::promotions::effective_status;

/// Combo promotions share the status-derivation rule with plain promotions
/// but are refreshed as a batch pass before list views rather than on each
/// lookup. They have no order-time redemption path.
#[derive(Clone)]
pub struct ComboPromotionService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
}

impl ComboPromotionService {
    pub fn new(db: Arc<DatabaseConnection>, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Flips every combo whose derived status disagrees with the stored one.
    /// Returns how many rows changed.
    #[instrument(skip(self))]
    pub async fn refresh_statuses(&self) -> Result<usize, ServiceError> {
        let now = self.clock.now();
        let combos = ComboPromotionEntity::find().all(&*self.db).await?;

        let mut changed = 0;
        for combo in combos {
            let derived = effective_status(
                now,
                combo.start_date,
                combo.end_date,
                combo.used_count,
                combo.usage_limit,
            );
            if derived != combo.status {
                let mut active: combo_promotion::ActiveModel = combo.into();
                active.status = Set(derived);
                active.updated_at = Set(Some(now));
                active.update(&*self.db).await?;
                changed += 1;
            }
        }

        if changed > 0 {
            info!(changed, "Combo promotion statuses refreshed");
        }
        Ok(changed)
    }

    /// Lists combos newest first. Freshness is per-request: statuses are
    /// refreshed before the rows are read back.
    pub async fn list(&self) -> Result<Vec<combo_promotion::Model>, ServiceError> {
        self.refresh_statuses().await?;

        Ok(ComboPromotionEntity::find()
            .order_by_desc(combo_promotion::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Single lookup; intentionally does not refresh.
    pub async fn get(&self, combo_id: Uuid) -> Result<combo_promotion::Model, ServiceError> {
        ComboPromotionEntity::find_by_id(combo_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Combo promotion {} not found", combo_id)))
    }

    pub async fn items(
        &self,
        combo_id: Uuid,
    ) -> Result<Vec<combo_promotion_item::Model>, ServiceError> {
        Ok(ComboPromotionItemEntity::find()
            .filter(combo_promotion_item::Column::ComboPromotionId.eq(combo_id))
            .all(&*self.db)
            .await?)
    }
}
