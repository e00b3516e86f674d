use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::promotion::{PromotionStatus, PromotionType};

/// A product bundle with its own discount and validity window. Status derives
/// the same way as a promotion's but is refreshed in batch before list views.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "combo_promotions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub promo_type: PromotionType,
    pub discount_value: Decimal,
    /// 0 means unlimited.
    pub usage_limit: i32,
    pub used_count: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: PromotionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::combo_promotion_item::Entity")]
    ComboPromotionItem,
}

impl Related<super::combo_promotion_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComboPromotionItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
