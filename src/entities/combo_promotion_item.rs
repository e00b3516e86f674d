use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "combo_promotion_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub combo_promotion_id: Uuid,
    pub product_id: Uuid,
    pub required_quantity: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::combo_promotion::Entity",
        from = "Column::ComboPromotionId",
        to = "super::combo_promotion::Column::Id"
    )]
    ComboPromotion,
}

impl Related<super::combo_promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComboPromotion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
