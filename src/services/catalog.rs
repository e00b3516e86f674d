use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::customer::Entity as CustomerEntity,
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::{self, Entity as ProductEntity, ProductStatus},
    entities::user::Entity as UserEntity,
    errors::ServiceError,
};

/// Thin boundary over the catalog and directory tables: lookups the core
/// needs, plus the product retirement rule.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    pub async fn get_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        Ok(ProductEntity::find_by_id(product_id).one(conn).await?)
    }

    /// Resolves the placing user: the given id when it references an
    /// existing user, otherwise an arbitrary existing user. The application
    /// never blocks an order for want of a recognized user.
    pub async fn resolve_user<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: Option<Uuid>,
    ) -> Result<Option<Uuid>, ServiceError> {
        if let Some(id) = user_id {
            if UserEntity::find_by_id(id).one(conn).await?.is_some() {
                return Ok(Some(id));
            }
        }

        let fallback = UserEntity::find().one(conn).await?;
        Ok(fallback.map(|u| u.id))
    }

    pub async fn customer_name(&self, customer_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(CustomerEntity::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .map(|c| c.name))
    }

    pub async fn username(&self, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(UserEntity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .map(|u| u.username))
    }

    /// Retires or deletes a product. A product with sales history is never
    /// hard-deleted, only flipped to inactive; a never-sold product is
    /// removed outright.
    #[instrument(skip(self))]
    pub async fn retire_or_delete(&self, product_id: Uuid) -> Result<ProductStatus, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let sold = OrderItemEntity::find()
            .filter(order_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;

        if sold == 0 {
            product.delete(&*self.db).await?;
            info!(%product_id, "Product deleted (no sales history)");
            return Ok(ProductStatus::Inactive);
        }

        let mut active: product::ActiveModel = product.into();
        active.status = Set(ProductStatus::Inactive);
        active.updated_at = Set(Some(self.clock.now()));
        active.update(&*self.db).await?;
        info!(%product_id, "Product retired");
        Ok(ProductStatus::Inactive)
    }

    /// A retired product may come back; retirement only protects history.
    #[instrument(skip(self))]
    pub async fn reactivate(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        let product = ProductEntity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let mut active: product::ActiveModel = product.into();
        active.status = Set(ProductStatus::Active);
        active.updated_at = Set(Some(self.clock.now()));
        Ok(active.update(&*self.db).await?)
    }
}
