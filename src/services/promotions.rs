use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    entities::promotion::{self, Entity as PromotionEntity, PromotionScope, PromotionStatus, PromotionType},
    entities::promotion_product::{self, Entity as PromotionProductEntity},
    errors::ServiceError,
};

/// A priced order line, as seen by discount computation.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Derives a promotion's status from its date window and usage counter.
/// Date-window checks take precedence over the usage check; a usage limit of
/// zero means unlimited.
pub(crate) fn effective_status(
    now: DateTime<Utc>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    used_count: i32,
    usage_limit: i32,
) -> PromotionStatus {
    if now < start_date || now > end_date {
        return PromotionStatus::Inactive;
    }
    if usage_limit > 0 && used_count >= usage_limit {
        return PromotionStatus::Inactive;
    }
    PromotionStatus::Active
}

/// The subtotal a promotion's discount applies against: the whole order, the
/// listed products' lines, or the bundle lines when every bundle requirement
/// is met (zero otherwise).
fn applicable_base(
    promo: &promotion::Model,
    scope_products: &[promotion_product::Model],
    order_subtotal: Decimal,
    lines: &[PricedLine],
) -> Decimal {
    match promo.scope {
        PromotionScope::Order => order_subtotal,
        PromotionScope::Products => lines
            .iter()
            .filter(|line| {
                scope_products
                    .iter()
                    .any(|sp| sp.product_id == line.product_id)
            })
            .map(|line| line.subtotal)
            .sum(),
        PromotionScope::Combo => {
            let satisfied = !scope_products.is_empty()
                && scope_products.iter().all(|sp| {
                    let ordered: i32 = lines
                        .iter()
                        .filter(|line| line.product_id == sp.product_id)
                        .map(|line| line.quantity)
                        .sum();
                    ordered >= sp.required_quantity
                });
            if !satisfied {
                return Decimal::ZERO;
            }
            lines
                .iter()
                .filter(|line| {
                    scope_products
                        .iter()
                        .any(|sp| sp.product_id == line.product_id)
                })
                .map(|line| line.subtotal)
                .sum()
        }
    }
}

/// Computes the discount amount, capped at the applicable subtotal so a
/// discount can never exceed the amount it applies to.
pub fn compute_discount(
    promo: &promotion::Model,
    scope_products: &[promotion_product::Model],
    order_subtotal: Decimal,
    lines: &[PricedLine],
) -> Decimal {
    let base = applicable_base(promo, scope_products, order_subtotal, lines);
    if base <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let discount = match promo.promo_type {
        PromotionType::Percent => base * promo.discount_value / Decimal::from(100),
        PromotionType::Fixed => promo.discount_value,
    };

    discount.min(base).max(Decimal::ZERO)
}

/// Promotion lifecycle: status is a derived fact recomputed on every read or
/// redemption and persisted when it flips, never set directly by users.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
    clock: SharedClock,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>, clock: SharedClock) -> Self {
        Self { db, clock }
    }

    /// Applies the derivation rule, persisting the status when it changed.
    /// Returns the fresh model and whether it flipped.
    pub async fn recompute<C: ConnectionTrait>(
        &self,
        conn: &C,
        promo: promotion::Model,
    ) -> Result<(promotion::Model, bool), ServiceError> {
        let derived = effective_status(
            self.clock.now(),
            promo.start_date,
            promo.end_date,
            promo.used_count,
            promo.usage_limit,
        );

        if derived == promo.status {
            return Ok((promo, false));
        }

        let mut active: promotion::ActiveModel = promo.into();
        active.status = Set(derived);
        active.updated_at = Set(Some(self.clock.now()));
        let updated = active.update(conn).await?;
        Ok((updated, true))
    }

    pub async fn get(&self, promotion_id: Uuid) -> Result<promotion::Model, ServiceError> {
        let promo = PromotionEntity::find_by_id(promotion_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promotion {} not found", promotion_id)))?;

        let (promo, _) = self.recompute(&*self.db, promo).await?;
        Ok(promo)
    }

    /// Lists promotions newest first, refreshing each row's derived status.
    pub async fn list(&self) -> Result<Vec<promotion::Model>, ServiceError> {
        let promos = PromotionEntity::find()
            .order_by_desc(promotion::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut refreshed = Vec::with_capacity(promos.len());
        for promo in promos {
            let (promo, _) = self.recompute(&*self.db, promo).await?;
            refreshed.push(promo);
        }
        Ok(refreshed)
    }

    /// Looks up a code for redemption. Anything short of an active promotion
    /// whose minimum order amount is met behaves as not-found; the caller
    /// proceeds without a discount rather than failing the order.
    #[instrument(skip(self, conn))]
    pub async fn find_for_redemption<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        order_subtotal: Decimal,
    ) -> Result<Option<promotion::Model>, ServiceError> {
        let promo = PromotionEntity::find()
            .filter(promotion::Column::Code.eq(code))
            .one(conn)
            .await?;

        let Some(promo) = promo else {
            debug!(code, "Promo code does not exist");
            return Ok(None);
        };

        let (promo, _) = self.recompute(conn, promo).await?;

        if promo.status != PromotionStatus::Active {
            debug!(code, "Promotion is not active");
            return Ok(None);
        }

        if order_subtotal < promo.min_order_amount {
            debug!(
                code,
                %order_subtotal,
                min_order_amount = %promo.min_order_amount,
                "Subtotal below promotion minimum"
            );
            return Ok(None);
        }

        Ok(Some(promo))
    }

    /// The products a product- or combo-scoped promotion applies to.
    pub async fn scope_products<C: ConnectionTrait>(
        &self,
        conn: &C,
        promotion_id: Uuid,
    ) -> Result<Vec<promotion_product::Model>, ServiceError> {
        Ok(PromotionProductEntity::find()
            .filter(promotion_product::Column::PromotionId.eq(promotion_id))
            .all(conn)
            .await?)
    }

    /// Consumes one use and re-derives status so exhaustion is visible
    /// immediately. Must run inside the transaction of the order that
    /// redeems it.
    #[instrument(skip(self, conn))]
    pub async fn consume<C: ConnectionTrait>(
        &self,
        conn: &C,
        promotion_id: Uuid,
    ) -> Result<(), ServiceError> {
        let promo = PromotionEntity::find_by_id(promotion_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promotion {} not found", promotion_id)))?;

        let used_count = promo.used_count + 1;
        if promo.usage_limit > 0 && used_count > promo.usage_limit {
            // find_for_redemption already filters exhausted codes; hitting
            // this means two checkouts raced past the limit.
            warn!(%promotion_id, "Promotion usage limit exceeded during consume");
            return Err(ServiceError::InvalidState(format!(
                "Promotion {} has reached its usage limit",
                promo.code
            )));
        }

        let status = effective_status(
            self.clock.now(),
            promo.start_date,
            promo.end_date,
            used_count,
            promo.usage_limit,
        );

        let mut active: promotion::ActiveModel = promo.into();
        active.used_count = Set(used_count);
        active.status = Set(status);
        active.updated_at = Set(Some(self.clock.now()));
        active.update(conn).await?;

        Ok(())
    }

    /// Validity windows are fixed at creation; the end date may only be
    /// extended, never shortened.
    #[instrument(skip(self))]
    pub async fn extend_validity(
        &self,
        promotion_id: Uuid,
        new_end_date: DateTime<Utc>,
    ) -> Result<promotion::Model, ServiceError> {
        let promo = PromotionEntity::find_by_id(promotion_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promotion {} not found", promotion_id)))?;

        if new_end_date < promo.end_date {
            return Err(ServiceError::ValidationError(format!(
                "End date can only be extended: {} is before {}",
                new_end_date, promo.end_date
            )));
        }

        let mut active: promotion::ActiveModel = promo.into();
        active.end_date = Set(new_end_date);
        active.updated_at = Set(Some(self.clock.now()));
        let updated = active.update(&*self.db).await?;

        // Extension may bring an expired promotion back into its window.
        let (updated, _) = self.recompute(&*self.db, updated).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn promo(
        promo_type: PromotionType,
        scope: PromotionScope,
        discount_value: Decimal,
    ) -> promotion::Model {
        promotion::Model {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            code: "TEST".to_string(),
            promo_type,
            scope,
            discount_value,
            min_order_amount: Decimal::ZERO,
            usage_limit: 0,
            used_count: 0,
            start_date: now() - Duration::days(1),
            end_date: now() + Duration::days(1),
            status: PromotionStatus::Active,
            created_at: now() - Duration::days(1),
            updated_at: None,
        }
    }

    #[test]
    fn status_is_inactive_before_the_window_opens() {
        let status = effective_status(now(), now() + Duration::days(1), now() + Duration::days(7), 0, 0);
        assert_eq!(status, PromotionStatus::Inactive);
    }

    #[test]
    fn status_is_inactive_after_the_window_closes() {
        let status = effective_status(now(), now() - Duration::days(7), now() - Duration::days(1), 0, 0);
        assert_eq!(status, PromotionStatus::Inactive);
    }

    #[test]
    fn date_window_takes_precedence_over_unlimited_usage() {
        // usage_limit = 0 is unlimited, but an expired window still wins.
        let status = effective_status(now(), now() - Duration::days(7), now() - Duration::days(1), 100, 0);
        assert_eq!(status, PromotionStatus::Inactive);
    }

    #[test]
    fn exhausted_usage_deactivates_inside_the_window() {
        let status = effective_status(now(), now() - Duration::days(1), now() + Duration::days(1), 2, 2);
        assert_eq!(status, PromotionStatus::Inactive);
    }

    #[test]
    fn in_window_with_remaining_uses_is_active() {
        let status = effective_status(now(), now() - Duration::days(1), now() + Duration::days(1), 1, 2);
        assert_eq!(status, PromotionStatus::Active);
    }

    #[test]
    fn percent_discount_on_order_scope() {
        let promo = promo(PromotionType::Percent, PromotionScope::Order, dec!(10));
        let discount = compute_discount(&promo, &[], dec!(250000), &[]);
        assert_eq!(discount, dec!(25000));
    }

    #[test]
    fn fixed_discount_is_capped_at_the_order_subtotal() {
        let promo = promo(PromotionType::Fixed, PromotionScope::Order, dec!(100000));
        let discount = compute_discount(&promo, &[], dec!(60000), &[]);
        assert_eq!(discount, dec!(60000));
    }

    #[test]
    fn product_scope_only_counts_matching_lines() {
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        let promo = promo(PromotionType::Percent, PromotionScope::Products, dec!(20));
        let scope = vec![promotion_product::Model {
            id: 1,
            promotion_id: promo.id,
            product_id: product_a,
            required_quantity: 1,
        }];
        let lines = vec![
            PricedLine {
                product_id: product_a,
                quantity: 2,
                subtotal: dec!(40000),
            },
            PricedLine {
                product_id: product_b,
                quantity: 1,
                subtotal: dec!(100000),
            },
        ];
        let discount = compute_discount(&promo, &scope, dec!(140000), &lines);
        assert_eq!(discount, dec!(8000));
    }

    #[test]
    fn combo_scope_is_all_or_nothing() {
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        let promo = promo(PromotionType::Percent, PromotionScope::Combo, dec!(50));
        let scope = vec![
            promotion_product::Model {
                id: 1,
                promotion_id: promo.id,
                product_id: product_a,
                required_quantity: 2,
            },
            promotion_product::Model {
                id: 2,
                promotion_id: promo.id,
                product_id: product_b,
                required_quantity: 1,
            },
        ];

        // Bundle short one unit of product A: no discount at all.
        let partial = vec![
            PricedLine {
                product_id: product_a,
                quantity: 1,
                subtotal: dec!(20000),
            },
            PricedLine {
                product_id: product_b,
                quantity: 1,
                subtotal: dec!(30000),
            },
        ];
        assert_eq!(compute_discount(&promo, &scope, dec!(50000), &partial), Decimal::ZERO);

        // Full bundle: half off the bundle lines.
        let full = vec![
            PricedLine {
                product_id: product_a,
                quantity: 2,
                subtotal: dec!(40000),
            },
            PricedLine {
                product_id: product_b,
                quantity: 1,
                subtotal: dec!(30000),
            },
        ];
        assert_eq!(compute_discount(&promo, &scope, dec!(70000), &full), dec!(35000));
    }

    #[test]
    fn fixed_discount_on_empty_product_scope_is_zero() {
        let promo = promo(PromotionType::Fixed, PromotionScope::Products, dec!(5000));
        let lines = vec![PricedLine {
            product_id: Uuid::new_v4(),
            quantity: 1,
            subtotal: dec!(10000),
        }];
        assert_eq!(compute_discount(&promo, &[], dec!(10000), &lines), Decimal::ZERO);
    }
}
