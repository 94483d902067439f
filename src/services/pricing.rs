use crate::{
    db::DbPool,
    entities::{
        price_tier::{self, Entity as PriceTier},
        product::Entity as Product,
    },
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a resolved unit price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Tier,
    BasePrice,
}

/// Result of resolving the unit price for a (product, quantity) pair.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PriceResolution {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total: Decimal,
    pub source: PriceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_label: Option<String>,
}

/// Picks the tier whose range contains `quantity`. Tiers are expected not to
/// overlap; if bad data makes more than one match, the one with the lowest
/// minimum wins so resolution stays deterministic.
pub fn select_tier(tiers: &[price_tier::Model], quantity: Decimal) -> Option<&price_tier::Model> {
    tiers
        .iter()
        .filter(|tier| tier.contains(quantity))
        .min_by_key(|tier| tier.minimum_quantity)
}

/// Resolves unit prices against a product's quantity tiers, falling back to
/// the product's base sale price when no tier matches.
#[derive(Clone)]
pub struct PricingResolver {
    db_pool: Arc<DbPool>,
}

impl PricingResolver {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        product_id: Uuid,
        quantity: Decimal,
    ) -> Result<PriceResolution, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let tiers = PriceTier::find()
            .filter(price_tier::Column::ProductId.eq(product_id))
            .order_by(price_tier::Column::MinimumQuantity, Order::Asc)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        let resolution = match select_tier(&tiers, quantity) {
            Some(tier) => PriceResolution {
                product_id,
                quantity,
                unit_price: tier.unit_price,
                total: tier.unit_price * quantity,
                source: PriceSource::Tier,
                tier_id: Some(tier.id),
                tier_label: Some(tier.tier_label.clone()),
            },
            None => PriceResolution {
                product_id,
                quantity,
                unit_price: product.sale_price,
                total: product.sale_price * quantity,
                source: PriceSource::BasePrice,
                tier_id: None,
                tier_label: None,
            },
        };

        Ok(resolution)
    }

    /// All tiers configured for a product, ordered by minimum quantity.
    #[instrument(skip(self))]
    pub async fn tiers_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<price_tier::Model>, ServiceError> {
        PriceTier::find()
            .filter(price_tier::Column::ProductId.eq(product_id))
            .order_by(price_tier::Column::MinimumQuantity, Order::Asc)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tier(min: Decimal, max: Option<Decimal>, price: Decimal) -> price_tier::Model {
        price_tier::Model {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            minimum_quantity: min,
            maximum_quantity: max,
            unit_price: price,
            tier_label: format!("from-{}", min),
        }
    }

    #[test]
    fn quantity_below_all_tiers_matches_nothing() {
        let tiers = vec![tier(dec!(10), Some(dec!(49)), dec!(9.50))];
        assert!(select_tier(&tiers, dec!(5)).is_none());
    }

    #[test]
    fn boundary_quantities_fall_in_their_tier() {
        let tiers = vec![
            tier(dec!(10), Some(dec!(49)), dec!(9.50)),
            tier(dec!(50), None, dec!(8.00)),
        ];

        assert_eq!(select_tier(&tiers, dec!(10)).unwrap().unit_price, dec!(9.50));
        assert_eq!(select_tier(&tiers, dec!(49)).unwrap().unit_price, dec!(9.50));
        assert_eq!(select_tier(&tiers, dec!(50)).unwrap().unit_price, dec!(8.00));
    }

    #[test]
    fn unbounded_tier_catches_large_quantities() {
        let tiers = vec![tier(dec!(100), None, dec!(7.25))];
        assert_eq!(
            select_tier(&tiers, dec!(1_000_000)).unwrap().unit_price,
            dec!(7.25)
        );
    }

    #[test]
    fn fractional_quantities_resolve() {
        let tiers = vec![tier(dec!(1.5), Some(dec!(9.9)), dec!(4.20))];
        assert!(select_tier(&tiers, dec!(1.4)).is_none());
        assert_eq!(select_tier(&tiers, dec!(2.75)).unwrap().unit_price, dec!(4.20));
    }

    #[test]
    fn overlapping_tiers_resolve_to_lowest_minimum() {
        // Overlap is rejected at configuration time; if bad data slips in,
        // resolution must still be deterministic.
        let tiers = vec![
            tier(dec!(20), Some(dec!(60)), dec!(8.00)),
            tier(dec!(10), Some(dec!(50)), dec!(9.00)),
        ];
        assert_eq!(select_tier(&tiers, dec!(30)).unwrap().unit_price, dec!(9.00));
    }
}
