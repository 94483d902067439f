use crate::{
    db::DbPool,
    entities::{
        composite_component::{self, Entity as CompositeComponent},
        product::Entity as Product,
    },
    errors::{ComponentShortfall, ServiceError},
    services::stock_ledger,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Availability of one component for a requested kit quantity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentReport {
    pub component_id: Uuid,
    pub is_mandatory: bool,
    pub required_per_unit: Decimal,
    pub required: Decimal,
    pub available: Decimal,
    pub shortfall: Decimal,
    pub sufficient: bool,
}

/// Full availability report for assembling a composite in one warehouse.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompositeValidation {
    pub composite_id: Uuid,
    pub warehouse_id: Uuid,
    pub requested_quantity: Decimal,
    /// Whether every mandatory component covers the requested quantity.
    pub can_assemble: bool,
    /// Largest whole-kit quantity the mandatory components allow right now.
    pub buildable_quantity: Decimal,
    pub components: Vec<ComponentReport>,
}

/// Answers "can this kit be assembled" against live component stock. A
/// composite holds no stock of its own; availability is always derived from
/// its components, recursively when a component is itself a kit.
#[derive(Clone)]
pub struct CompositeValidator {
    db_pool: Arc<DbPool>,
}

impl CompositeValidator {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Builds the per-component availability report for assembling
    /// `quantity` kits in `warehouse_id`.
    #[instrument(skip(self))]
    pub async fn validate(
        &self,
        composite_id: Uuid,
        warehouse_id: Uuid,
        quantity: Decimal,
    ) -> Result<CompositeValidation, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let product = Product::find_by_id(composite_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", composite_id))
            })?;

        if !product.is_composite {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is not a composite",
                composite_id
            )));
        }

        let components = CompositeComponent::find()
            .filter(composite_component::Column::CompositeId.eq(composite_id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut visited = HashSet::new();
        visited.insert(composite_id);

        let mut reports = Vec::with_capacity(components.len());
        let mut buildable: Option<Decimal> = None;

        for component in &components {
            if component.quantity_required <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Component {} has a non-positive required quantity",
                    component.component_id
                )));
            }

            let available = component_availability(
                self.db_pool.as_ref(),
                component.component_id,
                warehouse_id,
                &mut visited,
            )
            .await?;

            let required = component.quantity_required * quantity;
            let shortfall = (required - available).max(Decimal::ZERO);
            let sufficient = shortfall.is_zero();

            if component.is_mandatory {
                let kits = (available / component.quantity_required).floor();
                buildable = Some(match buildable {
                    Some(current) => current.min(kits),
                    None => kits,
                });
            }

            reports.push(ComponentReport {
                component_id: component.component_id,
                is_mandatory: component.is_mandatory,
                required_per_unit: component.quantity_required,
                required,
                available,
                shortfall,
                sufficient,
            });
        }

        let can_assemble = reports
            .iter()
            .filter(|r| r.is_mandatory)
            .all(|r| r.sufficient);

        Ok(CompositeValidation {
            composite_id,
            warehouse_id,
            requested_quantity: quantity,
            // A kit with no components cannot be assembled at all.
            can_assemble: can_assemble && !reports.is_empty(),
            buildable_quantity: buildable.unwrap_or(Decimal::ZERO),
            components: reports,
        })
    }

    /// Validates and converts mandatory shortfalls into an error, for callers
    /// that need assembly to be possible before proceeding.
    #[instrument(skip(self))]
    pub async fn ensure_assemblable(
        &self,
        composite_id: Uuid,
        warehouse_id: Uuid,
        quantity: Decimal,
    ) -> Result<CompositeValidation, ServiceError> {
        let validation = self.validate(composite_id, warehouse_id, quantity).await?;

        let shortfalls: Vec<ComponentShortfall> = validation
            .components
            .iter()
            .filter(|r| r.is_mandatory && !r.sufficient)
            .map(|r| ComponentShortfall {
                component_id: r.component_id,
                required: r.required,
                available: r.available,
                shortfall: r.shortfall,
                is_mandatory: r.is_mandatory,
            })
            .collect();

        if !shortfalls.is_empty() {
            return Err(ServiceError::CompositeShortfall(shortfalls));
        }

        Ok(validation)
    }
}

/// Stock available for one component. Plain products read their stock record;
/// nested composites derive availability from their own components. The
/// visited set rejects cyclic kit definitions instead of recursing forever.
fn component_availability<'a, C: ConnectionTrait>(
    conn: &'a C,
    product_id: Uuid,
    warehouse_id: Uuid,
    visited: &'a mut HashSet<Uuid>,
) -> Pin<Box<dyn Future<Output = Result<Decimal, ServiceError>> + Send + 'a>> {
    Box::pin(async move {
        if !visited.insert(product_id) {
            return Err(ServiceError::ValidationError(format!(
                "Composite definition contains a cycle through product {}",
                product_id
            )));
        }

        let product = Product::find_by_id(product_id)
            .one(conn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let available = if product.is_composite {
            let components = CompositeComponent::find()
                .filter(composite_component::Column::CompositeId.eq(product_id))
                .all(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            let mut kits: Option<Decimal> = None;
            for component in &components {
                if !component.is_mandatory {
                    continue;
                }
                if component.quantity_required <= Decimal::ZERO {
                    return Err(ServiceError::ValidationError(format!(
                        "Component {} has a non-positive required quantity",
                        component.component_id
                    )));
                }
                let child_available = component_availability(
                    conn,
                    component.component_id,
                    warehouse_id,
                    visited,
                )
                .await?;
                let child_kits = (child_available / component.quantity_required).floor();
                kits = Some(match kits {
                    Some(current) => current.min(child_kits),
                    None => child_kits,
                });
            }
            kits.unwrap_or(Decimal::ZERO)
        } else {
            stock_ledger::current_quantity_on(conn, warehouse_id, product_id).await?
        };

        visited.remove(&product_id);
        Ok(available)
    })
}
