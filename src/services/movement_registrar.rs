use crate::{
    db::DbPool,
    entities::{
        product::{self, Entity as Product},
        stock_movement::{self, Entity as StockMovement, MovementOrigin, MovementType},
        stock_record::{self, Entity as StockRecord},
    },
    errors::{ServiceError, StockShortfall},
    events::{Event, EventSender},
    services::stock_ledger,
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref STOCK_MOVEMENTS_REGISTERED: IntCounter = register_int_counter!(
        "stock_movements_registered_total",
        "Number of stock movements registered"
    )
    .expect("metric can be created");
    static ref STOCK_MOVEMENT_FAILURES: IntCounter = register_int_counter!(
        "stock_movement_failures_total",
        "Number of stock movement registrations rejected"
    )
    .expect("metric can be created");
}

/// Input for registering one stock movement. `quantity` is always a positive
/// magnitude; direction comes from `movement_type`.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub warehouse_id: Uuid,
    pub product_id: Uuid,
    pub movement_type: MovementType,
    pub origin: MovementOrigin,
    pub quantity: Decimal,
    pub counterparty_id: Option<Uuid>,
    pub reference: Option<String>,
    pub created_by: Option<Uuid>,
    /// When set, the product's cost price is updated in the same transaction.
    pub new_cost_price: Option<Decimal>,
    /// When set, the product's sale price is updated in the same transaction.
    pub new_sale_price: Option<Decimal>,
}

/// The only writer of `quantity_on_hand`. Every deduction and addition in the
/// engine, manual or transfer-driven, funnels through here so the movement log
/// and the stock record can never diverge.
#[derive(Clone)]
pub struct MovementRegistrar {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl MovementRegistrar {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Registers a movement in its own transaction and publishes the commit
    /// event.
    #[instrument(skip(self, input), fields(warehouse_id = %input.warehouse_id, product_id = %input.product_id))]
    pub async fn register(
        &self,
        input: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let txn = self
            .db_pool
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let result = register_in_txn(&txn, &input).await;

        let movement = match result {
            Ok(movement) => movement,
            Err(err) => {
                STOCK_MOVEMENT_FAILURES.inc();
                let _ = txn.rollback().await;
                return Err(err);
            }
        };

        let prices_updated = apply_price_update(&txn, &input).await.map_err(|err| {
            STOCK_MOVEMENT_FAILURES.inc();
            err
        })?;

        txn.commit().await.map_err(|e| {
            STOCK_MOVEMENT_FAILURES.inc();
            error!("Failed to commit stock movement: {}", e);
            ServiceError::DatabaseError(e)
        })?;

        STOCK_MOVEMENTS_REGISTERED.inc();
        info!(
            movement_id = %movement.id,
            movement_type = %movement.movement_type,
            origin = %movement.origin,
            quantity = %movement.quantity,
            new_quantity = %movement.new_quantity,
            "Stock movement registered"
        );

        // The movement is committed; a lost event must not fail the caller.
        if let Err(e) = self
            .event_sender
            .send(Event::StockMovementRegistered {
                movement_id: movement.id,
                warehouse_id: movement.warehouse_id,
                product_id: movement.product_id,
                movement_type: movement.movement_type.clone(),
                origin: movement.origin.clone(),
                quantity: movement.quantity,
                new_quantity: movement.new_quantity,
            })
            .await
        {
            warn!(movement_id = %movement.id, error = %e, "Failed to publish movement event");
        }

        if prices_updated {
            if let Err(e) = self
                .event_sender
                .send(Event::ProductPricesUpdated {
                    product_id: input.product_id,
                    cost_price: input.new_cost_price,
                    sale_price: input.new_sale_price,
                })
                .await
            {
                warn!(product_id = %input.product_id, error = %e, "Failed to publish price event");
            }
        }

        Ok(movement)
    }

    /// Fetches one movement by id.
    #[instrument(skip(self))]
    pub async fn get(&self, movement_id: Uuid) -> Result<stock_movement::Model, ServiceError> {
        StockMovement::find_by_id(movement_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Movement {} not found", movement_id)))
    }
}

/// Registers one movement on an existing connection or transaction. Callers
/// composing several movements atomically (the transfer orchestrator) pass
/// their own transaction; `register` wraps this in a fresh one.
///
/// Outbound deductions use a single guarded UPDATE so two concurrent callers
/// can never both succeed against the same remaining stock.
pub(crate) async fn register_in_txn<C: ConnectionTrait>(
    conn: &C,
    input: &NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    if input.quantity <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Movement quantity must be positive".to_string(),
        ));
    }

    let (record, _) =
        stock_ledger::get_or_create_on(conn, input.warehouse_id, input.product_id).await?;

    match input.movement_type {
        MovementType::Outbound => {
            let result = StockRecord::update_many()
                .col_expr(
                    stock_record::Column::QuantityOnHand,
                    Expr::col(stock_record::Column::QuantityOnHand).sub(input.quantity),
                )
                .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_record::Column::Id.eq(record.id))
                .filter(stock_record::Column::QuantityOnHand.gte(input.quantity))
                .exec(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            if result.rows_affected == 0 {
                let available =
                    stock_ledger::current_quantity_on(conn, input.warehouse_id, input.product_id)
                        .await?;
                return Err(ServiceError::InsufficientStock(vec![StockShortfall {
                    product_id: input.product_id,
                    available,
                    requested: input.quantity,
                }]));
            }
        }
        MovementType::Inbound => {
            StockRecord::update_many()
                .col_expr(
                    stock_record::Column::QuantityOnHand,
                    Expr::col(stock_record::Column::QuantityOnHand).add(input.quantity),
                )
                .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(stock_record::Column::Id.eq(record.id))
                .exec(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }
    }

    // Re-read inside the transaction so previous/new reflect the guarded
    // update that actually happened, not the value read before it.
    let new_quantity =
        stock_ledger::current_quantity_on(conn, input.warehouse_id, input.product_id).await?;
    let previous_quantity = match input.movement_type {
        MovementType::Inbound => new_quantity - input.quantity,
        MovementType::Outbound => new_quantity + input.quantity,
    };

    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        warehouse_id: Set(input.warehouse_id),
        product_id: Set(input.product_id),
        movement_type: Set(input.movement_type.as_str().to_string()),
        origin: Set(input.origin.as_str().to_string()),
        quantity: Set(input.quantity),
        previous_quantity: Set(previous_quantity),
        new_quantity: Set(new_quantity),
        counterparty_id: Set(input.counterparty_id),
        reference: Set(input.reference.clone()),
        created_by: Set(input.created_by),
        created_at: Set(Utc::now()),
    };

    movement
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Updates the product's reference prices when the movement carries new ones.
/// Returns whether anything changed.
async fn apply_price_update<C: ConnectionTrait>(
    conn: &C,
    input: &NewMovement,
) -> Result<bool, ServiceError> {
    if input.new_cost_price.is_none() && input.new_sale_price.is_none() {
        return Ok(false);
    }

    let product = Product::find_by_id(input.product_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} not found", input.product_id))
        })?;

    let mut active: product::ActiveModel = product.into();
    if let Some(cost) = input.new_cost_price {
        if cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Cost price cannot be negative".to_string(),
            ));
        }
        active.cost_price = Set(cost);
    }
    if let Some(sale) = input.new_sale_price {
        if sale < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Sale price cannot be negative".to_string(),
            ));
        }
        active.sale_price = Set(sale);
    }
    active.updated_at = Set(Utc::now());

    active
        .update(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(true)
}
