use crate::{
    db::DbPool,
    entities::{
        stock_movement::{self, Entity as StockMovement},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Read-side view of per-warehouse stock plus the lazy get-or-create of stock
/// records. All quantity mutation goes through the movement registrar; the
/// ledger deliberately exposes no setter.
#[derive(Clone)]
pub struct StockLedger {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

/// Fetches the current on-hand quantity for a (warehouse, product) key on any
/// connection, returning zero when no record exists yet. Shared by the ledger,
/// the composite validator and the transfer orchestrator so they all read the
/// same source of truth.
pub(crate) async fn current_quantity_on<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<Decimal, ServiceError> {
    let record = StockRecord::find()
        .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_record::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(record.map(|r| r.quantity_on_hand).unwrap_or(Decimal::ZERO))
}

/// Idempotent get-or-create of the stock record for a (warehouse, product)
/// key. Insert races are settled by the unique index: the conflicting insert
/// is a no-op and the winner's row is fetched afterwards.
pub(crate) async fn get_or_create_on<C: ConnectionTrait>(
    conn: &C,
    warehouse_id: Uuid,
    product_id: Uuid,
) -> Result<(stock_record::Model, bool), ServiceError> {
    if let Some(record) = StockRecord::find()
        .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_record::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
    {
        return Ok((record, false));
    }

    let now = Utc::now();
    let new_record = stock_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        warehouse_id: Set(warehouse_id),
        product_id: Set(product_id),
        quantity_on_hand: Set(Decimal::ZERO),
        minimum_threshold: Set(Decimal::ZERO),
        location_label: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = StockRecord::insert(new_record)
        .on_conflict(
            OnConflict::columns([
                stock_record::Column::WarehouseId,
                stock_record::Column::ProductId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let record = StockRecord::find()
        .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
        .filter(stock_record::Column::ProductId.eq(product_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Stock record for warehouse {} / product {} vanished after upsert",
                warehouse_id, product_id
            ))
        })?;

    Ok((record, inserted > 0))
}

impl StockLedger {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Returns the stock record for the key, creating a zero-quantity one if
    /// absent.
    #[instrument(skip(self))]
    pub async fn get_or_create(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<stock_record::Model, ServiceError> {
        let (record, created) =
            get_or_create_on(self.db_pool.as_ref(), warehouse_id, product_id).await?;

        if created {
            info!(
                stock_record_id = %record.id,
                warehouse_id = %warehouse_id,
                product_id = %product_id,
                "Stock record created"
            );
            // Row exists either way; a lost event only costs the consumer.
            if let Err(e) = self
                .event_sender
                .send(Event::StockRecordCreated {
                    stock_record_id: record.id,
                    warehouse_id,
                    product_id,
                })
                .await
            {
                warn!(stock_record_id = %record.id, error = %e, "Failed to publish record event");
            }
        }

        Ok(record)
    }

    /// Current quantity on hand for a (warehouse, product) key; zero when the
    /// record does not exist yet.
    #[instrument(skip(self))]
    pub async fn current_quantity(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
    ) -> Result<Decimal, ServiceError> {
        current_quantity_on(self.db_pool.as_ref(), warehouse_id, product_id).await
    }

    /// Sum of a product's stock over all warehouses, for inventory-wide
    /// displays.
    #[instrument(skip(self))]
    pub async fn total_across_warehouses(&self, product_id: Uuid) -> Result<Decimal, ServiceError> {
        let records = StockRecord::find()
            .filter(stock_record::Column::ProductId.eq(product_id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(records.iter().map(|r| r.quantity_on_hand).sum())
    }

    /// Paginated stock listing for one warehouse.
    #[instrument(skip(self))]
    pub async fn list_for_warehouse(
        &self,
        warehouse_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_record::Model>, u64), ServiceError> {
        let paginator = StockRecord::find()
            .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
            .order_by(stock_record::Column::ProductId, Order::Asc)
            .paginate(self.db_pool.as_ref(), limit.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((items, total))
    }

    /// Records at or below their minimum threshold in a warehouse.
    #[instrument(skip(self))]
    pub async fn low_stock(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Vec<stock_record::Model>, ServiceError> {
        let records = StockRecord::find()
            .filter(stock_record::Column::WarehouseId.eq(warehouse_id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(records
            .into_iter()
            .filter(|r| r.quantity_on_hand <= r.minimum_threshold)
            .collect())
    }

    /// Movement log for a (warehouse, product) key, newest first.
    #[instrument(skip(self))]
    pub async fn movements(
        &self,
        warehouse_id: Uuid,
        product_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let paginator = StockMovement::find()
            .filter(stock_movement::Column::WarehouseId.eq(warehouse_id))
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by(stock_movement::Column::CreatedAt, Order::Desc)
            .paginate(self.db_pool.as_ref(), limit.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((items, total))
    }
}
