use crate::{
    db::DbPool,
    entities::serial_unit::{self, Entity as SerialUnit, SerialStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

lazy_static! {
    static ref SERIAL_RESERVATIONS: IntCounter = register_int_counter!(
        "serial_reservations_total",
        "Number of serial units reserved"
    )
    .expect("metric can be created");
    static ref SERIAL_RESERVATION_CONFLICTS: IntCounter = register_int_counter!(
        "serial_reservation_conflicts_total",
        "Number of serial state transitions lost to a concurrent caller"
    )
    .expect("metric can be created");
}

/// Manages the available -> reserved -> sold lifecycle of serialized units.
/// Every transition is a compare-and-swap on the current status, so two
/// callers racing for the same unit can never both win.
#[derive(Clone)]
pub struct SerialAllocator {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl SerialAllocator {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Available units for a product, optionally narrowed to one warehouse.
    #[instrument(skip(self))]
    pub async fn list_available(
        &self,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> Result<Vec<serial_unit::Model>, ServiceError> {
        let mut query = SerialUnit::find()
            .filter(serial_unit::Column::ProductId.eq(product_id))
            .filter(serial_unit::Column::Status.eq(SerialStatus::Available.as_str()));

        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(serial_unit::Column::WarehouseId.eq(warehouse_id));
        }

        query
            .order_by(serial_unit::Column::SerialCode, Order::Asc)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Reserves an available unit for a sale.
    #[instrument(skip(self))]
    pub async fn reserve(
        &self,
        serial_id: Uuid,
        sale_id: Uuid,
    ) -> Result<serial_unit::Model, ServiceError> {
        let result = SerialUnit::update_many()
            .col_expr(
                serial_unit::Column::Status,
                Expr::value(SerialStatus::Reserved.as_str()),
            )
            .col_expr(serial_unit::Column::SaleId, Expr::value(sale_id))
            .col_expr(serial_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(serial_unit::Column::Id.eq(serial_id))
            .filter(serial_unit::Column::Status.eq(SerialStatus::Available.as_str()))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            SERIAL_RESERVATION_CONFLICTS.inc();
            return Err(self.transition_failure(serial_id).await?);
        }

        SERIAL_RESERVATIONS.inc();
        info!(serial_id = %serial_id, sale_id = %sale_id, "Serial unit reserved");
        if let Err(e) = self
            .event_sender
            .send(Event::SerialReserved { serial_id, sale_id })
            .await
        {
            warn!(serial_id = %serial_id, error = %e, "Failed to publish reservation event");
        }

        self.fetch(serial_id).await
    }

    /// Finalizes a reservation into a sale. The unit must be reserved under
    /// the given sale; a reservation whose sale is gone cannot be finalized.
    #[instrument(skip(self))]
    pub async fn finalize(
        &self,
        serial_id: Uuid,
        sale_id: Uuid,
    ) -> Result<serial_unit::Model, ServiceError> {
        let unit = self.fetch(serial_id).await?;

        match SerialStatus::from_str(&unit.status) {
            Some(SerialStatus::Reserved) => {}
            _ => return Err(ServiceError::SerialUnavailable(serial_id)),
        }
        if unit.sale_id != Some(sale_id) {
            warn!(serial_id = %serial_id, sale_id = %sale_id, "Reservation does not belong to sale");
            return Err(ServiceError::SaleExpired(sale_id));
        }

        let result = SerialUnit::update_many()
            .col_expr(
                serial_unit::Column::Status,
                Expr::value(SerialStatus::Sold.as_str()),
            )
            .col_expr(serial_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(serial_unit::Column::Id.eq(serial_id))
            .filter(serial_unit::Column::Status.eq(SerialStatus::Reserved.as_str()))
            .filter(serial_unit::Column::SaleId.eq(sale_id))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            SERIAL_RESERVATION_CONFLICTS.inc();
            return Err(ServiceError::SerialUnavailable(serial_id));
        }

        info!(serial_id = %serial_id, sale_id = %sale_id, "Serial unit sold");
        if let Err(e) = self.event_sender.send(Event::SerialSold { serial_id }).await {
            warn!(serial_id = %serial_id, error = %e, "Failed to publish sale event");
        }

        self.fetch(serial_id).await
    }

    /// Returns a reserved unit to the available pool. Releasing a unit that is
    /// already available is a no-op; a sold unit cannot be released.
    #[instrument(skip(self))]
    pub async fn release(&self, serial_id: Uuid) -> Result<serial_unit::Model, ServiceError> {
        let result = SerialUnit::update_many()
            .col_expr(
                serial_unit::Column::Status,
                Expr::value(SerialStatus::Available.as_str()),
            )
            .col_expr(serial_unit::Column::SaleId, Expr::value(Option::<Uuid>::None))
            .col_expr(serial_unit::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(serial_unit::Column::Id.eq(serial_id))
            .filter(serial_unit::Column::Status.eq(SerialStatus::Reserved.as_str()))
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        if result.rows_affected == 0 {
            let unit = self.fetch(serial_id).await?;
            return match SerialStatus::from_str(&unit.status) {
                Some(SerialStatus::Available) => Ok(unit),
                _ => Err(ServiceError::SerialUnavailable(serial_id)),
            };
        }

        info!(serial_id = %serial_id, "Serial unit released");
        if let Err(e) = self
            .event_sender
            .send(Event::SerialReleased { serial_id })
            .await
        {
            warn!(serial_id = %serial_id, error = %e, "Failed to publish release event");
        }

        self.fetch(serial_id).await
    }

    async fn fetch(&self, serial_id: Uuid) -> Result<serial_unit::Model, ServiceError> {
        SerialUnit::find_by_id(serial_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Serial unit {} not found", serial_id)))
    }

    /// Distinguishes a missing unit from one that lost the CAS race.
    async fn transition_failure(&self, serial_id: Uuid) -> Result<ServiceError, ServiceError> {
        match SerialUnit::find_by_id(serial_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            Some(_) => Ok(ServiceError::SerialUnavailable(serial_id)),
            None => Ok(ServiceError::NotFound(format!(
                "Serial unit {} not found",
                serial_id
            ))),
        }
    }
}
