use crate::{
    db::DbPool,
    entities::{
        stock_movement::{MovementOrigin, MovementType},
        transfer::{self, Entity as Transfer, TransferStatus},
        transfer_line::{self, Entity as TransferLine},
        warehouse::{self, Entity as Warehouse},
    },
    errors::{ServiceError, StockShortfall},
    events::{Event, EventSender},
    services::movement_registrar::{self, NewMovement},
    services::stock_ledger,
};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, IntCounter};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

lazy_static! {
    static ref TRANSFERS_CREATED: IntCounter = register_int_counter!(
        "transfers_created_total",
        "Number of warehouse transfers created"
    )
    .expect("metric can be created");
    static ref TRANSFERS_CANCELLED: IntCounter = register_int_counter!(
        "transfers_cancelled_total",
        "Number of warehouse transfers cancelled"
    )
    .expect("metric can be created");
}

/// One product line of a transfer request.
#[derive(Debug, Clone)]
pub struct NewTransferLine {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// Input for creating a transfer between two warehouses.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub company_id: Uuid,
    pub source_warehouse_id: Uuid,
    pub destination_warehouse_id: Uuid,
    pub created_by: Uuid,
    pub notes: Option<String>,
    pub lines: Vec<NewTransferLine>,
}

/// Per-line received quantity for a partial receive. Lines not listed receive
/// their full sent quantity.
#[derive(Debug, Clone)]
pub struct ReceivedLine {
    pub line_id: Uuid,
    pub quantity_received: Decimal,
}

/// A transfer with its lines, the shape handlers return.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferWithLines {
    #[serde(flatten)]
    pub transfer: transfer::Model,
    pub lines: Vec<transfer_line::Model>,
}

/// Filters for listing transfers.
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub company_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub status: Option<TransferStatus>,
}

/// Per-status counts for the transfer dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferStatistics {
    pub total: u64,
    pub pending: u64,
    pub in_transit: u64,
    pub completed: u64,
    pub partial: u64,
    pub cancelled: u64,
}

/// Drives transfers through pending -> in_transit -> completed/partial, with
/// cancellation from either live state. All stock effects go through the
/// movement registrar inside one transaction per action, so a transfer can
/// never half-apply.
#[derive(Clone)]
pub struct TransferOrchestrator {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
}

impl TransferOrchestrator {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a pending transfer. Availability at the source is checked here
    /// so obviously unfillable transfers are rejected upfront, but stock only
    /// moves at `send`.
    #[instrument(skip(self, input), fields(source = %input.source_warehouse_id, destination = %input.destination_warehouse_id))]
    pub async fn create(&self, input: NewTransfer) -> Result<TransferWithLines, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Transfer must have at least one line".to_string(),
            ));
        }
        if input.lines.iter().any(|l| l.quantity <= Decimal::ZERO) {
            return Err(ServiceError::ValidationError(
                "Line quantities must be positive".to_string(),
            ));
        }
        if input.source_warehouse_id == input.destination_warehouse_id {
            return Err(ServiceError::InvalidTransferRoute(
                "Source and destination warehouse must differ".to_string(),
            ));
        }

        self.check_endpoint(input.source_warehouse_id, input.company_id, "Source")
            .await?;
        self.check_endpoint(input.destination_warehouse_id, input.company_id, "Destination")
            .await?;

        let shortfalls = self
            .availability_shortfalls(
                self.db_pool.as_ref(),
                input.source_warehouse_id,
                &input.lines,
            )
            .await?;
        if !shortfalls.is_empty() {
            return Err(ServiceError::InsufficientStock(shortfalls));
        }

        let txn = self
            .db_pool
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let transfer_id = Uuid::new_v4();
        let code = generate_code();
        let now = Utc::now();

        let transfer = transfer::ActiveModel {
            id: Set(transfer_id),
            code: Set(code.clone()),
            company_id: Set(input.company_id),
            source_warehouse_id: Set(input.source_warehouse_id),
            destination_warehouse_id: Set(input.destination_warehouse_id),
            status: Set(TransferStatus::Pending.as_str().to_string()),
            created_by: Set(input.created_by),
            notes: Set(input.notes.clone()),
            cancelled_reason: Set(None),
            sent_at: Set(None),
            received_at: Set(None),
            cancelled_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let transfer = transfer.insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let line_models: Vec<transfer_line::ActiveModel> = input
            .lines
            .iter()
            .map(|line| transfer_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                transfer_id: Set(transfer_id),
                product_id: Set(line.product_id),
                quantity_sent: Set(line.quantity),
                quantity_received: Set(None),
            })
            .collect();
        TransferLine::insert_many(line_models)
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        TRANSFERS_CREATED.inc();
        info!(transfer_id = %transfer_id, code = %code, "Transfer created");
        if let Err(e) = self
            .event_sender
            .send(Event::TransferCreated {
                transfer_id,
                code: code.clone(),
            })
            .await
        {
            warn!(transfer_id = %transfer_id, error = %e, "Failed to publish transfer event");
        }

        self.get(transfer_id).await
    }

    /// Dispatches a pending transfer: deducts every line from the source
    /// warehouse atomically and marks the transfer in transit.
    #[instrument(skip(self))]
    pub async fn send(&self, transfer_id: Uuid) -> Result<TransferWithLines, ServiceError> {
        let (transfer, lines) = self.fetch_with_lines(transfer_id).await?;
        self.require_status(&transfer, TransferStatus::Pending, "send")?;

        let txn = self
            .db_pool
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        // Aggregate shortfalls first so the caller sees every failing line,
        // not just the first one the guarded update happens to hit.
        let requested: Vec<NewTransferLine> = lines
            .iter()
            .map(|l| NewTransferLine {
                product_id: l.product_id,
                quantity: l.quantity_sent,
            })
            .collect();
        let shortfalls = self
            .availability_shortfalls(&txn, transfer.source_warehouse_id, &requested)
            .await?;
        if !shortfalls.is_empty() {
            let _ = txn.rollback().await;
            return Err(ServiceError::InsufficientStock(shortfalls));
        }

        for line in &lines {
            movement_registrar::register_in_txn(
                &txn,
                &NewMovement {
                    warehouse_id: transfer.source_warehouse_id,
                    product_id: line.product_id,
                    movement_type: MovementType::Outbound,
                    origin: MovementOrigin::Transfer,
                    quantity: line.quantity_sent,
                    counterparty_id: Some(transfer.destination_warehouse_id),
                    reference: Some(transfer.code.clone()),
                    created_by: Some(transfer.created_by),
                    new_cost_price: None,
                    new_sale_price: None,
                },
            )
            .await?;
        }

        // CAS on the prior status: a concurrent send loses here and its
        // movements roll back with the transaction.
        let claimed = Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::InTransit.as_str()),
            )
            .col_expr(transfer::Column::SentAt, Expr::value(Some(Utc::now())))
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::Id.eq(transfer_id))
            .filter(transfer::Column::Status.eq(TransferStatus::Pending.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            let _ = txn.rollback().await;
            return Err(self.lost_transition(transfer_id, "send").await?);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(transfer_id = %transfer_id, lines = lines.len(), "Transfer sent");
        if let Err(e) = self
            .event_sender
            .send(Event::TransferSent {
                transfer_id,
                line_count: lines.len(),
            })
            .await
        {
            warn!(transfer_id = %transfer_id, error = %e, "Failed to publish transfer event");
        }

        self.get(transfer_id).await
    }

    /// Confirms arrival at the destination. With no overrides every line is
    /// received in full and the transfer completes; per-line overrides below
    /// the sent quantity end the transfer in the terminal `partial` state, and
    /// the missing remainder is left to a manual adjustment.
    #[instrument(skip(self, received))]
    pub async fn receive(
        &self,
        transfer_id: Uuid,
        received: Vec<ReceivedLine>,
    ) -> Result<TransferWithLines, ServiceError> {
        let (transfer, lines) = self.fetch_with_lines(transfer_id).await?;
        self.require_status(&transfer, TransferStatus::InTransit, "receive")?;

        let overrides: HashMap<Uuid, Decimal> = received
            .iter()
            .map(|r| (r.line_id, r.quantity_received))
            .collect();
        for line_id in overrides.keys() {
            if !lines.iter().any(|l| l.id == *line_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Line {} does not belong to transfer {}",
                    line_id, transfer_id
                )));
            }
        }

        let txn = self
            .db_pool
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut fully_received = true;
        for line in &lines {
            let quantity = *overrides.get(&line.id).unwrap_or(&line.quantity_sent);
            if quantity < Decimal::ZERO || quantity > line.quantity_sent {
                let _ = txn.rollback().await;
                return Err(ServiceError::ValidationError(format!(
                    "Received quantity for line {} must be between 0 and {}",
                    line.id, line.quantity_sent
                )));
            }
            if quantity < line.quantity_sent {
                fully_received = false;
            }

            if quantity > Decimal::ZERO {
                movement_registrar::register_in_txn(
                    &txn,
                    &NewMovement {
                        warehouse_id: transfer.destination_warehouse_id,
                        product_id: line.product_id,
                        movement_type: MovementType::Inbound,
                        origin: MovementOrigin::Transfer,
                        quantity,
                        counterparty_id: Some(transfer.source_warehouse_id),
                        reference: Some(transfer.code.clone()),
                        created_by: Some(transfer.created_by),
                        new_cost_price: None,
                        new_sale_price: None,
                    },
                )
                .await?;
            }

            let mut line_active: transfer_line::ActiveModel = line.clone().into();
            line_active.quantity_received = Set(Some(quantity));
            line_active.update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        let final_status = if fully_received {
            TransferStatus::Completed
        } else {
            TransferStatus::Partial
        };

        let claimed = Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(final_status.as_str()),
            )
            .col_expr(transfer::Column::ReceivedAt, Expr::value(Some(Utc::now())))
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::Id.eq(transfer_id))
            .filter(transfer::Column::Status.eq(TransferStatus::InTransit.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            let _ = txn.rollback().await;
            return Err(self.lost_transition(transfer_id, "receive").await?);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            transfer_id = %transfer_id,
            status = final_status.as_str(),
            "Transfer received"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::TransferReceived {
                transfer_id,
                completed: fully_received,
            })
            .await
        {
            warn!(transfer_id = %transfer_id, error = %e, "Failed to publish transfer event");
        }

        self.get(transfer_id).await
    }

    /// Cancels a live transfer. A pending transfer just flips state; an
    /// in-transit one gets compensating inbound movements at the source so the
    /// deducted stock reappears where it left.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        transfer_id: Uuid,
        reason: Option<String>,
    ) -> Result<TransferWithLines, ServiceError> {
        let (transfer, lines) = self.fetch_with_lines(transfer_id).await?;

        let status = parse_status(&transfer)?;
        let was_in_transit = match status {
            TransferStatus::Pending => false,
            TransferStatus::InTransit => true,
            _ => {
                return Err(ServiceError::InvalidTransition {
                    from: status.as_str().to_string(),
                    action: "cancel".to_string(),
                })
            }
        };

        let txn = self
            .db_pool
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        if was_in_transit {
            for line in &lines {
                movement_registrar::register_in_txn(
                    &txn,
                    &NewMovement {
                        warehouse_id: transfer.source_warehouse_id,
                        product_id: line.product_id,
                        movement_type: MovementType::Inbound,
                        origin: MovementOrigin::TransferReversal,
                        quantity: line.quantity_sent,
                        counterparty_id: Some(transfer.destination_warehouse_id),
                        reference: Some(transfer.code.clone()),
                        created_by: Some(transfer.created_by),
                        new_cost_price: None,
                        new_sale_price: None,
                    },
                )
                .await?;
            }
        }

        // CAS on the status observed above, so a racing send or receive
        // invalidates this cancel instead of both applying.
        let claimed = Transfer::update_many()
            .col_expr(
                transfer::Column::Status,
                Expr::value(TransferStatus::Cancelled.as_str()),
            )
            .col_expr(transfer::Column::CancelledAt, Expr::value(Some(Utc::now())))
            .col_expr(transfer::Column::CancelledReason, Expr::value(reason))
            .col_expr(transfer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(transfer::Column::Id.eq(transfer_id))
            .filter(transfer::Column::Status.eq(status.as_str()))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if claimed.rows_affected == 0 {
            let _ = txn.rollback().await;
            return Err(self.lost_transition(transfer_id, "cancel").await?);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        TRANSFERS_CANCELLED.inc();
        info!(transfer_id = %transfer_id, was_in_transit, "Transfer cancelled");
        if let Err(e) = self
            .event_sender
            .send(Event::TransferCancelled {
                transfer_id,
                was_in_transit,
            })
            .await
        {
            warn!(transfer_id = %transfer_id, error = %e, "Failed to publish transfer event");
        }

        self.get(transfer_id).await
    }

    /// Fetches a transfer and its lines.
    #[instrument(skip(self))]
    pub async fn get(&self, transfer_id: Uuid) -> Result<TransferWithLines, ServiceError> {
        let (transfer, lines) = self.fetch_with_lines(transfer_id).await?;
        Ok(TransferWithLines { transfer, lines })
    }

    /// Paginated transfer listing, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: TransferFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<transfer::Model>, u64), ServiceError> {
        let mut query = Transfer::find();

        if let Some(company_id) = filter.company_id {
            query = query.filter(transfer::Column::CompanyId.eq(company_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(
                transfer::Column::SourceWarehouseId
                    .eq(warehouse_id)
                    .or(transfer::Column::DestinationWarehouseId.eq(warehouse_id)),
            );
        }
        if let Some(status) = filter.status {
            query = query.filter(transfer::Column::Status.eq(status.as_str()));
        }

        let paginator = query
            .order_by(transfer::Column::CreatedAt, Order::Desc)
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

    /// Per-status transfer counts, optionally scoped to one company.
    #[instrument(skip(self))]
    pub async fn statistics(
        &self,
        company_id: Option<Uuid>,
    ) -> Result<TransferStatistics, ServiceError> {
        let count = |status: TransferStatus| {
            let mut query = Transfer::find();
            if let Some(company_id) = company_id {
                query = query.filter(transfer::Column::CompanyId.eq(company_id));
            }
            query
                .filter(transfer::Column::Status.eq(status.as_str()))
                .count(self.db_pool.as_ref())
        };

        let pending = count(TransferStatus::Pending)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let in_transit = count(TransferStatus::InTransit)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let completed = count(TransferStatus::Completed)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let partial = count(TransferStatus::Partial)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let cancelled = count(TransferStatus::Cancelled)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(TransferStatistics {
            total: pending + in_transit + completed + partial + cancelled,
            pending,
            in_transit,
            completed,
            partial,
            cancelled,
        })
    }

    async fn fetch_with_lines(
        &self,
        transfer_id: Uuid,
    ) -> Result<(transfer::Model, Vec<transfer_line::Model>), ServiceError> {
        let transfer = Transfer::find_by_id(transfer_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Transfer {} not found", transfer_id))
            })?;

        let lines = TransferLine::find()
            .filter(transfer_line::Column::TransferId.eq(transfer_id))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((transfer, lines))
    }

    fn require_status(
        &self,
        transfer: &transfer::Model,
        expected: TransferStatus,
        action: &str,
    ) -> Result<(), ServiceError> {
        let status = parse_status(transfer)?;
        if status != expected {
            return Err(ServiceError::InvalidTransition {
                from: status.as_str().to_string(),
                action: action.to_string(),
            });
        }
        Ok(())
    }

    /// Builds the `InvalidTransition` returned when a status CAS found zero
    /// rows, naming the state a concurrent caller moved the transfer into.
    async fn lost_transition(
        &self,
        transfer_id: Uuid,
        action: &str,
    ) -> Result<ServiceError, ServiceError> {
        let (transfer, _) = self.fetch_with_lines(transfer_id).await?;
        let status = parse_status(&transfer)?;
        Ok(ServiceError::InvalidTransition {
            from: status.as_str().to_string(),
            action: action.to_string(),
        })
    }

    async fn check_endpoint(
        &self,
        warehouse_id: Uuid,
        company_id: Uuid,
        role: &str,
    ) -> Result<warehouse::Model, ServiceError> {
        let wh = Warehouse::find_by_id(warehouse_id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Warehouse {} not found", warehouse_id))
            })?;

        if wh.company_id != company_id {
            return Err(ServiceError::InvalidTransferRoute(format!(
                "{} warehouse {} belongs to a different company",
                role, wh.code
            )));
        }
        if !wh.is_active {
            return Err(ServiceError::InvalidTransferRoute(format!(
                "{} warehouse {} is inactive",
                role, wh.code
            )));
        }

        Ok(wh)
    }

    async fn availability_shortfalls<C: ConnectionTrait>(
        &self,
        conn: &C,
        warehouse_id: Uuid,
        lines: &[NewTransferLine],
    ) -> Result<Vec<StockShortfall>, ServiceError> {
        let mut shortfalls = Vec::new();
        for line in lines {
            let available =
                stock_ledger::current_quantity_on(conn, warehouse_id, line.product_id).await?;
            if available < line.quantity {
                shortfalls.push(StockShortfall {
                    product_id: line.product_id,
                    available,
                    requested: line.quantity,
                });
            }
        }
        Ok(shortfalls)
    }
}

fn parse_status(transfer: &transfer::Model) -> Result<TransferStatus, ServiceError> {
    TransferStatus::from_str(&transfer.status).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Transfer {} has unknown status '{}'",
            transfer.id, transfer.status
        ))
    })
}

/// Human-facing transfer code, unique with the same odds as a UUID prefix.
fn generate_code() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("TR-{}", &id[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_have_fixed_shape() {
        let code = generate_code();
        assert!(code.starts_with("TR-"));
        assert_eq!(code.len(), 11);
        assert!(code[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn terminal_states_reject_cancel() {
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Partial.is_terminal());
        assert!(TransferStatus::Cancelled.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::InTransit.is_terminal());
    }
}
