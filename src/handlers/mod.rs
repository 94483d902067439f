pub mod composites;
pub mod movements;
pub mod pricing;
pub mod serials;
pub mod stock;
pub mod transfers;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CompositeValidator, MovementRegistrar, PricingResolver, SerialAllocator, StockLedger,
    TransferOrchestrator,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub stock_ledger: Arc<StockLedger>,
    pub movement_registrar: Arc<MovementRegistrar>,
    pub pricing: Arc<PricingResolver>,
    pub serial_allocator: Arc<SerialAllocator>,
    pub composite_validator: Arc<CompositeValidator>,
    pub transfers: Arc<TransferOrchestrator>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            stock_ledger: Arc::new(StockLedger::new(db_pool.clone(), event_sender.clone())),
            movement_registrar: Arc::new(MovementRegistrar::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            pricing: Arc::new(PricingResolver::new(db_pool.clone())),
            serial_allocator: Arc::new(SerialAllocator::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            composite_validator: Arc::new(CompositeValidator::new(db_pool.clone())),
            transfers: Arc::new(TransferOrchestrator::new(db_pool, event_sender)),
        }
    }
}
