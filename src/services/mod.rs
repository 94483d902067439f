pub mod composite_validator;
pub mod movement_registrar;
pub mod pricing;
pub mod serial_allocator;
pub mod stock_ledger;
pub mod transfer_orchestrator;

pub use composite_validator::CompositeValidator;
pub use movement_registrar::MovementRegistrar;
pub use pricing::PricingResolver;
pub use serial_allocator::SerialAllocator;
pub use stock_ledger::StockLedger;
pub use transfer_orchestrator::TransferOrchestrator;
