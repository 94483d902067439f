pub mod composite_component;
pub mod price_tier;
pub mod product;
pub mod serial_unit;
pub mod stock_movement;
pub mod stock_record;
pub mod transfer;
pub mod transfer_line;
pub mod warehouse;

pub use composite_component::Entity as CompositeComponent;
pub use price_tier::Entity as PriceTier;
pub use product::Entity as Product;
pub use serial_unit::Entity as SerialUnit;
pub use stock_movement::Entity as StockMovement;
pub use stock_record::Entity as StockRecord;
pub use transfer::Entity as Transfer;
pub use transfer_line::Entity as TransferLine;
pub use warehouse::Entity as Warehouse;
