use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One component line of a composite (kit) product. A composite must never
/// reference itself as a component, directly or transitively.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "composite_components")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub composite_id: Uuid,
    pub component_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub quantity_required: Decimal,
    pub is_mandatory: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::CompositeId",
        to = "super::product::Column::Id"
    )]
    Composite,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ComponentId",
        to = "super::product::Column::Id"
    )]
    Component,
}

impl ActiveModelBehavior for ActiveModel {}
