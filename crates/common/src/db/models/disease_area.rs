//! Disease area entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "disease_areas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    /// Parent therapy area
    pub therapy_area_id: Uuid,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::therapy_area::Entity",
        from = "Column::TherapyAreaId",
        to = "super::therapy_area::Column::Id",
        on_delete = "Restrict"
    )]
    TherapyArea,
}

impl Related<super::therapy_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TherapyArea.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
