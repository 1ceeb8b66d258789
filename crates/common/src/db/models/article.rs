//! Article entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "articles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", unique)]
    pub slug: String,

    #[sea_orm(column_type = "Text")]
    pub summary: String,

    /// Rich-text block sequence
    #[sea_orm(column_type = "JsonBinary")]
    pub content: Json,

    #[sea_orm(column_type = "Text", nullable)]
    pub hero_image_url: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub locale: String,

    pub category_id: Option<Uuid>,

    pub published_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id",
        on_delete = "SetNull"
    )]
    Category,

    #[sea_orm(has_many = "super::article_localization::Entity")]
    Localizations,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::article_localization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Localizations.def()
    }
}

impl Related<super::therapy_area::Entity> for Entity {
    fn to() -> RelationDef {
        super::article_therapy_area::Relation::TherapyArea.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::article_therapy_area::Relation::Article.def().rev())
    }
}

impl Related<super::disease_area::Entity> for Entity {
    fn to() -> RelationDef {
        super::article_disease_area::Relation::DiseaseArea.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::article_disease_area::Relation::Article.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
