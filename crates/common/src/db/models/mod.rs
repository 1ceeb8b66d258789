//! SeaORM entity models
//!
//! Database entities for the content store

mod article;
mod article_localization;
mod therapy_area;
mod category;
mod disease_area;
mod article_therapy_area;
mod article_disease_area;

pub use article::{
    Entity as ArticleEntity,
    Model as Article,
    ActiveModel as ArticleActiveModel,
    Column as ArticleColumn,
};

pub use article_localization::{
    Entity as LocalizationEntity,
    Model as Localization,
    ActiveModel as LocalizationActiveModel,
    Column as LocalizationColumn,
};

pub use therapy_area::{
    Entity as TherapyAreaEntity,
    Model as TherapyArea,
    ActiveModel as TherapyAreaActiveModel,
    Column as TherapyAreaColumn,
};

pub use category::{
    Entity as CategoryEntity,
    Model as Category,
    ActiveModel as CategoryActiveModel,
    Column as CategoryColumn,
};

pub use disease_area::{
    Entity as DiseaseAreaEntity,
    Model as DiseaseArea,
    ActiveModel as DiseaseAreaActiveModel,
    Column as DiseaseAreaColumn,
};

pub use article_therapy_area::{
    Entity as ArticleTherapyAreaEntity,
    ActiveModel as ArticleTherapyAreaActiveModel,
    Column as ArticleTherapyAreaColumn,
};

pub use article_disease_area::{
    Entity as ArticleDiseaseAreaEntity,
    ActiveModel as ArticleDiseaseAreaActiveModel,
    Column as ArticleDiseaseAreaColumn,
};
