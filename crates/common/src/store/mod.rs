//! Content store abstraction
//!
//! The seeder, the article lifecycle and the REST handlers all talk to a
//! `ContentStore`. Two implementations exist:
//! - `db::Repository` backed by PostgreSQL through SeaORM
//! - `MemoryStore` for tests and local runs without a database

mod memory;

pub use memory::MemoryStore;

use crate::db::models::{Article, Localization};
use crate::errors::{AppError, Result};
use crate::slug;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The three taxonomies articles are filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxonomyKind {
    TherapyArea,
    Category,
    DiseaseArea,
}

impl TaxonomyKind {
    pub const ALL: [TaxonomyKind; 3] = [
        TaxonomyKind::TherapyArea,
        TaxonomyKind::Category,
        TaxonomyKind::DiseaseArea,
    ];

    /// Human label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyKind::TherapyArea => "Therapy area",
            TaxonomyKind::Category => "Category",
            TaxonomyKind::DiseaseArea => "Disease area",
        }
    }

    /// Collection path under `/api`
    pub fn collection(&self) -> &'static str {
        match self {
            TaxonomyKind::TherapyArea => "therapy-areas",
            TaxonomyKind::Category => "categories",
            TaxonomyKind::DiseaseArea => "disease-areas",
        }
    }
}

impl fmt::Display for TaxonomyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaxonomyKind::TherapyArea => "therapy-area",
            TaxonomyKind::Category => "category",
            TaxonomyKind::DiseaseArea => "disease-area",
        };
        f.write_str(s)
    }
}

impl FromStr for TaxonomyKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "therapy-area" => Ok(TaxonomyKind::TherapyArea),
            "category" => Ok(TaxonomyKind::Category),
            "disease-area" => Ok(TaxonomyKind::DiseaseArea),
            other => Err(AppError::NotFound {
                resource_type: "section".to_string(),
                id: other.to_string(),
            }),
        }
    }
}

/// Minimal reference to a term, as embedded in article relations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// A therapy area, category or disease area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: Uuid,
    pub kind: TaxonomyKind,
    pub name: String,
    pub slug: String,
    /// Parent therapy area (disease areas only)
    pub parent: Option<TermRef>,
    pub created_at: DateTime<Utc>,
}

impl Term {
    pub fn to_ref(&self) -> TermRef {
        TermRef {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewTerm {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Uuid>,
}

impl NewTerm {
    /// Term whose slug is derived from its name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let slug = slug::slugify(&name);
        Self {
            name,
            slug,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Related records loaded alongside an article
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleRelations {
    pub category: Option<TermRef>,
    pub therapy_areas: Vec<TermRef>,
    pub disease_areas: Vec<TermRef>,
    pub localizations: Vec<Localization>,
}

/// An article with its relations
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleView {
    pub article: Article,
    pub relations: ArticleRelations,
}

impl ArticleView {
    pub fn localization(&self, locale: &str) -> Option<&Localization> {
        self.relations
            .localizations
            .iter()
            .find(|l| l.locale == locale)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLocalization {
    pub locale: String,
    pub summary: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct NewArticle {
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: serde_json::Value,
    pub hero_image_url: Option<String>,
    /// `None` is stored as the source locale
    pub locale: Option<String>,
    pub category_id: Option<Uuid>,
    pub therapy_area_ids: Vec<Uuid>,
    pub disease_area_ids: Vec<Uuid>,
    pub published_at: Option<DateTime<Utc>>,
    pub localizations: Vec<NewLocalization>,
}

/// Partial article update; `None` leaves the field untouched
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<serde_json::Value>,
    pub hero_image_url: Option<String>,
    pub locale: Option<String>,
    pub category_id: Option<Uuid>,
    pub therapy_area_ids: Option<Vec<Uuid>>,
    pub disease_area_ids: Option<Vec<Uuid>>,
    pub published_at: Option<DateTime<Utc>>,
}

/// New values for an existing localization entry of the updated article
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationUpdate {
    pub id: Uuid,
    pub locale: String,
    pub summary: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleFilter {
    Slug(String),
    TherapyArea(String),
    Category(String),
    DiseaseArea(String),
    /// Tagged with at least one disease area
    HasDiseaseArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleSort {
    PublishedAt,
    CreatedAt,
    Title,
}

#[derive(Debug, Clone)]
pub struct ArticleQuery {
    pub filters: Vec<ArticleFilter>,
    pub locale: Option<String>,
    pub sort: ArticleSort,
    pub descending: bool,
    pub start: u64,
    pub limit: u64,
    pub with_localizations: bool,
}

impl Default for ArticleQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            locale: None,
            sort: ArticleSort::PublishedAt,
            descending: true,
            start: 0,
            limit: 25,
            with_localizations: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TermQuery {
    pub kind: TaxonomyKind,
    pub slug: Option<String>,
    /// Disease areas under this therapy area
    pub therapy_area_slug: Option<String>,
    pub descending: bool,
    pub start: u64,
    pub limit: u64,
}

impl TermQuery {
    pub fn new(kind: TaxonomyKind) -> Self {
        Self {
            kind,
            slug: None,
            therapy_area_slug: None,
            descending: false,
            start: 0,
            limit: 100,
        }
    }
}

/// A page of results and the unpaginated total
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Storage operations required by the content rules and the REST API
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Check the backing store is reachable
    async fn ping(&self) -> Result<()>;

    async fn find_term_by_slug(&self, kind: TaxonomyKind, slug: &str) -> Result<Option<Term>>;

    async fn create_term(&self, kind: TaxonomyKind, term: NewTerm) -> Result<Term>;

    /// Terms sorted by name
    async fn list_terms(&self, query: &TermQuery) -> Result<Page<Term>>;

    async fn article_slug_exists(&self, slug: &str) -> Result<bool>;

    /// Persist an article together with its localization entries
    async fn create_article(&self, article: NewArticle) -> Result<ArticleView>;

    /// Article with all relations, localizations included
    async fn find_article(&self, id: Uuid) -> Result<Option<ArticleView>>;

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Page<ArticleView>>;

    /// Apply `changes` and overwrite the listed localization entries as one
    /// unit; on error nothing is written
    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
        localizations: Vec<LocalizationUpdate>,
    ) -> Result<ArticleView>;

    async fn delete_article(&self, id: Uuid) -> Result<bool>;
}

/// First free article slug derived from `base`
pub async fn unique_article_slug(store: &dyn ContentStore, base: &str) -> Result<String> {
    let base = if base.is_empty() { "article" } else { base };
    let mut attempt = 0;
    loop {
        let candidate = slug::with_suffix(base, attempt);
        if !store.article_slug_exists(&candidate).await? {
            return Ok(candidate);
        }
        attempt += 1;
    }
}
