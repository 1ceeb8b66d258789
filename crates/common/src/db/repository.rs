//! Repository pattern for database operations
//!
//! SeaORM implementation of `ContentStore`. Relations are loaded in batches
//! (one query per relation for a whole page of articles) and article
//! creation runs in a single transaction with its localizations and links.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::store::{
    ArticleChanges, ArticleFilter, ArticleQuery, ArticleRelations, ArticleSort, ArticleView,
    ContentStore, LocalizationUpdate, NewArticle, NewTerm, Page, TaxonomyKind, Term, TermQuery,
    TermRef,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{NullOrdering, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    SqlErr, TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

fn term_ref(id: Uuid, name: &str, slug: &str) -> TermRef {
    TermRef {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
    }
}

fn to_term(
    kind: TaxonomyKind,
    id: Uuid,
    name: String,
    slug: String,
    parent: Option<TermRef>,
    created_at: DateTimeWithTimeZone,
) -> Term {
    Term {
        id,
        kind,
        name,
        slug,
        parent,
        created_at: created_at.with_timezone(&Utc),
    }
}

/// Map a unique-constraint violation onto a conflict error
fn conflict(err: DbErr, on_conflict: impl FnOnce() -> AppError) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => on_conflict(),
        _ => err.into(),
    }
}

fn order(descending: bool) -> Order {
    if descending {
        Order::Desc
    } else {
        Order::Asc
    }
}

async fn paginate<E, C>(
    select: Select<E>,
    conn: &C,
    start: u64,
    limit: u64,
) -> Result<(Vec<E::Model>, u64)>
where
    E: EntityTrait,
    E::Model: Send + Sync,
    C: ConnectionTrait,
{
    let total = select.clone().count(conn).await?;
    let items = select.offset(start).limit(limit).all(conn).await?;
    Ok((items, total))
}

/// Therapy areas by id
async fn therapy_areas_by_id<C: ConnectionTrait>(
    conn: &C,
    ids: impl IntoIterator<Item = Uuid>,
) -> Result<HashMap<Uuid, TherapyArea>> {
    let ids: HashSet<Uuid> = ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(TherapyAreaEntity::find()
        .filter(TherapyAreaColumn::Id.is_in(ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect())
}

/// Fail with not-found when any id is not a term of `kind`
async fn require_terms<C: ConnectionTrait>(conn: &C, kind: TaxonomyKind, ids: &[Uuid]) -> Result<()> {
    let wanted: HashSet<Uuid> = ids.iter().copied().collect();
    if wanted.is_empty() {
        return Ok(());
    }

    let found: HashSet<Uuid> = match kind {
        TaxonomyKind::TherapyArea => TherapyAreaEntity::find()
            .filter(TherapyAreaColumn::Id.is_in(wanted.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect(),
        TaxonomyKind::Category => CategoryEntity::find()
            .filter(CategoryColumn::Id.is_in(wanted.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect(),
        TaxonomyKind::DiseaseArea => DiseaseAreaEntity::find()
            .filter(DiseaseAreaColumn::Id.is_in(wanted.clone()))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect(),
    };

    match wanted.difference(&found).next() {
        Some(missing) => Err(AppError::NotFound {
            resource_type: kind.label().to_string(),
            id: missing.to_string(),
        }),
        None => Ok(()),
    }
}

async fn term_id_by_slug<C: ConnectionTrait>(
    conn: &C,
    kind: TaxonomyKind,
    slug: &str,
) -> Result<Option<Uuid>> {
    let id = match kind {
        TaxonomyKind::TherapyArea => TherapyAreaEntity::find()
            .filter(TherapyAreaColumn::Slug.eq(slug))
            .one(conn)
            .await?
            .map(|m| m.id),
        TaxonomyKind::Category => CategoryEntity::find()
            .filter(CategoryColumn::Slug.eq(slug))
            .one(conn)
            .await?
            .map(|m| m.id),
        TaxonomyKind::DiseaseArea => DiseaseAreaEntity::find()
            .filter(DiseaseAreaColumn::Slug.eq(slug))
            .one(conn)
            .await?
            .map(|m| m.id),
    };
    Ok(id)
}

async fn replace_links<C: ConnectionTrait>(
    conn: &C,
    kind: TaxonomyKind,
    article_id: Uuid,
    ids: &[Uuid],
) -> Result<()> {
    let ids: Vec<Uuid> = ids
        .iter()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    match kind {
        TaxonomyKind::TherapyArea => {
            ArticleTherapyAreaEntity::delete_many()
                .filter(ArticleTherapyAreaColumn::ArticleId.eq(article_id))
                .exec(conn)
                .await?;
            if !ids.is_empty() {
                ArticleTherapyAreaEntity::insert_many(ids.into_iter().map(|id| {
                    ArticleTherapyAreaActiveModel {
                        article_id: Set(article_id),
                        therapy_area_id: Set(id),
                    }
                }))
                .exec(conn)
                .await?;
            }
        }
        TaxonomyKind::DiseaseArea => {
            ArticleDiseaseAreaEntity::delete_many()
                .filter(ArticleDiseaseAreaColumn::ArticleId.eq(article_id))
                .exec(conn)
                .await?;
            if !ids.is_empty() {
                ArticleDiseaseAreaEntity::insert_many(ids.into_iter().map(|id| {
                    ArticleDiseaseAreaActiveModel {
                        article_id: Set(article_id),
                        disease_area_id: Set(id),
                    }
                }))
                .exec(conn)
                .await?;
            }
        }
        TaxonomyKind::Category => {
            return Err(AppError::Internal {
                message: "categories are not linked through a join table".to_string(),
            })
        }
    }
    Ok(())
}

/// Attach relations to a batch of articles
async fn load_views<C: ConnectionTrait>(
    conn: &C,
    articles: Vec<Article>,
    with_localizations: bool,
) -> Result<Vec<ArticleView>> {
    if articles.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = articles.iter().map(|a| a.id).collect();

    let category_ids: HashSet<Uuid> = articles.iter().filter_map(|a| a.category_id).collect();
    let categories: HashMap<Uuid, Category> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        CategoryEntity::find()
            .filter(CategoryColumn::Id.is_in(category_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect()
    };

    let ta_links = ArticleTherapyAreaEntity::find()
        .filter(ArticleTherapyAreaColumn::ArticleId.is_in(ids.clone()))
        .all(conn)
        .await?;
    let therapy_areas = therapy_areas_by_id(conn, ta_links.iter().map(|l| l.therapy_area_id)).await?;

    let da_links = ArticleDiseaseAreaEntity::find()
        .filter(ArticleDiseaseAreaColumn::ArticleId.is_in(ids.clone()))
        .all(conn)
        .await?;
    let da_ids: HashSet<Uuid> = da_links.iter().map(|l| l.disease_area_id).collect();
    let disease_areas: HashMap<Uuid, DiseaseArea> = if da_ids.is_empty() {
        HashMap::new()
    } else {
        DiseaseAreaEntity::find()
            .filter(DiseaseAreaColumn::Id.is_in(da_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect()
    };

    let mut localizations: HashMap<Uuid, Vec<Localization>> = HashMap::new();
    if with_localizations {
        for loc in LocalizationEntity::find()
            .filter(LocalizationColumn::ArticleId.is_in(ids))
            .order_by_asc(LocalizationColumn::Locale)
            .all(conn)
            .await?
        {
            localizations.entry(loc.article_id).or_default().push(loc);
        }
    }

    let mut views = Vec::with_capacity(articles.len());
    for article in articles {
        let mut relations = ArticleRelations {
            category: article
                .category_id
                .and_then(|id| categories.get(&id))
                .map(|c| term_ref(c.id, &c.name, &c.slug)),
            localizations: localizations.remove(&article.id).unwrap_or_default(),
            ..Default::default()
        };
        relations.therapy_areas = ta_links
            .iter()
            .filter(|l| l.article_id == article.id)
            .filter_map(|l| therapy_areas.get(&l.therapy_area_id))
            .map(|t| term_ref(t.id, &t.name, &t.slug))
            .collect();
        relations.disease_areas = da_links
            .iter()
            .filter(|l| l.article_id == article.id)
            .filter_map(|l| disease_areas.get(&l.disease_area_id))
            .map(|d| term_ref(d.id, &d.name, &d.slug))
            .collect();
        relations.therapy_areas.sort_by(|a, b| a.name.cmp(&b.name));
        relations.disease_areas.sort_by(|a, b| a.name.cmp(&b.name));

        views.push(ArticleView { article, relations });
    }
    Ok(views)
}

async fn load_view<C: ConnectionTrait>(conn: &C, id: Uuid) -> Result<Option<ArticleView>> {
    let Some(article) = ArticleEntity::find_by_id(id).one(conn).await? else {
        return Ok(None);
    };
    Ok(load_views(conn, vec![article], true).await?.pop())
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    async fn disease_area_terms(&self, models: Vec<DiseaseArea>) -> Result<Vec<Term>> {
        let parents =
            therapy_areas_by_id(self.conn(), models.iter().map(|m| m.therapy_area_id)).await?;
        Ok(models
            .into_iter()
            .map(|m| {
                let parent = parents
                    .get(&m.therapy_area_id)
                    .map(|p| term_ref(p.id, &p.name, &p.slug));
                to_term(TaxonomyKind::DiseaseArea, m.id, m.name, m.slug, parent, m.created_at)
            })
            .collect())
    }
}

#[async_trait]
impl ContentStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn find_term_by_slug(&self, kind: TaxonomyKind, slug: &str) -> Result<Option<Term>> {
        let term = match kind {
            TaxonomyKind::TherapyArea => TherapyAreaEntity::find()
                .filter(TherapyAreaColumn::Slug.eq(slug))
                .one(self.conn())
                .await?
                .map(|m| to_term(kind, m.id, m.name, m.slug, None, m.created_at)),
            TaxonomyKind::Category => CategoryEntity::find()
                .filter(CategoryColumn::Slug.eq(slug))
                .one(self.conn())
                .await?
                .map(|m| to_term(kind, m.id, m.name, m.slug, None, m.created_at)),
            TaxonomyKind::DiseaseArea => {
                let found = DiseaseAreaEntity::find()
                    .filter(DiseaseAreaColumn::Slug.eq(slug))
                    .one(self.conn())
                    .await?;
                self.disease_area_terms(found.into_iter().collect())
                    .await?
                    .pop()
            }
        };
        Ok(term)
    }

    async fn create_term(&self, kind: TaxonomyKind, term: NewTerm) -> Result<Term> {
        if term_id_by_slug(self.conn(), kind, &term.slug).await?.is_some() {
            return Err(AppError::DuplicateSlug { slug: term.slug });
        }

        let id = Uuid::new_v4();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let slug = term.slug.clone();

        let created = match kind {
            TaxonomyKind::TherapyArea => {
                let m = TherapyAreaActiveModel {
                    id: Set(id),
                    name: Set(term.name),
                    slug: Set(term.slug),
                    created_at: Set(now),
                }
                .insert(self.conn())
                .await
                .map_err(|e| conflict(e, || AppError::DuplicateSlug { slug }))?;
                to_term(kind, m.id, m.name, m.slug, None, m.created_at)
            }
            TaxonomyKind::Category => {
                let m = CategoryActiveModel {
                    id: Set(id),
                    name: Set(term.name),
                    slug: Set(term.slug),
                    created_at: Set(now),
                }
                .insert(self.conn())
                .await
                .map_err(|e| conflict(e, || AppError::DuplicateSlug { slug }))?;
                to_term(kind, m.id, m.name, m.slug, None, m.created_at)
            }
            TaxonomyKind::DiseaseArea => {
                let parent_id = term.parent_id.ok_or_else(|| AppError::MissingField {
                    field: "therapy_area".to_string(),
                })?;
                require_terms(self.conn(), TaxonomyKind::TherapyArea, &[parent_id]).await?;

                let m = DiseaseAreaActiveModel {
                    id: Set(id),
                    name: Set(term.name),
                    slug: Set(term.slug),
                    therapy_area_id: Set(parent_id),
                    created_at: Set(now),
                }
                .insert(self.conn())
                .await
                .map_err(|e| conflict(e, || AppError::DuplicateSlug { slug }))?;
                self.disease_area_terms(vec![m]).await?.remove(0)
            }
        };

        tracing::debug!(kind = %kind, slug = %created.slug, "Term created");
        Ok(created)
    }

    async fn list_terms(&self, query: &TermQuery) -> Result<Page<Term>> {
        let dir = order(query.descending);
        let kind = query.kind;

        let (items, total) = match kind {
            TaxonomyKind::TherapyArea => {
                let mut select = TherapyAreaEntity::find().order_by(TherapyAreaColumn::Name, dir);
                if let Some(slug) = &query.slug {
                    select = select.filter(TherapyAreaColumn::Slug.eq(slug.as_str()));
                }
                let (models, total) = paginate(select, self.conn(), query.start, query.limit).await?;
                let terms = models
                    .into_iter()
                    .map(|m| to_term(kind, m.id, m.name, m.slug, None, m.created_at))
                    .collect();
                (terms, total)
            }
            TaxonomyKind::Category => {
                let mut select = CategoryEntity::find().order_by(CategoryColumn::Name, dir);
                if let Some(slug) = &query.slug {
                    select = select.filter(CategoryColumn::Slug.eq(slug.as_str()));
                }
                let (models, total) = paginate(select, self.conn(), query.start, query.limit).await?;
                let terms = models
                    .into_iter()
                    .map(|m| to_term(kind, m.id, m.name, m.slug, None, m.created_at))
                    .collect();
                (terms, total)
            }
            TaxonomyKind::DiseaseArea => {
                let mut select = DiseaseAreaEntity::find().order_by(DiseaseAreaColumn::Name, dir);
                if let Some(slug) = &query.slug {
                    select = select.filter(DiseaseAreaColumn::Slug.eq(slug.as_str()));
                }
                if let Some(ta_slug) = &query.therapy_area_slug {
                    match term_id_by_slug(self.conn(), TaxonomyKind::TherapyArea, ta_slug).await? {
                        Some(parent) => {
                            select = select.filter(DiseaseAreaColumn::TherapyAreaId.eq(parent))
                        }
                        None => return Ok(Page { items: Vec::new(), total: 0 }),
                    }
                }
                let (models, total) = paginate(select, self.conn(), query.start, query.limit).await?;
                (self.disease_area_terms(models).await?, total)
            }
        };

        Ok(Page { items, total })
    }

    async fn article_slug_exists(&self, slug: &str) -> Result<bool> {
        let count = ArticleEntity::find()
            .filter(ArticleColumn::Slug.eq(slug))
            .count(self.conn())
            .await?;
        Ok(count > 0)
    }

    async fn create_article(&self, article: NewArticle) -> Result<ArticleView> {
        let txn = self.conn().begin().await?;

        if let Some(category_id) = article.category_id {
            require_terms(&txn, TaxonomyKind::Category, &[category_id]).await?;
        }
        require_terms(&txn, TaxonomyKind::TherapyArea, &article.therapy_area_ids).await?;
        require_terms(&txn, TaxonomyKind::DiseaseArea, &article.disease_area_ids).await?;

        let id = Uuid::new_v4();
        let now: DateTimeWithTimeZone = Utc::now().into();
        let slug = article.slug.clone();

        ArticleActiveModel {
            id: Set(id),
            title: Set(article.title),
            slug: Set(article.slug),
            summary: Set(article.summary),
            content: Set(article.content),
            hero_image_url: Set(article.hero_image_url),
            locale: Set(article.locale.unwrap_or_else(|| crate::SOURCE_LOCALE.to_string())),
            category_id: Set(article.category_id),
            published_at: Set(article.published_at.map(Into::into)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| conflict(e, || AppError::DuplicateSlug { slug }))?;

        for loc in article.localizations {
            let locale = loc.locale.clone();
            LocalizationActiveModel {
                id: Set(Uuid::new_v4()),
                article_id: Set(id),
                locale: Set(loc.locale),
                summary: Set(loc.summary),
                content: Set(loc.content),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                conflict(e, || AppError::Duplicate {
                    message: format!("localization {} already exists", locale),
                })
            })?;
        }

        replace_links(&txn, TaxonomyKind::TherapyArea, id, &article.therapy_area_ids).await?;
        replace_links(&txn, TaxonomyKind::DiseaseArea, id, &article.disease_area_ids).await?;

        let view = load_view(&txn, id).await?;
        txn.commit().await?;

        view.ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<ArticleView>> {
        load_view(self.conn(), id).await
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Page<ArticleView>> {
        let conn = self.conn();
        let mut select = ArticleEntity::find();

        if let Some(locale) = &query.locale {
            select = select.filter(ArticleColumn::Locale.eq(locale.as_str()));
        }

        for filter in &query.filters {
            select = match filter {
                ArticleFilter::Slug(slug) => select.filter(ArticleColumn::Slug.eq(slug.as_str())),
                ArticleFilter::Category(slug) => {
                    match term_id_by_slug(conn, TaxonomyKind::Category, slug).await? {
                        Some(id) => select.filter(ArticleColumn::CategoryId.eq(id)),
                        None => return Ok(Page { items: Vec::new(), total: 0 }),
                    }
                }
                ArticleFilter::TherapyArea(slug) => {
                    match term_id_by_slug(conn, TaxonomyKind::TherapyArea, slug).await? {
                        Some(id) => select.filter(
                            ArticleColumn::Id.in_subquery(
                                Query::select()
                                    .column(ArticleTherapyAreaColumn::ArticleId)
                                    .from(ArticleTherapyAreaEntity)
                                    .and_where(ArticleTherapyAreaColumn::TherapyAreaId.eq(id))
                                    .to_owned(),
                            ),
                        ),
                        None => return Ok(Page { items: Vec::new(), total: 0 }),
                    }
                }
                ArticleFilter::DiseaseArea(slug) => {
                    match term_id_by_slug(conn, TaxonomyKind::DiseaseArea, slug).await? {
                        Some(id) => select.filter(
                            ArticleColumn::Id.in_subquery(
                                Query::select()
                                    .column(ArticleDiseaseAreaColumn::ArticleId)
                                    .from(ArticleDiseaseAreaEntity)
                                    .and_where(ArticleDiseaseAreaColumn::DiseaseAreaId.eq(id))
                                    .to_owned(),
                            ),
                        ),
                        None => return Ok(Page { items: Vec::new(), total: 0 }),
                    }
                }
                ArticleFilter::HasDiseaseArea => select.filter(
                    ArticleColumn::Id.in_subquery(
                        Query::select()
                            .column(ArticleDiseaseAreaColumn::ArticleId)
                            .from(ArticleDiseaseAreaEntity)
                            .to_owned(),
                    ),
                ),
            };
        }

        let dir = order(query.descending);
        select = match query.sort {
            ArticleSort::PublishedAt => {
                select.order_by_with_nulls(ArticleColumn::PublishedAt, dir, NullOrdering::Last)
            }
            ArticleSort::CreatedAt => select.order_by(ArticleColumn::CreatedAt, dir),
            ArticleSort::Title => select.order_by(ArticleColumn::Title, dir),
        };
        select = select.order_by_desc(ArticleColumn::CreatedAt);

        let (articles, total) = paginate(select, conn, query.start, query.limit).await?;
        let items = load_views(conn, articles, query.with_localizations).await?;
        Ok(Page { items, total })
    }

    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
        localizations: Vec<LocalizationUpdate>,
    ) -> Result<ArticleView> {
        let txn = self.conn().begin().await?;

        let existing = ArticleEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

        if let Some(category_id) = changes.category_id {
            require_terms(&txn, TaxonomyKind::Category, &[category_id]).await?;
        }

        let mut active = existing.into_active_model();
        if let Some(title) = changes.title {
            active.title = Set(title);
        }
        if let Some(summary) = changes.summary {
            active.summary = Set(summary);
        }
        if let Some(content) = changes.content {
            active.content = Set(content);
        }
        if let Some(url) = changes.hero_image_url {
            active.hero_image_url = Set(Some(url));
        }
        if let Some(locale) = changes.locale {
            active.locale = Set(locale);
        }
        if let Some(category_id) = changes.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(published_at) = changes.published_at {
            active.published_at = Set(Some(published_at.into()));
        }
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await?;

        if let Some(ids) = &changes.therapy_area_ids {
            require_terms(&txn, TaxonomyKind::TherapyArea, ids).await?;
            replace_links(&txn, TaxonomyKind::TherapyArea, id, ids).await?;
        }
        if let Some(ids) = &changes.disease_area_ids {
            require_terms(&txn, TaxonomyKind::DiseaseArea, ids).await?;
            replace_links(&txn, TaxonomyKind::DiseaseArea, id, ids).await?;
        }

        for update in localizations {
            let existing = LocalizationEntity::find_by_id(update.id)
                .filter(LocalizationColumn::ArticleId.eq(id))
                .one(&txn)
                .await?
                .ok_or_else(|| AppError::NotFound {
                    resource_type: "localization".to_string(),
                    id: update.id.to_string(),
                })?;

            let mut active = existing.into_active_model();
            active.summary = Set(update.summary);
            active.content = Set(update.content);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
        }

        let view = load_view(&txn, id).await?;
        txn.commit().await?;
        view.ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool> {
        let result = ArticleEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }
}
