//! In-memory content store
//!
//! Mirrors the constraints the PostgreSQL schema enforces (unique slugs,
//! one localization per locale, known relation ids) and counts writes so
//! tests can assert on side effects.

use super::{
    ArticleChanges, ArticleFilter, ArticleQuery, ArticleRelations, ArticleSort, ArticleView,
    ContentStore, LocalizationUpdate, NewArticle, NewTerm, Page, TaxonomyKind, Term, TermQuery,
    TermRef,
};
use crate::db::models::{Article, Localization};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DbErr;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    articles: Vec<Article>,
    localizations: Vec<Localization>,
    terms: Vec<Term>,
    /// (article, kind, term) links for therapy and disease areas
    links: Vec<(Uuid, TaxonomyKind, Uuid)>,
}

impl State {
    fn term(&self, id: Uuid) -> Option<&Term> {
        self.terms.iter().find(|t| t.id == id)
    }

    fn term_by_slug(&self, kind: TaxonomyKind, slug: &str) -> Option<&Term> {
        self.terms.iter().find(|t| t.kind == kind && t.slug == slug)
    }

    fn require_terms(&self, kind: TaxonomyKind, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            match self.term(*id) {
                Some(term) if term.kind == kind => {}
                _ => {
                    return Err(AppError::NotFound {
                        resource_type: kind.label().to_string(),
                        id: id.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn linked(&self, article_id: Uuid, kind: TaxonomyKind) -> Vec<TermRef> {
        self.links
            .iter()
            .filter(|(a, k, _)| *a == article_id && *k == kind)
            .filter_map(|(_, _, t)| self.term(*t).map(Term::to_ref))
            .collect()
    }

    fn set_links(&mut self, article_id: Uuid, kind: TaxonomyKind, ids: &[Uuid]) {
        self.links.retain(|(a, k, _)| !(*a == article_id && *k == kind));
        for id in ids {
            if !self.links.contains(&(article_id, kind, *id)) {
                self.links.push((article_id, kind, *id));
            }
        }
    }

    fn view(&self, article: &Article, with_localizations: bool) -> ArticleView {
        let localizations = if with_localizations {
            self.localizations
                .iter()
                .filter(|l| l.article_id == article.id)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        ArticleView {
            article: article.clone(),
            relations: ArticleRelations {
                category: article
                    .category_id
                    .and_then(|id| self.term(id))
                    .map(Term::to_ref),
                therapy_areas: self.linked(article.id, TaxonomyKind::TherapyArea),
                disease_areas: self.linked(article.id, TaxonomyKind::DiseaseArea),
                localizations,
            },
        }
    }

    fn matches(&self, article: &Article, filter: &ArticleFilter) -> bool {
        let has_link = |kind: TaxonomyKind, slug: &str| {
            self.linked(article.id, kind).iter().any(|t| t.slug == slug)
        };
        match filter {
            ArticleFilter::Slug(slug) => article.slug == *slug,
            ArticleFilter::TherapyArea(slug) => has_link(TaxonomyKind::TherapyArea, slug),
            ArticleFilter::DiseaseArea(slug) => has_link(TaxonomyKind::DiseaseArea, slug),
            ArticleFilter::Category(slug) => article
                .category_id
                .and_then(|id| self.term(id))
                .is_some_and(|c| c.slug == *slug),
            ArticleFilter::HasDiseaseArea => !self.linked(article.id, TaxonomyKind::DiseaseArea).is_empty(),
        }
    }
}

/// Content store held entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    localization_writes: AtomicU64,
    term_writes: AtomicU64,
    unavailable: AtomicBool,
    /// 1-based localization rewrite that fails within an update; 0 never fails
    failing_rewrite: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of localization entries rewritten by article updates
    pub fn localization_writes(&self) -> u64 {
        self.localization_writes.load(AtomicOrdering::SeqCst)
    }

    /// Number of terms created
    pub fn term_writes(&self) -> u64 {
        self.term_writes.load(AtomicOrdering::SeqCst)
    }

    /// Make every operation fail as if the database were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Make the `nth` localization rewrite of each update fail, as a
    /// database error in the middle of a transaction would; 0 disables
    pub fn fail_localization_rewrite(&self, nth: u64) {
        self.failing_rewrite.store(nth, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            Err(AppError::ServiceUnavailable {
                message: "content store unreachable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn paginate<T>(items: Vec<T>, start: u64, limit: u64) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(start as usize)
        .take(limit as usize)
        .collect();
    Page { items, total }
}

fn compare_articles(a: &Article, b: &Article, sort: ArticleSort) -> Ordering {
    match sort {
        ArticleSort::Title => a.title.cmp(&b.title),
        ArticleSort::CreatedAt => a.created_at.cmp(&b.created_at),
        ArticleSort::PublishedAt => match (a.published_at, b.published_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        },
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn find_term_by_slug(&self, kind: TaxonomyKind, slug: &str) -> Result<Option<Term>> {
        self.check_available()?;
        Ok(self.state.read().await.term_by_slug(kind, slug).cloned())
    }

    async fn create_term(&self, kind: TaxonomyKind, term: NewTerm) -> Result<Term> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if state.term_by_slug(kind, &term.slug).is_some() {
            return Err(AppError::DuplicateSlug { slug: term.slug });
        }

        let parent = match (kind, term.parent_id) {
            (TaxonomyKind::DiseaseArea, Some(parent_id)) => {
                state.require_terms(TaxonomyKind::TherapyArea, &[parent_id])?;
                state.term(parent_id).map(Term::to_ref)
            }
            (TaxonomyKind::DiseaseArea, None) => {
                return Err(AppError::MissingField {
                    field: "therapy_area".to_string(),
                })
            }
            _ => None,
        };

        let created = Term {
            id: Uuid::new_v4(),
            kind,
            name: term.name,
            slug: term.slug,
            parent,
            created_at: Utc::now(),
        };
        state.terms.push(created.clone());
        self.term_writes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(created)
    }

    async fn list_terms(&self, query: &TermQuery) -> Result<Page<Term>> {
        self.check_available()?;
        let state = self.state.read().await;

        let mut terms: Vec<Term> = state
            .terms
            .iter()
            .filter(|t| t.kind == query.kind)
            .filter(|t| query.slug.as_ref().map_or(true, |s| t.slug == *s))
            .filter(|t| match &query.therapy_area_slug {
                Some(slug) => t.parent.as_ref().is_some_and(|p| p.slug == *slug),
                None => true,
            })
            .cloned()
            .collect();

        terms.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        if query.descending {
            terms.reverse();
        }

        Ok(paginate(terms, query.start, query.limit))
    }

    async fn article_slug_exists(&self, slug: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.state.read().await.articles.iter().any(|a| a.slug == slug))
    }

    async fn create_article(&self, article: NewArticle) -> Result<ArticleView> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if state.articles.iter().any(|a| a.slug == article.slug) {
            return Err(AppError::DuplicateSlug { slug: article.slug });
        }
        if let Some(category_id) = article.category_id {
            state.require_terms(TaxonomyKind::Category, &[category_id])?;
        }
        state.require_terms(TaxonomyKind::TherapyArea, &article.therapy_area_ids)?;
        state.require_terms(TaxonomyKind::DiseaseArea, &article.disease_area_ids)?;

        for (i, loc) in article.localizations.iter().enumerate() {
            if article.localizations[..i].iter().any(|l| l.locale == loc.locale) {
                return Err(AppError::Duplicate {
                    message: format!("localization {} given twice", loc.locale),
                });
            }
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        let record = Article {
            id,
            title: article.title,
            slug: article.slug,
            summary: article.summary,
            content: article.content,
            hero_image_url: article.hero_image_url,
            locale: article.locale.unwrap_or_else(|| crate::SOURCE_LOCALE.to_string()),
            category_id: article.category_id,
            published_at: article.published_at.map(Into::into),
            created_at: now.into(),
            updated_at: now.into(),
        };

        for loc in article.localizations {
            state.localizations.push(Localization {
                id: Uuid::new_v4(),
                article_id: id,
                locale: loc.locale,
                summary: loc.summary,
                content: loc.content,
                created_at: now.into(),
                updated_at: now.into(),
            });
        }
        state.set_links(id, TaxonomyKind::TherapyArea, &article.therapy_area_ids);
        state.set_links(id, TaxonomyKind::DiseaseArea, &article.disease_area_ids);
        state.articles.push(record.clone());

        Ok(state.view(&record, true))
    }

    async fn find_article(&self, id: Uuid) -> Result<Option<ArticleView>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .articles
            .iter()
            .find(|a| a.id == id)
            .map(|a| state.view(a, true)))
    }

    async fn list_articles(&self, query: &ArticleQuery) -> Result<Page<ArticleView>> {
        self.check_available()?;
        let state = self.state.read().await;

        let mut articles: Vec<&Article> = state
            .articles
            .iter()
            .filter(|a| query.locale.as_ref().map_or(true, |l| a.locale == *l))
            .filter(|a| query.filters.iter().all(|f| state.matches(a, f)))
            .collect();

        articles.sort_by(|a, b| {
            let ord = compare_articles(a, b, query.sort);
            let ord = if query.descending { ord.reverse() } else { ord };
            ord.then_with(|| b.created_at.cmp(&a.created_at))
        });
        if query.sort == ArticleSort::PublishedAt {
            // drafts last in either direction
            articles.sort_by_key(|a| a.published_at.is_none());
        }

        let views = articles
            .into_iter()
            .map(|a| state.view(a, query.with_localizations))
            .collect();
        Ok(paginate(views, query.start, query.limit))
    }

    async fn update_article(
        &self,
        id: Uuid,
        changes: ArticleChanges,
        localizations: Vec<LocalizationUpdate>,
    ) -> Result<ArticleView> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if let Some(category_id) = changes.category_id {
            state.require_terms(TaxonomyKind::Category, &[category_id])?;
        }
        if let Some(ids) = &changes.therapy_area_ids {
            state.require_terms(TaxonomyKind::TherapyArea, ids)?;
        }
        if let Some(ids) = &changes.disease_area_ids {
            state.require_terms(TaxonomyKind::DiseaseArea, ids)?;
        }

        let position = state
            .articles
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

        // Stage every rewrite before touching state so a failure leaves the
        // article and its localizations as they were
        let failing = self.failing_rewrite.load(AtomicOrdering::SeqCst);
        let mut staged = Vec::with_capacity(localizations.len());
        for (n, update) in localizations.into_iter().enumerate() {
            let index = state
                .localizations
                .iter()
                .position(|l| l.id == update.id && l.article_id == id)
                .ok_or_else(|| AppError::NotFound {
                    resource_type: "localization".to_string(),
                    id: update.id.to_string(),
                })?;
            if n as u64 + 1 == failing {
                return Err(AppError::Database(DbErr::Custom(format!(
                    "localization {} write failed",
                    update.locale
                ))));
            }
            staged.push((index, update));
        }

        let now = Utc::now();
        let article = &mut state.articles[position];

        if let Some(title) = changes.title {
            article.title = title;
        }
        if let Some(summary) = changes.summary {
            article.summary = summary;
        }
        if let Some(content) = changes.content {
            article.content = content;
        }
        if let Some(url) = changes.hero_image_url {
            article.hero_image_url = Some(url);
        }
        if let Some(locale) = changes.locale {
            article.locale = locale;
        }
        if let Some(category_id) = changes.category_id {
            article.category_id = Some(category_id);
        }
        if let Some(published_at) = changes.published_at {
            article.published_at = Some(published_at.into());
        }
        article.updated_at = now.into();
        let record = article.clone();

        let rewritten = staged.len() as u64;
        for (index, update) in staged {
            let loc = &mut state.localizations[index];
            loc.summary = update.summary;
            loc.content = update.content;
            loc.updated_at = now.into();
        }
        self.localization_writes.fetch_add(rewritten, AtomicOrdering::SeqCst);

        if let Some(ids) = changes.therapy_area_ids {
            state.set_links(id, TaxonomyKind::TherapyArea, &ids);
        }
        if let Some(ids) = changes.disease_area_ids {
            state.set_links(id, TaxonomyKind::DiseaseArea, &ids);
        }

        Ok(state.view(&record, true))
    }

    async fn delete_article(&self, id: Uuid) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let before = state.articles.len();
        state.articles.retain(|a| a.id != id);
        if state.articles.len() == before {
            return Ok(false);
        }
        state.localizations.retain(|l| l.article_id != id);
        state.links.retain(|(a, _, _)| *a != id);
        Ok(true)
    }
}
