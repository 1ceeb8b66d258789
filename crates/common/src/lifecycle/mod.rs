//! Article translation lifecycle
//!
//! Source-locale articles carry one localization entry per target locale.
//! `ArticleLifecycle` computes those entries before a write reaches the
//! store; `ArticleService` wires the hook between the REST API and the
//! store so every create and update goes through it.

use crate::config::TranslationConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::slug;
use crate::store::{
    unique_article_slug, ArticleChanges, ArticleView, ContentStore, LocalizationUpdate, NewArticle,
    NewLocalization,
};
use crate::translation::{
    translate_blocks, translate_text, FailurePolicy, LocaleOutcome, Translator,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Localization writes planned for an article update
#[derive(Debug, Clone, Default)]
pub struct UpdatePlan {
    pub updates: Vec<LocalizationUpdate>,
    pub outcomes: Vec<LocaleOutcome>,
}

/// Translation hook run before article writes
pub struct ArticleLifecycle {
    translator: Arc<dyn Translator>,
    source_locale: String,
    target_locales: Vec<String>,
    policy: FailurePolicy,
}

impl ArticleLifecycle {
    pub fn new(
        translator: Arc<dyn Translator>,
        source_locale: impl Into<String>,
        target_locales: Vec<String>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            translator,
            source_locale: source_locale.into(),
            target_locales,
            policy,
        }
    }

    pub fn from_config(translator: Arc<dyn Translator>, config: &TranslationConfig) -> Self {
        Self::new(
            translator,
            config.source_locale.clone(),
            config.target_locales.clone(),
            config.failure_policy,
        )
    }

    pub fn source_locale(&self) -> &str {
        &self.source_locale
    }

    fn targets(&self) -> impl Iterator<Item = &String> {
        self.target_locales
            .iter()
            .filter(move |l| **l != self.source_locale)
    }

    fn is_target(&self, locale: &str) -> bool {
        self.targets().any(|l| l == locale)
    }

    /// Attach translated localizations to a new source-locale article
    pub async fn before_create(&self, article: &mut NewArticle) -> Result<Vec<LocaleOutcome>> {
        let locale = article
            .locale
            .get_or_insert_with(|| self.source_locale.clone())
            .clone();
        if locale != self.source_locale {
            debug!(locale = %locale, slug = %article.slug, "Non-source article, skipping translation");
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(self.target_locales.len());
        let mut entries = Vec::with_capacity(self.target_locales.len());

        for target in self.targets() {
            let start = Instant::now();
            let result = async {
                let summary =
                    translate_text(self.translator.as_ref(), &article.summary, &locale, target)
                        .await?;
                let content =
                    translate_blocks(self.translator.as_ref(), &article.content, &locale, target)
                        .await?;
                Ok::<_, AppError>((summary, content))
            }
            .await;

            metrics::record_translation(
                start.elapsed().as_secs_f64(),
                self.translator.provider_name(),
                target,
                result.is_ok(),
            );

            match result {
                Ok((summary, content)) => {
                    entries.push(NewLocalization {
                        locale: target.clone(),
                        summary,
                        content,
                    });
                    outcomes.push(LocaleOutcome::translated(target));
                }
                Err(e) => {
                    warn!(locale = %target, slug = %article.slug, error = %e, "Translation failed");
                    outcomes.push(LocaleOutcome::failed(target, &e));
                }
            }
        }

        self.policy.enforce(&outcomes)?;
        article.localizations.extend(entries);
        Ok(outcomes)
    }

    /// Plan localization updates for changed source fields
    ///
    /// Only existing entries are touched; unchanged fields keep the entry's
    /// current value.
    pub async fn before_update(
        &self,
        current: &ArticleView,
        changes: &ArticleChanges,
    ) -> Result<UpdatePlan> {
        let locale = changes
            .locale
            .as_deref()
            .unwrap_or(&current.article.locale);
        if locale != self.source_locale {
            return Ok(UpdatePlan::default());
        }

        let new_summary = changes
            .summary
            .as_ref()
            .filter(|s| **s != current.article.summary);
        let new_content = changes
            .content
            .as_ref()
            .filter(|c| **c != current.article.content);
        if new_summary.is_none() && new_content.is_none() {
            debug!(article_id = %current.article.id, "Translatable fields unchanged");
            return Ok(UpdatePlan::default());
        }

        let mut plan = UpdatePlan::default();
        for loc in current
            .relations
            .localizations
            .iter()
            .filter(|l| self.is_target(&l.locale))
        {
            let start = Instant::now();
            let result = async {
                let summary = match new_summary {
                    Some(s) => translate_text(self.translator.as_ref(), s, locale, &loc.locale).await?,
                    None => loc.summary.clone(),
                };
                let content = match new_content {
                    Some(c) => {
                        translate_blocks(self.translator.as_ref(), c, locale, &loc.locale).await?
                    }
                    None => loc.content.clone(),
                };
                Ok::<_, AppError>((summary, content))
            }
            .await;

            metrics::record_translation(
                start.elapsed().as_secs_f64(),
                self.translator.provider_name(),
                &loc.locale,
                result.is_ok(),
            );

            match result {
                Ok((summary, content)) => {
                    plan.updates.push(LocalizationUpdate {
                        id: loc.id,
                        locale: loc.locale.clone(),
                        summary,
                        content,
                    });
                    plan.outcomes.push(LocaleOutcome::translated(&loc.locale));
                }
                Err(e) => {
                    warn!(
                        article_id = %current.article.id,
                        locale = %loc.locale,
                        error = %e,
                        "Translation failed, localization left stale"
                    );
                    plan.outcomes.push(LocaleOutcome::failed(&loc.locale, &e));
                }
            }
        }

        self.policy.enforce(&plan.outcomes)?;
        Ok(plan)
    }
}

/// Article writes routed through the translation lifecycle
pub struct ArticleService {
    store: Arc<dyn ContentStore>,
    lifecycle: ArticleLifecycle,
}

impl ArticleService {
    pub fn new(store: Arc<dyn ContentStore>, lifecycle: ArticleLifecycle) -> Self {
        Self { store, lifecycle }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Create an article; the slug comes from the input or the title
    pub async fn create(&self, mut input: NewArticle) -> Result<ArticleView> {
        let base = if input.slug.trim().is_empty() {
            slug::slugify(&input.title)
        } else {
            slug::slugify(&input.slug)
        };
        input.slug = unique_article_slug(self.store.as_ref(), &base).await?;

        let outcomes = self.lifecycle.before_create(&mut input).await?;
        let view = self.store.create_article(input).await?;

        metrics::record_article_write("create");
        info!(
            article_id = %view.article.id,
            slug = %view.article.slug,
            localizations = view.relations.localizations.len(),
            failed = outcomes.iter().filter(|o| o.is_failed()).count(),
            "Article created"
        );
        Ok(view)
    }

    pub async fn update(&self, id: Uuid, changes: ArticleChanges) -> Result<ArticleView> {
        let current = self
            .store
            .find_article(id)
            .await?
            .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

        let plan = self.lifecycle.before_update(&current, &changes).await?;
        let rewritten = plan.updates.len();
        let view = self.store.update_article(id, changes, plan.updates).await?;

        metrics::record_article_write("update");
        info!(
            article_id = %id,
            localizations_updated = rewritten,
            "Article updated"
        );
        Ok(view)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_article(id).await? {
            return Err(AppError::ArticleNotFound { id: id.to_string() });
        }
        metrics::record_article_write("delete");
        info!(article_id = %id, "Article deleted");
        Ok(())
    }
}
