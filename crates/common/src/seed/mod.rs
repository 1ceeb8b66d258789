//! Therapy-area bootstrap
//!
//! Reconciles the configured therapy areas with the store at startup. Each
//! name is keyed by its slug; existing records are left as they are.

use crate::errors::Result;
use crate::metrics;
use crate::slug::slugify;
use crate::store::{ContentStore, NewTerm, TaxonomyKind};
use std::collections::HashSet;
use tracing::{debug, info};

/// What a seeding run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Slugs created in this run
    pub created: Vec<String>,
    /// Slugs that were already present
    pub existing: Vec<String>,
}

/// Create every therapy area in `names` that does not exist yet
///
/// Names mapping to the same slug yield one record. Any store failure
/// aborts the run.
pub async fn seed_therapy_areas(store: &dyn ContentStore, names: &[String]) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    let mut seen = HashSet::new();

    for name in names {
        let slug = slugify(name);
        if slug.is_empty() || !seen.insert(slug.clone()) {
            continue;
        }

        if store
            .find_term_by_slug(TaxonomyKind::TherapyArea, &slug)
            .await?
            .is_some()
        {
            debug!(slug = %slug, "Therapy area already present");
            report.existing.push(slug);
            continue;
        }

        let term = NewTerm {
            name: name.clone(),
            slug: slug.clone(),
            parent_id: None,
        };
        store.create_term(TaxonomyKind::TherapyArea, term).await?;
        info!(slug = %slug, name = %name, "Seeded therapy area");
        report.created.push(slug);
    }

    metrics::record_seed(report.created.len(), report.existing.len());
    Ok(report)
}
