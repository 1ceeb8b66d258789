//! Content API query parameters
//!
//! Strapi-compatible subset:
//! - `filters[<relation>][slug][$eq]`, `filters[slug][$eq]`,
//!   `filters[disease_areas][id][$notNull]`
//! - `sort` / `sort[0]` as `field[:asc|:desc]`
//! - `pagination[start|limit]` or `pagination[page|pageSize]`
//! - `populate=*`, `populate=a,b` or `populate[0]=a`
//! - `locale`

use lsfeed_common::config::ContentConfig;
use lsfeed_common::errors::{AppError, Result};
use lsfeed_common::store::{ArticleFilter, ArticleQuery, ArticleSort, TaxonomyKind, TermQuery};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub type Params = HashMap<String, String>;

/// Largest offset the database accepts (PostgreSQL `OFFSET` is a bigint)
const MAX_OFFSET: u64 = i64::MAX as u64;

fn invalid(param: &str, message: impl Into<String>) -> AppError {
    AppError::InvalidQuery {
        param: param.to_string(),
        message: message.into(),
    }
}

/// Requested window into a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Offset { start: u64, limit: u64 },
    Numbered { page: u64, page_size: u64 },
}

impl PageRequest {
    pub fn start(&self) -> u64 {
        match *self {
            PageRequest::Offset { start, .. } => start,
            PageRequest::Numbered { page, page_size } => {
                page.saturating_sub(1).saturating_mul(page_size)
            }
        }
    }

    pub fn limit(&self) -> u64 {
        match *self {
            PageRequest::Offset { limit, .. } => limit,
            PageRequest::Numbered { page_size, .. } => page_size,
        }
    }

    /// `meta.pagination` for a response
    pub fn meta(&self, total: u64) -> Value {
        match *self {
            PageRequest::Offset { start, limit } => json!({
                "start": start,
                "limit": limit,
                "total": total,
            }),
            PageRequest::Numbered { page, page_size } => json!({
                "page": page,
                "pageSize": page_size,
                "pageCount": total.div_ceil(page_size),
                "total": total,
            }),
        }
    }
}

fn parse_number(params: &Params, key: &str) -> Result<Option<u64>> {
    params
        .get(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| invalid(key, "expected a non-negative integer"))
        })
        .transpose()
}

pub fn parse_pagination(params: &Params, config: &ContentConfig) -> Result<PageRequest> {
    let clamp = |n: u64| n.clamp(1, config.max_page_size);

    let page = parse_number(params, "pagination[page]")?;
    let page_size = parse_number(params, "pagination[pageSize]")?;
    let start = parse_number(params, "pagination[start]")?;
    let limit = parse_number(params, "pagination[limit]")?;

    if (page.is_some() || page_size.is_some()) && (start.is_some() || limit.is_some()) {
        return Err(invalid(
            "pagination",
            "page-based and offset-based pagination cannot be mixed",
        ));
    }

    if start.is_some() || limit.is_some() {
        let start = start.unwrap_or(0);
        if start > MAX_OFFSET {
            return Err(invalid("pagination[start]", "start is out of range"));
        }
        return Ok(PageRequest::Offset {
            start,
            limit: clamp(limit.unwrap_or(config.default_page_size)),
        });
    }

    let page = page.unwrap_or(1).max(1);
    let page_size = clamp(page_size.unwrap_or(config.default_page_size));
    match (page - 1).checked_mul(page_size) {
        Some(offset) if offset <= MAX_OFFSET => Ok(PageRequest::Numbered { page, page_size }),
        _ => Err(invalid("pagination[page]", "page is out of range")),
    }
}

/// `(field, descending)` from `sort` or `sort[0]`
pub fn parse_sort(params: &Params) -> Result<Option<(String, bool)>> {
    let Some((key, raw)) = ["sort", "sort[0]"]
        .iter()
        .find_map(|k| params.get(*k).map(|v| (*k, v)))
    else {
        return Ok(None);
    };

    // only the first of a comma list is honored
    let first = raw.split(',').next().unwrap_or_default().trim();
    let (field, dir) = match first.split_once(':') {
        Some((f, d)) => (f, d),
        None => (first, "asc"),
    };
    let descending = match dir.to_ascii_lowercase().as_str() {
        "asc" => false,
        "desc" => true,
        other => return Err(invalid(key, format!("unknown sort direction {}", other))),
    };
    if field.is_empty() {
        return Err(invalid(key, "missing sort field"));
    }
    Ok(Some((field.to_string(), descending)))
}

/// Relations requested through `populate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Populate {
    All,
    Only(HashSet<String>),
}

impl Populate {
    pub fn includes(&self, relation: &str) -> bool {
        match self {
            Populate::All => true,
            Populate::Only(set) => set.contains(relation),
        }
    }
}

pub fn parse_populate(params: &Params) -> Populate {
    let mut names = HashSet::new();
    for (key, value) in params {
        if key == "populate" || (key.starts_with("populate[") && key.ends_with(']')) {
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "*" {
                    return Populate::All;
                }
                names.insert(canonical_relation(name).to_string());
            }
        }
    }
    Populate::Only(names)
}

/// Accept both snake and camel relation names
fn canonical_relation(name: &str) -> &str {
    match name {
        "therapyAreas" => "therapy_areas",
        "diseaseAreas" => "disease_areas",
        "therapyArea" => "therapy_area",
        "hero_image" => "heroImage",
        other => other,
    }
}

/// `["therapy_areas", "slug", "$eq"]` from `filters[therapy_areas][slug][$eq]`
fn filter_path(key: &str) -> Option<Vec<&str>> {
    let rest = key.strip_prefix("filters")?;
    let mut parts = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        let inner = remaining.strip_prefix('[')?;
        let end = inner.find(']')?;
        parts.push(&inner[..end]);
        remaining = &inner[end + 1..];
    }
    Some(parts)
}

fn filters<'a>(params: &'a Params) -> impl Iterator<Item = (&'a str, Vec<&'a str>, &'a str)> {
    params.iter().filter_map(|(k, v)| {
        filter_path(k).map(|path| (k.as_str(), path, v.as_str()))
    })
}

fn parse_locale(params: &Params) -> Option<String> {
    params
        .get("locale")
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && *l != "all")
        .map(str::to_string)
}

fn truthy(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(key, "expected true or false")),
    }
}

/// Store query, page window and populate set for `GET /api/articles`
pub fn article_query(
    params: &Params,
    config: &ContentConfig,
) -> Result<(ArticleQuery, PageRequest, Populate)> {
    let page = parse_pagination(params, config)?;
    let populate = parse_populate(params);

    let mut query = ArticleQuery {
        locale: parse_locale(params),
        start: page.start(),
        limit: page.limit(),
        with_localizations: populate.includes("localizations"),
        ..Default::default()
    };

    for (key, path, value) in filters(params) {
        let filter = match path.as_slice() {
            ["slug", "$eq"] => ArticleFilter::Slug(value.to_string()),
            [rel, "slug", "$eq"] => match canonical_relation(rel) {
                "therapy_areas" => ArticleFilter::TherapyArea(value.to_string()),
                "category" => ArticleFilter::Category(value.to_string()),
                "disease_areas" => ArticleFilter::DiseaseArea(value.to_string()),
                other => return Err(invalid(key, format!("unknown relation {}", other))),
            },
            [rel, "id", "$notNull"] if canonical_relation(rel) == "disease_areas" => {
                if !truthy(key, value)? {
                    continue;
                }
                ArticleFilter::HasDiseaseArea
            }
            _ => return Err(invalid(key, "unsupported filter")),
        };
        query.filters.push(filter);
    }

    if let Some((field, descending)) = parse_sort(params)? {
        query.sort = match field.as_str() {
            "publishedAt" | "published_at" => ArticleSort::PublishedAt,
            "createdAt" | "created_at" => ArticleSort::CreatedAt,
            "title" | "Title" => ArticleSort::Title,
            other => return Err(invalid("sort", format!("cannot sort articles by {}", other))),
        };
        query.descending = descending;
    }

    Ok((query, page, populate))
}

/// Store query, page window and populate set for a taxonomy collection
pub fn term_query(
    kind: TaxonomyKind,
    params: &Params,
    config: &ContentConfig,
) -> Result<(TermQuery, PageRequest, Populate)> {
    let page = parse_pagination(params, config)?;
    let populate = parse_populate(params);

    let mut query = TermQuery::new(kind);
    query.start = page.start();
    query.limit = page.limit();

    for (key, path, value) in filters(params) {
        match path.as_slice() {
            ["slug", "$eq"] => query.slug = Some(value.to_string()),
            [rel, "slug", "$eq"]
                if kind == TaxonomyKind::DiseaseArea
                    && matches!(canonical_relation(rel), "therapy_area" | "therapy_areas") =>
            {
                query.therapy_area_slug = Some(value.to_string())
            }
            _ => return Err(invalid(key, "unsupported filter")),
        }
    }

    if let Some((field, descending)) = parse_sort(params)? {
        if field != "name" {
            return Err(invalid("sort", format!("cannot sort by {}", field)));
        }
        query.descending = descending;
    }

    Ok((query, page, populate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config() -> ContentConfig {
        ContentConfig::default()
    }

    #[test]
    fn test_section_query_from_frontend() {
        let p = params(&[
            ("filters[therapy_areas][slug][$eq]", "oncology"),
            ("sort[0]", "publishedAt:desc"),
            ("pagination[limit]", "100"),
            ("populate", "*"),
        ]);
        let (query, page, populate) = article_query(&p, &config()).unwrap();

        assert_eq!(query.filters, vec![ArticleFilter::TherapyArea("oncology".into())]);
        assert_eq!(query.sort, ArticleSort::PublishedAt);
        assert!(query.descending);
        assert_eq!(page, PageRequest::Offset { start: 0, limit: 100 });
        assert_eq!(populate, Populate::All);
        assert!(query.with_localizations);
    }

    #[test]
    fn test_not_null_and_slug_filters() {
        let p = params(&[
            ("filters[disease_areas][id][$notNull]", "true"),
            ("filters[slug][$eq]", "gene-editing"),
        ]);
        let (query, _, _) = article_query(&p, &config()).unwrap();
        assert!(query.filters.contains(&ArticleFilter::HasDiseaseArea));
        assert!(query.filters.contains(&ArticleFilter::Slug("gene-editing".into())));

        let p = params(&[("filters[disease_areas][id][$notNull]", "false")]);
        assert!(article_query(&p, &config()).unwrap().0.filters.is_empty());
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let p = params(&[("filters[author][slug][$eq]", "x")]);
        assert!(matches!(
            article_query(&p, &config()),
            Err(AppError::InvalidQuery { .. })
        ));

        let p = params(&[("filters[title][$contains]", "x")]);
        assert!(article_query(&p, &config()).is_err());
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!(
            parse_sort(&params(&[("sort", "name:ASC")])).unwrap(),
            Some(("name".into(), false))
        );
        assert_eq!(
            parse_sort(&params(&[("sort", "title")])).unwrap(),
            Some(("title".into(), false))
        );
        assert!(parse_sort(&params(&[("sort", "name:sideways")])).is_err());
        assert_eq!(parse_sort(&params(&[])).unwrap(), None);
    }

    #[test]
    fn test_pagination() {
        let c = config();
        assert_eq!(
            parse_pagination(&params(&[]), &c).unwrap(),
            PageRequest::Numbered { page: 1, page_size: c.default_page_size }
        );

        let p = parse_pagination(&params(&[("pagination[page]", "3"), ("pagination[pageSize]", "10")]), &c)
            .unwrap();
        assert_eq!(p.start(), 20);
        assert_eq!(p.meta(21)["pageCount"], 3);

        let p = parse_pagination(&params(&[("pagination[limit]", "5000")]), &c).unwrap();
        assert_eq!(p.limit(), c.max_page_size);

        assert!(parse_pagination(&params(&[("pagination[limit]", "-1")]), &c).is_err());

        let max = u64::MAX.to_string();
        let err = parse_pagination(&params(&[("pagination[page]", max.as_str())]), &c).unwrap_err();
        assert!(matches!(err, AppError::InvalidQuery { .. }));
        assert!(parse_pagination(&params(&[("pagination[start]", max.as_str())]), &c).is_err());
        assert!(article_query(&params(&[("pagination[page]", max.as_str()), ("pagination[pageSize]", "100")]), &c).is_err());
        assert!(parse_pagination(
            &params(&[("pagination[limit]", "5"), ("pagination[page]", "2")]),
            &c
        )
        .is_err());
    }

    #[test]
    fn test_populate() {
        let p = parse_populate(&params(&[("populate", "heroImage,therapyAreas")]));
        assert!(p.includes("heroImage"));
        assert!(p.includes("therapy_areas"));
        assert!(!p.includes("category"));

        let p = parse_populate(&params(&[("populate[0]", "category")]));
        assert!(p.includes("category"));
    }

    #[test]
    fn test_term_query() {
        let p = params(&[
            ("filters[therapy_areas][slug][$eq]", "oncology"),
            ("sort[0]", "name:ASC"),
            ("pagination[limit]", "100"),
        ]);
        let (q, _, _) = term_query(TaxonomyKind::DiseaseArea, &p, &config()).unwrap();
        assert_eq!(q.therapy_area_slug.as_deref(), Some("oncology"));
        assert!(!q.descending);

        // parent filter only exists on disease areas
        assert!(term_query(TaxonomyKind::Category, &p, &config()).is_err());

        let p = params(&[("sort", "slug:desc")]);
        assert!(term_query(TaxonomyKind::TherapyArea, &p, &config()).is_err());
    }

    #[test]
    fn test_locale() {
        let (q, _, _) = article_query(&params(&[("locale", "en")]), &config()).unwrap();
        assert_eq!(q.locale.as_deref(), Some("en"));
        let (q, _, _) = article_query(&params(&[("locale", "all")]), &config()).unwrap();
        assert_eq!(q.locale, None);
    }
}
