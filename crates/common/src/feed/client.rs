//! HTTP client for the content API

use super::{
    pagination_total, parent_therapy_area, parse_collection, ArticleDetail, ArticleSummary,
    RawEntry, SectionMeta,
};
use crate::config::WebConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::store::TaxonomyKind;
use futures::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Page size used for list queries
const LIST_LIMIT: &str = "100";

/// Query parameters for one request
type Params = Vec<(String, String)>;

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Relation name used to filter articles by a section
pub fn section_filter_key(kind: TaxonomyKind) -> &'static str {
    match kind {
        TaxonomyKind::TherapyArea => "therapy_areas",
        TaxonomyKind::Category => "category",
        TaxonomyKind::DiseaseArea => "disease_areas",
    }
}

/// Typed access to the content API used by the presentation layer
#[derive(Clone)]
pub struct ContentClient {
    http: reqwest::Client,
    base_url: String,
    media_origin: String,
}

impl ContentClient {
    pub fn new(config: &WebConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.content_api_url.trim_end_matches('/').to_string(),
            media_origin: config.media_origin().to_string(),
        })
    }

    pub fn media_origin(&self) -> &str {
        &self.media_origin
    }

    async fn get_json(&self, resource: &str, query: &Params) -> Result<Value> {
        let url = format!("{}/api/{}", self.base_url, resource);
        let start = Instant::now();

        let result = async {
            let response = self.http.get(&url).query(query).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::ContentApi {
                    status: status.as_u16(),
                    message: body,
                });
            }
            Ok::<_, AppError>(response.json::<Value>().await?)
        }
        .await;

        metrics::record_content_fetch(start.elapsed().as_secs_f64(), resource, result.is_ok());
        if let Err(e) = &result {
            warn!(resource = resource, error = %e, "Content API request failed");
        } else {
            debug!(resource = resource, "Content API request");
        }
        result
    }

    async fn get_entries(&self, resource: &str, query: &Params) -> Result<Vec<RawEntry>> {
        let body = self.get_json(resource, query).await?;
        Ok(parse_collection(&body))
    }

    async fn sections(&self, kind: TaxonomyKind, query: &Params) -> Result<Vec<SectionMeta>> {
        let entries = self.get_entries(kind.collection(), query).await?;
        Ok(entries.iter().map(SectionMeta::from_entry).collect())
    }

    async fn articles(&self, query: &Params) -> Result<Vec<ArticleSummary>> {
        let entries = self.get_entries("articles", query).await?;
        Ok(entries
            .iter()
            .map(|e| ArticleSummary::from_entry(e, &self.media_origin))
            .collect())
    }

    async fn all_terms(&self, kind: TaxonomyKind) -> Result<Vec<SectionMeta>> {
        let query = params(&[
            ("sort", "name:ASC"),
            ("pagination[pageSize]", LIST_LIMIT),
            ("locale", crate::SOURCE_LOCALE),
        ]);
        self.sections(kind, &query).await
    }

    pub async fn fetch_therapy_areas(&self) -> Result<Vec<SectionMeta>> {
        self.all_terms(TaxonomyKind::TherapyArea).await
    }

    pub async fn fetch_categories(&self) -> Result<Vec<SectionMeta>> {
        self.all_terms(TaxonomyKind::Category).await
    }

    pub async fn fetch_disease_areas(&self) -> Result<Vec<SectionMeta>> {
        self.all_terms(TaxonomyKind::DiseaseArea).await
    }

    pub async fn fetch_disease_areas_by_therapy_area(
        &self,
        therapy_area_slug: &str,
    ) -> Result<Vec<SectionMeta>> {
        let query = params(&[
            ("filters[therapy_areas][slug][$eq]", therapy_area_slug),
            ("sort[0]", "name:ASC"),
            ("pagination[limit]", LIST_LIMIT),
            ("populate", "*"),
        ]);
        self.sections(TaxonomyKind::DiseaseArea, &query).await
    }

    /// Name and slug of one term, `None` when no term has that slug
    pub async fn fetch_section(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Option<SectionMeta>> {
        let query = params(&[("filters[slug][$eq]", slug), ("pagination[limit]", "1")]);
        let found = self.sections(kind, &query).await?;
        Ok(found.into_iter().find(|s| s.slug == slug))
    }

    /// Newest articles filed under a section
    pub async fn fetch_articles_by_section(
        &self,
        kind: TaxonomyKind,
        slug: &str,
    ) -> Result<Vec<ArticleSummary>> {
        let filter = format!("filters[{}][slug][$eq]", section_filter_key(kind));
        let query = params(&[
            (filter.as_str(), slug),
            ("sort[0]", "publishedAt:desc"),
            ("pagination[limit]", LIST_LIMIT),
            ("populate", "*"),
        ]);
        self.articles(&query).await
    }

    /// Newest articles tagged with any disease area
    pub async fn fetch_articles_with_disease_areas(&self) -> Result<Vec<ArticleSummary>> {
        let query = params(&[
            ("filters[disease_areas][id][$notNull]", "true"),
            ("sort[0]", "publishedAt:desc"),
            ("pagination[limit]", LIST_LIMIT),
            ("populate", "*"),
        ]);
        self.articles(&query).await
    }

    pub async fn fetch_latest_articles(&self, limit: usize) -> Result<Vec<ArticleSummary>> {
        let limit = limit.to_string();
        let query = params(&[
            ("sort[0]", "publishedAt:desc"),
            ("pagination[limit]", limit.as_str()),
            ("populate", "*"),
        ]);
        self.articles(&query).await
    }

    pub async fn fetch_article_by_slug(&self, slug: &str) -> Result<Option<ArticleDetail>> {
        let query = params(&[("filters[slug][$eq]", slug), ("populate", "*")]);
        let entries = self.get_entries("articles", &query).await?;
        Ok(entries
            .iter()
            .map(|e| ArticleDetail::from_entry(e, &self.media_origin))
            .find(|a| a.slug == slug))
    }

    /// Every article with its therapy areas, for path generation
    pub async fn fetch_article_paths(&self) -> Result<Vec<ArticleDetail>> {
        let query = params(&[
            ("populate", "therapy_areas"),
            ("pagination[pageSize]", LIST_LIMIT),
        ]);
        let entries = self.get_entries("articles", &query).await?;
        Ok(entries
            .iter()
            .map(|e| ArticleDetail::from_entry(e, &self.media_origin))
            .collect())
    }

    pub async fn fetch_parent_therapy_area(
        &self,
        disease_area_slug: &str,
    ) -> Result<Option<SectionMeta>> {
        let query = params(&[
            ("filters[slug][$eq]", disease_area_slug),
            ("populate", "*"),
        ]);
        let entries = self
            .get_entries(TaxonomyKind::DiseaseArea.collection(), &query)
            .await?;
        Ok(entries.iter().find_map(parent_therapy_area))
    }

    /// Article count per disease area of a therapy area
    ///
    /// A disease area whose count cannot be fetched counts as zero.
    pub async fn article_counts_by_disease_area(
        &self,
        therapy_area_slug: &str,
    ) -> Result<BTreeMap<String, u64>> {
        let disease_areas = self
            .fetch_disease_areas_by_therapy_area(therapy_area_slug)
            .await?;

        let fetches = disease_areas
            .into_iter()
            .filter(|a| !a.slug.is_empty())
            .map(|area| async move {
                let query = params(&[
                    ("filters[disease_areas][slug][$eq]", area.slug.as_str()),
                    ("pagination[limit]", "1"),
                ]);
                let count = match self.get_json("articles", &query).await {
                    Ok(body) => pagination_total(&body)
                        .unwrap_or_else(|| parse_collection(&body).len() as u64),
                    Err(_) => 0,
                };
                (area.slug, count)
            });

        let counts: BTreeMap<String, u64> = join_all(fetches).await.into_iter().collect();
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> ContentClient {
        let config = WebConfig {
            content_api_url: base.to_string(),
            public_base_url: Some("https://media.example.com".to_string()),
            ..Default::default()
        };
        ContentClient::new(&config).unwrap()
    }

    async fn articles(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        if q.get("filters[therapy_areas][slug][$eq]").map(String::as_str) == Some("oncology") {
            assert_eq!(q.get("sort[0]").map(String::as_str), Some("publishedAt:desc"));
            return Json(json!({"data": [
                {"id": 1, "attributes": {
                    "slug": "a", "title": "A",
                    "heroImage": {"data": {"attributes": {"url": "/uploads/a.png"}}}
                }},
                {"id": 2, "slug": "b", "Title": "B"},
                42
            ]}));
        }
        if let Some(slug) = q.get("filters[disease_areas][slug][$eq]") {
            let total = if slug == "melanoma" { 3 } else { 0 };
            return Json(json!({"data": [], "meta": {"pagination": {"total": total}}}));
        }
        if q.get("filters[slug][$eq]").map(String::as_str) == Some("gene-editing") {
            return Json(json!({"data": [{"id": 9, "slug": "gene-editing", "title": "Gene editing",
                "therapy_areas": [{"name": "Oncology", "slug": "oncology"}]}]}));
        }
        Json(json!({"data": []}))
    }

    async fn disease_areas(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        if q.contains_key("filters[therapy_areas][slug][$eq]") {
            return Json(json!({"data": [
                {"name": "Melanoma", "slug": "melanoma"},
                {"name": "Lymphoma", "slug": "lymphoma"}
            ]}));
        }
        if q.get("filters[slug][$eq]").map(String::as_str) == Some("melanoma") {
            return Json(json!({"data": [{"name": "Melanoma", "slug": "melanoma",
                "therapy_area": {"data": {"id": 1, "attributes": {"name": "Oncology", "slug": "oncology"}}}}]}));
        }
        Json(json!({"data": []}))
    }

    fn stub() -> Router {
        Router::new()
            .route("/api/articles", get(articles))
            .route("/api/disease-areas", get(disease_areas))
            .route(
                "/api/therapy-areas",
                get(|| async {
                    Json(json!({"data": [{"id": 1, "attributes": {"name": "Oncology", "slug": "oncology"}}]}))
                }),
            )
            .route(
                "/api/categories",
                get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
    }

    #[tokio::test]
    async fn test_articles_by_section_normalized() {
        let base = spawn(stub()).await;
        let c = client(&base);

        let list = c
            .fetch_articles_by_section(TaxonomyKind::TherapyArea, "oncology")
            .await
            .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].image_url, "https://media.example.com/uploads/a.png");
        assert_eq!(list[1].title, "B");
    }

    #[tokio::test]
    async fn test_taxonomy_lists() {
        let base = spawn(stub()).await;
        let c = client(&base);

        let tas = c.fetch_therapy_areas().await.unwrap();
        assert_eq!(tas[0].slug, "oncology");

        let err = c.fetch_categories().await.unwrap_err();
        assert!(matches!(err, AppError::ContentApi { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_counts_and_parent() {
        let base = spawn(stub()).await;
        let c = client(&base);

        let counts = c.article_counts_by_disease_area("oncology").await.unwrap();
        assert_eq!(counts.get("melanoma"), Some(&3));
        assert_eq!(counts.get("lymphoma"), Some(&0));

        let parent = c.fetch_parent_therapy_area("melanoma").await.unwrap();
        assert_eq!(parent.unwrap().slug, "oncology");
        assert!(c.fetch_parent_therapy_area("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_article_by_slug() {
        let base = spawn(stub()).await;
        let c = client(&base);

        let article = c.fetch_article_by_slug("gene-editing").await.unwrap().unwrap();
        assert!(article.has_therapy_area("oncology"));
        assert!(c.fetch_article_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let c = client("http://127.0.0.1:1");
        assert!(c.fetch_therapy_areas().await.is_err());
    }
}
