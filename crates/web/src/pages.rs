//! Page data assembly
//!
//! Each loader gathers everything one page needs from the content API and
//! returns it as a serializable record. Unknown sections, slugs and
//! articles become `PageNotFound`.

use lsfeed_common::config::WebConfig;
use lsfeed_common::errors::{AppError, Result};
use lsfeed_common::feed::{ArticleDetail, ArticleSummary, ContentClient, SectionMeta};
use lsfeed_common::store::TaxonomyKind;
use serde::Serialize;
use tracing::warn;

/// Article card with the image to display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleCard {
    #[serde(flatten)]
    pub summary: ArticleSummary,
    pub display_image: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub therapy_areas: Vec<SectionMeta>,
    pub categories: Vec<SectionMeta>,
    pub headlines: Vec<ArticleCard>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseAreaCount {
    #[serde(flatten)]
    pub area: SectionMeta,
    pub article_count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPage {
    pub section: TaxonomyKind,
    pub meta: SectionMeta,
    pub articles: Vec<ArticleCard>,
    pub latest_news: Vec<ArticleCard>,
    /// Therapy-area pages only; `None` when the area has none
    pub disease_areas: Option<Vec<DiseaseAreaCount>>,
    /// Disease-area pages only
    pub parent_therapy_area: Option<SectionMeta>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    pub therapy_area: String,
    pub article: ArticleDetail,
    pub display_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionPath {
    pub section: TaxonomyKind,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePath {
    pub therapy_area: String,
    pub slug: String,
}

/// Every page that can be generated ahead of time
#[derive(Debug, Clone, Serialize)]
pub struct StaticPaths {
    pub sections: Vec<SectionPath>,
    pub articles: Vec<ArticlePath>,
}

fn not_found(path: String) -> AppError {
    AppError::PageNotFound { path }
}

fn has_slug(meta: &SectionMeta) -> bool {
    !meta.slug.trim().is_empty()
}

pub struct PageLoader {
    client: ContentClient,
    placeholder: String,
    section_articles: usize,
    latest_news: usize,
    headlines: usize,
}

impl PageLoader {
    pub fn new(config: &WebConfig) -> Result<Self> {
        Ok(Self {
            client: ContentClient::new(config)?,
            placeholder: config.placeholder_image.clone(),
            section_articles: config.section_articles,
            latest_news: config.latest_news,
            headlines: config.headlines,
        })
    }

    fn cards(&self, articles: Vec<ArticleSummary>, limit: usize) -> Vec<ArticleCard> {
        articles
            .into_iter()
            .take(limit)
            .map(|summary| ArticleCard {
                display_image: summary.display_image(&self.placeholder).to_string(),
                summary,
            })
            .collect()
    }

    pub async fn load_home(&self) -> Result<HomePage> {
        let (therapy_areas, categories, headlines) = tokio::try_join!(
            self.client.fetch_therapy_areas(),
            self.client.fetch_categories(),
            self.client.fetch_latest_articles(self.headlines),
        )?;

        Ok(HomePage {
            therapy_areas,
            categories,
            headlines: self.cards(headlines, self.headlines),
        })
    }

    /// Landing page for `/{section}/{slug}`
    pub async fn load_section_page(&self, section: &str, slug: &str) -> Result<SectionPage> {
        let path = format!("/{}/{}", section, slug);
        let kind: TaxonomyKind = section.parse().map_err(|_| not_found(path.clone()))?;

        let meta = self
            .client
            .fetch_section(kind, slug)
            .await?
            .ok_or_else(|| not_found(path))?;

        let (articles, latest_news) = tokio::try_join!(
            self.client.fetch_articles_by_section(kind, slug),
            self.client.fetch_articles_with_disease_areas(),
        )?;

        let disease_areas = match kind {
            TaxonomyKind::TherapyArea => self.disease_area_counts(slug).await?,
            _ => None,
        };

        let parent_therapy_area = match kind {
            TaxonomyKind::DiseaseArea => self
                .client
                .fetch_parent_therapy_area(slug)
                .await
                .unwrap_or_else(|e| {
                    warn!(slug = slug, error = %e, "Parent therapy area unavailable");
                    None
                }),
            _ => None,
        };

        Ok(SectionPage {
            section: kind,
            meta,
            articles: self.cards(articles, self.section_articles),
            latest_news: self.cards(latest_news, self.latest_news),
            disease_areas,
            parent_therapy_area,
        })
    }

    /// Disease areas of a therapy area; counts that cannot be fetched are zero
    async fn disease_area_counts(&self, therapy_area: &str) -> Result<Option<Vec<DiseaseAreaCount>>> {
        let areas = self
            .client
            .fetch_disease_areas_by_therapy_area(therapy_area)
            .await?;
        if areas.is_empty() {
            return Ok(None);
        }

        let counts = self
            .client
            .article_counts_by_disease_area(therapy_area)
            .await
            .unwrap_or_else(|e| {
                warn!(therapy_area = therapy_area, error = %e, "Disease area counts unavailable");
                Default::default()
            });

        Ok(Some(
            areas
                .into_iter()
                .map(|area| DiseaseAreaCount {
                    article_count: counts.get(&area.slug).copied().unwrap_or(0),
                    area,
                })
                .collect(),
        ))
    }

    /// Detail page for `/therapy-area/{therapy_area}/{slug}`
    pub async fn load_article_page(&self, therapy_area: &str, slug: &str) -> Result<ArticlePage> {
        let path = format!("/therapy-area/{}/{}", therapy_area, slug);

        let article = self
            .client
            .fetch_article_by_slug(slug)
            .await?
            .filter(|a| a.has_therapy_area(therapy_area))
            .ok_or_else(|| not_found(path))?;

        let display_image = if article.image_url.is_empty() {
            self.placeholder.clone()
        } else {
            article.image_url.clone()
        };

        Ok(ArticlePage {
            therapy_area: therapy_area.to_string(),
            article,
            display_image,
        })
    }

    pub async fn static_paths(&self) -> Result<StaticPaths> {
        let (therapy_areas, categories, disease_areas, articles) = tokio::try_join!(
            self.client.fetch_therapy_areas(),
            self.client.fetch_categories(),
            self.client.fetch_disease_areas(),
            self.client.fetch_article_paths(),
        )?;

        let sections = [
            (TaxonomyKind::TherapyArea, therapy_areas),
            (TaxonomyKind::Category, categories),
            (TaxonomyKind::DiseaseArea, disease_areas),
        ]
        .into_iter()
        .flat_map(|(section, terms)| {
            terms
                .into_iter()
                .filter(has_slug)
                .map(move |t| SectionPath { section, slug: t.slug })
        })
        .collect();

        let articles = articles
            .into_iter()
            .filter(|a| !a.slug.trim().is_empty())
            .flat_map(|a| {
                a.therapy_areas
                    .iter()
                    .filter(|t| has_slug(t))
                    .map(|t| ArticlePath {
                        therapy_area: t.slug.clone(),
                        slug: a.slug.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(StaticPaths { sections, articles })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    type Params = Query<HashMap<String, String>>;

    fn q<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
        params.get(key).map(String::as_str)
    }

    async fn therapy_areas() -> Json<Value> {
        Json(json!({"data": [
            {"id": 1, "attributes": {"name": "Oncology", "slug": "oncology"}},
            {"id": 2, "attributes": {"name": "Unnamed", "slug": ""}}
        ]}))
    }

    async fn categories(Query(p): Params) -> Json<Value> {
        if let Some(slug) = q(&p, "filters[slug][$eq]") {
            if slug != "news" {
                return Json(json!({"data": []}));
            }
        }
        Json(json!({"data": [{"id": 1, "name": "News", "slug": "news"}]}))
    }

    async fn disease_areas(Query(p): Params) -> Json<Value> {
        if q(&p, "filters[therapy_areas][slug][$eq]") == Some("oncology") {
            return Json(json!({"data": [
                {"name": "Melanoma", "slug": "melanoma"},
                {"name": "Lymphoma", "slug": "lymphoma"}
            ]}));
        }
        if q(&p, "filters[slug][$eq]") == Some("melanoma") {
            return Json(json!({"data": [{"name": "Melanoma", "slug": "melanoma",
                "therapy_area": {"id": 1, "name": "Oncology", "slug": "oncology"}}]}));
        }
        if p.contains_key("filters[slug][$eq]") {
            return Json(json!({"data": []}));
        }
        Json(json!({"data": [
            {"name": "Melanoma", "slug": "melanoma"},
            {"name": "Lymphoma", "slug": "lymphoma"}
        ]}))
    }

    fn article(n: usize, image: bool) -> Value {
        let mut entry = json!({
            "id": n,
            "slug": format!("article-{}", n),
            "title": format!("Article {}", n),
            "summary": "Summary",
            "publishedAt": "2025-03-01T00:00:00.000Z",
            "therapy_areas": [{"name": "Oncology", "slug": "oncology"}],
            "disease_areas": [{"name": "Melanoma", "slug": "melanoma"}]
        });
        if image {
            entry["heroImage"] = json!({"url": "/uploads/a.png"});
        }
        entry
    }

    async fn articles(Query(p): Params) -> axum::response::Response {
        if let Some(slug) = q(&p, "filters[disease_areas][slug][$eq]") {
            if slug == "lymphoma" {
                return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
            }
            return Json(json!({"data": [], "meta": {"pagination": {"total": 4}}})).into_response();
        }
        if q(&p, "filters[slug][$eq]") == Some("article-1") {
            return Json(json!({"data": [article(1, true)]})).into_response();
        }
        if p.contains_key("filters[slug][$eq]") {
            return Json(json!({"data": []})).into_response();
        }
        if q(&p, "populate") == Some("therapy_areas") {
            return Json(json!({"data": [
                article(1, true),
                {"id": 99, "slug": "", "therapy_areas": [{"name": "Oncology", "slug": "oncology"}]},
                {"id": 98, "slug": "untagged"}
            ]}))
            .into_response();
        }
        let list: Vec<Value> = (1..=30).map(|n| article(n, n % 2 == 1)).collect();
        Json(json!({"data": list})).into_response()
    }

    pub fn stub() -> Router {
        Router::new()
            .route("/api/therapy-areas", get(therapy_areas))
            .route("/api/categories", get(categories))
            .route("/api/disease-areas", get(disease_areas))
            .route("/api/articles", get(articles))
    }

    pub async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}
