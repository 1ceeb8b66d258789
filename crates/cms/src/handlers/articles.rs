//! Article handlers
//!
//! Writes go through `ArticleService`, so English articles are translated
//! into the target locales before anything is stored.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::DataBody;
use crate::envelope::{collection, single};
use crate::query::{article_query, parse_populate, Params, Populate};
use crate::AppState;
use lsfeed_common::{
    auth::AdminAuth,
    errors::{AppError, Result},
    store::{ArticleChanges, NewArticle},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ArticleInput {
    #[validate(length(min = 1, max = 500))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 200))]
    pub slug: Option<String>,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub summary: String,

    /// Rich-text blocks
    #[serde(default)]
    pub content: Value,

    #[serde(default, alias = "heroImage", alias = "heroImageUrl")]
    pub hero_image_url: Option<String>,

    #[serde(default)]
    #[validate(length(min = 2, max = 16))]
    pub locale: Option<String>,

    #[serde(default)]
    pub category: Option<Uuid>,

    #[serde(default, alias = "therapyAreas")]
    pub therapy_areas: Vec<Uuid>,

    #[serde(default, alias = "diseaseAreas")]
    pub disease_areas: Vec<Uuid>,

    #[serde(default, alias = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ArticleUpdateInput {
    #[validate(length(min = 1, max = 500))]
    pub title: Option<String>,

    #[validate(length(max = 5000))]
    pub summary: Option<String>,

    pub content: Option<Value>,

    #[serde(alias = "heroImage", alias = "heroImageUrl")]
    pub hero_image_url: Option<String>,

    #[validate(length(min = 2, max = 16))]
    pub locale: Option<String>,

    pub category: Option<Uuid>,

    #[serde(alias = "therapyAreas")]
    pub therapy_areas: Option<Vec<Uuid>>,

    #[serde(alias = "diseaseAreas")]
    pub disease_areas: Option<Vec<Uuid>>,

    #[serde(alias = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Content must be a rich-text block list; `null` stands for no blocks
fn require_blocks(content: Option<&Value>) -> Result<()> {
    match content {
        None | Some(Value::Null) | Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(AppError::Validation {
            message: "content must be a list of rich-text blocks".to_string(),
            field: Some("content".to_string()),
        }),
    }
}

/// Missing content is stored as an empty block list
fn blocks(content: Value) -> Value {
    match content {
        Value::Null => Value::Array(Vec::new()),
        other => other,
    }
}

impl From<ArticleInput> for NewArticle {
    fn from(input: ArticleInput) -> Self {
        NewArticle {
            title: input.title.trim().to_string(),
            slug: input.slug.unwrap_or_default(),
            summary: input.summary,
            content: blocks(input.content),
            hero_image_url: input.hero_image_url.filter(|u| !u.is_empty()),
            locale: input.locale,
            category_id: input.category,
            therapy_area_ids: input.therapy_areas,
            disease_area_ids: input.disease_areas,
            published_at: input.published_at,
            localizations: Vec::new(),
        }
    }
}

impl From<ArticleUpdateInput> for ArticleChanges {
    fn from(input: ArticleUpdateInput) -> Self {
        ArticleChanges {
            title: input.title.map(|t| t.trim().to_string()),
            summary: input.summary,
            content: input.content.map(blocks),
            hero_image_url: input.hero_image_url,
            locale: input.locale,
            category_id: input.category,
            therapy_area_ids: input.therapy_areas,
            disease_area_ids: input.disease_areas,
            published_at: input.published_at,
        }
    }
}

/// GET /api/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>> {
    let (query, page, populate) = article_query(&params, &state.config.content)?;
    let result = state.store.list_articles(&query).await?;

    let items = result
        .items
        .iter()
        .map(|view| state.envelope.article(view, &populate))
        .collect();
    Ok(Json(collection(items, &page, result.total)))
}

/// GET /api/articles/{id}
pub async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<Params>,
) -> Result<Json<Value>> {
    let view = state
        .store
        .find_article(id)
        .await?
        .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

    let populate = parse_populate(&params);
    Ok(Json(single(state.envelope.article(&view, &populate))))
}

/// POST /api/articles
pub async fn create_article(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(body): Json<DataBody<ArticleInput>>,
) -> Result<(StatusCode, Json<Value>)> {
    body.data.validate()?;
    require_blocks(Some(&body.data.content))?;

    let view = state.articles.create(body.data.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(single(state.envelope.article(&view, &Populate::All))),
    ))
}

/// PUT /api/articles/{id}
pub async fn update_article(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<DataBody<ArticleUpdateInput>>,
) -> Result<Json<Value>> {
    body.data.validate()?;
    require_blocks(body.data.content.as_ref())?;

    let view = state.articles.update(id, body.data.into()).await?;
    Ok(Json(single(state.envelope.article(&view, &Populate::All))))
}

/// DELETE /api/articles/{id}
///
/// Responds with the entry as it was before deletion.
pub async fn delete_article(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let view = state
        .store
        .find_article(id)
        .await?
        .ok_or_else(|| AppError::ArticleNotFound { id: id.to_string() })?;

    state.articles.delete(id).await?;
    Ok(Json(single(state.envelope.article(&view, &Populate::All))))
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lsfeed_common::config::ResponseShape;
    use lsfeed_common::store::{ArticleQuery, ContentStore, NewTerm, TaxonomyKind};
    use serde_json::{json, Value};

    fn statin() -> Value {
        json!({
            "data": {
                "title": "New statin",
                "summary": "Lower LDL",
                "content": [{"type": "paragraph", "children": [{"type": "text", "text": "Body"}]}],
                "heroImage": "/uploads/statin.png",
                "publishedAt": "2025-03-01T00:00:00Z"
            }
        })
    }

    fn localization<'a>(article: &'a Value, locale: &str) -> &'a Value {
        article["localizations"]
            .as_array()
            .and_then(|entries| entries.iter().find(|e| e["locale"] == locale))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_translates_english_article() {
        let (app, store) = app();

        let (status, body) = send(&app, json("POST", "/api/articles", statin())).await;
        assert_eq!(status, StatusCode::CREATED);

        let article = &body["data"];
        assert_eq!(article["slug"], "new-statin");
        assert_eq!(article["locale"], "en");
        assert_eq!(article["localizations"].as_array().map(Vec::len), Some(3));

        let pt = localization(article, "pt-BR");
        assert_eq!(pt["summary"], "[pt-BR] Lower LDL");
        assert_eq!(pt["content"][0]["children"][0]["text"], "[pt-BR] Body");

        let stored = store
            .find_article(article["id"].as_str().unwrap().parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.relations.localizations.len(), 3);
    }

    #[tokio::test]
    async fn test_create_non_english_article_is_not_translated() {
        let (app, store) = app();
        let mut body = statin();
        body["data"]["locale"] = json!("fr-FR");

        let (status, body) = send(&app, json("POST", "/api/articles", body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["localizations"], json!([]));

        let query = ArticleQuery {
            with_localizations: true,
            ..Default::default()
        };
        let listed = store.list_articles(&query).await.unwrap();
        assert!(listed.items[0].relations.localizations.is_empty());
    }

    #[tokio::test]
    async fn test_slug_collision_gets_suffix() {
        let (app, _) = app();
        send(&app, json("POST", "/api/articles", statin())).await;
        let (_, body) = send(&app, json("POST", "/api/articles", statin())).await;
        assert_eq!(body["data"]["slug"], "new-statin-1");
    }

    #[tokio::test]
    async fn test_summary_update_retranslates_summary_only() {
        let (app, store) = app();
        let (_, created) = send(&app, json("POST", "/api/articles", statin())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();
        let writes = store.localization_writes();

        let update = json!({"data": {"summary": "Much lower LDL"}});
        let (status, body) =
            send(&app, json("PUT", &format!("/api/articles/{}", id), update)).await;
        assert_eq!(status, StatusCode::OK);

        let es = localization(&body["data"], "es-ES");
        assert_eq!(es["summary"], "[es-ES] Much lower LDL");
        assert_eq!(es["content"][0]["children"][0]["text"], "[es-ES] Body");
        assert_eq!(store.localization_writes(), writes + 3);
    }

    #[tokio::test]
    async fn test_update_without_translatable_change_writes_nothing() {
        let (app, store) = app();
        let (_, created) = send(&app, json("POST", "/api/articles", statin())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();
        let writes = store.localization_writes();

        let update = json!({"data": {"title": "Newer statin"}});
        let (status, body) =
            send(&app, json("PUT", &format!("/api/articles/{}", id), update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], "Newer statin");
        assert_eq!(store.localization_writes(), writes);
    }

    #[tokio::test]
    async fn test_writes_require_admin_token() {
        let (app, _) = app();

        let request = Request::post("/api/articles")
            .header("content-type", "application/json")
            .body(Body::from(statin().to_string()))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let request = Request::post("/api/articles")
            .header("content-type", "application/json")
            .header("authorization", "Bearer wrong")
            .body(Body::from(statin().to_string()))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let (app, store) = app();
        let (status, body) = send(
            &app,
            json("POST", "/api/articles", json!({"data": {"title": ""}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        let listed = store.list_articles(&ArticleQuery::default()).await.unwrap();
        assert_eq!(listed.total, 0);
    }

    #[tokio::test]
    async fn test_non_block_content_rejected() {
        let (app, store) = app();
        let mut plain = statin();
        plain["data"]["content"] = json!("Plain body");

        let (status, body) = send(&app, json("POST", "/api/articles", plain)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        let listed = store.list_articles(&ArticleQuery::default()).await.unwrap();
        assert_eq!(listed.total, 0);

        let (_, created) = send(&app, json("POST", "/api/articles", statin())).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();
        let update = json!({"data": {"summary": "Changed", "content": {"text": "Body"}}});
        let (status, _) = send(&app, json("PUT", &format!("/api/articles/{}", id), update)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, get(&format!("/api/articles/{}", id))).await;
        assert_eq!(body["data"]["summary"], "Lower LDL");
        assert_eq!(store.localization_writes(), 0);
    }

    #[tokio::test]
    async fn test_null_content_stored_as_empty_blocks() {
        let (app, _) = app();
        let mut empty = statin();
        empty["data"]["content"] = Value::Null;

        let (status, body) = send(&app, json("POST", "/api/articles", empty)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["content"], json!([]));
    }

    #[tokio::test]
    async fn test_list_by_therapy_area() {
        let (app, store) = app();
        let oncology = store
            .create_term(TaxonomyKind::TherapyArea, NewTerm::named("Oncology"))
            .await
            .unwrap();

        let mut tagged = statin();
        tagged["data"]["title"] = json!("Checkpoint inhibitors");
        tagged["data"]["therapy_areas"] = json!([oncology.id]);
        send(&app, json("POST", "/api/articles", tagged)).await;
        send(&app, json("POST", "/api/articles", statin())).await;

        let (status, body) = send(
            &app,
            get("/api/articles?filters[therapy_areas][slug][$eq]=oncology&sort[0]=publishedAt:desc&pagination[limit]=100&populate=*"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["slug"], "checkpoint-inhibitors");
        assert_eq!(data[0]["therapy_areas"][0]["slug"], "oncology");
        assert_eq!(body["meta"]["pagination"]["total"], 1);
        assert_eq!(body["meta"]["pagination"]["limit"], 100);
    }

    #[tokio::test]
    async fn test_invalid_query_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/api/articles?sort=rating:desc")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_QUERY");
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_bad_request() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            get(&format!("/api/articles?pagination[page]={}", u64::MAX)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_QUERY");
    }

    #[tokio::test]
    async fn test_attributes_shape() {
        let (app, _) = app_with(|c| c.content.response_shape = ResponseShape::Attributes);
        send(&app, json("POST", "/api/articles", statin())).await;

        let (_, body) = send(&app, get("/api/articles?populate=*")).await;
        let entry = &body["data"][0];
        assert_eq!(entry["attributes"]["title"], "New statin");
        assert_eq!(
            entry["attributes"]["heroImage"]["data"]["attributes"]["url"],
            "/uploads/statin.png"
        );
        assert!(entry.get("title").is_none());
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let (app, _) = app();
        let (_, created) = send(&app, json("POST", "/api/articles", statin())).await;
        let uri = format!("/api/articles/{}", created["data"]["id"].as_str().unwrap());

        let (status, body) = send(&app, get(&format!("{}?populate=heroImage", uri))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["heroImage"]["url"], "/uploads/statin.png");
        assert!(body["data"].get("localizations").is_none());

        let delete = Request::delete(&uri)
            .header("authorization", format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "ARTICLE_NOT_FOUND");
    }
}
