//! Page data handlers
//!
//! Responses are served through the page cache keyed by request path.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::AppState;
use lsfeed_common::errors::{AppError, Result};

/// GET /pages/home
pub async fn home(State(state): State<AppState>) -> Result<Json<Value>> {
    let data = state
        .cache
        .get_or_load("home", "home".to_string(), || async {
            let page = state.pages.load_home().await?;
            Ok::<_, AppError>(serde_json::to_value(page)?)
        })
        .await?;
    Ok(Json(data))
}

/// GET /pages/{section}/{slug}
pub async fn section(
    State(state): State<AppState>,
    Path((section, slug)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let key = format!("section:{}:{}", section, slug);
    let data = state
        .cache
        .get_or_load("section", key, || async {
            let page = state.pages.load_section_page(&section, &slug).await?;
            Ok::<_, AppError>(serde_json::to_value(page)?)
        })
        .await?;
    Ok(Json(data))
}

/// GET /pages/therapy-area/{therapy_area}/{slug}
pub async fn article(
    State(state): State<AppState>,
    Path((therapy_area, slug)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let key = format!("article:{}:{}", therapy_area, slug);
    let data = state
        .cache
        .get_or_load("article", key, || async {
            let page = state.pages.load_article_page(&therapy_area, &slug).await?;
            Ok::<_, AppError>(serde_json::to_value(page)?)
        })
        .await?;
    Ok(Json(data))
}

/// GET /paths
pub async fn paths(State(state): State<AppState>) -> Result<Json<Value>> {
    let data = state
        .cache
        .get_or_load("paths", "paths".to_string(), || async {
            let paths = state.pages.static_paths().await?;
            Ok::<_, AppError>(serde_json::to_value(paths)?)
        })
        .await?;
    Ok(Json(data))
}

#[cfg(test)]
mod tests {
    use crate::pages::test_support::{spawn, stub};
    use crate::{create_router, AppState};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use lsfeed_common::config::AppConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> (Router, AppState, String) {
        let base = spawn(stub()).await;
        let mut config = AppConfig::default();
        config.web.content_api_url = base.clone();
        let state = AppState::new(&config).unwrap();
        (create_router(state.clone()), state, base)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_home_is_cached() {
        let (app, state, base) = app().await;

        let (status, body) = get(&app, "/pages/home").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["therapyAreas"][0]["slug"], "oncology");
        let expected = format!("{}/uploads/a.png", base);
        assert_eq!(body["headlines"][0]["displayImage"], expected.as_str());

        get(&app, "/pages/home").await;
        assert_eq!(state.cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_section_page() {
        let (app, _, _) = app().await;
        let (status, body) = get(&app, "/pages/therapy-area/oncology").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["section"], "therapy-area");
        assert_eq!(body["meta"]["name"], "Oncology");
        assert_eq!(body["diseaseAreas"][0]["articleCount"], 4);
    }

    #[tokio::test]
    async fn test_not_found_pages_are_not_cached() {
        let (app, state, _) = app().await;

        let (status, body) = get(&app, "/pages/author/someone").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "PAGE_NOT_FOUND");

        let (status, _) = get(&app, "/pages/therapy-area/cardiology/article-1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_article_page_and_paths() {
        let (app, _, _) = app().await;

        let (status, body) = get(&app, "/pages/therapy-area/oncology/article-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["article"]["slug"], "article-1");

        let (status, body) = get(&app, "/paths").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["articles"][0]["therapyArea"], "oncology");
    }
}
