//! API handlers module

pub mod articles;
pub mod health;
pub mod taxonomy;

use crate::AppState;
use axum::{routing::get, Router};
use serde::Deserialize;

/// Write bodies arrive as `{"data": {...}}`
#[derive(Debug, Deserialize)]
pub struct DataBody<T> {
    pub data: T,
}

/// Routes mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route(
            "/articles/{id}",
            get(articles::get_article)
                .put(articles::update_article)
                .delete(articles::delete_article),
        )
        .route(
            "/therapy-areas",
            get(taxonomy::list_therapy_areas).post(taxonomy::create_therapy_area),
        )
        .route(
            "/categories",
            get(taxonomy::list_categories).post(taxonomy::create_category),
        )
        .route(
            "/disease-areas",
            get(taxonomy::list_disease_areas).post(taxonomy::create_disease_area),
        )
}
