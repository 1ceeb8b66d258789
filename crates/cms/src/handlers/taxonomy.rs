//! Therapy area, category and disease area handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::DataBody;
use crate::envelope::{collection, single};
use crate::query::{term_query, Params, Populate};
use crate::AppState;
use lsfeed_common::{
    auth::AdminAuth,
    errors::{AppError, Result},
    slug::slugify,
    store::{NewTerm, TaxonomyKind},
};

#[derive(Debug, Deserialize, Validate)]
pub struct TermInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[serde(default)]
    #[validate(length(max = 200))]
    pub slug: Option<String>,

    /// Parent therapy area of a disease area, by id or slug
    #[serde(default, alias = "therapyArea")]
    pub therapy_area: Option<String>,
}

async fn list(state: AppState, kind: TaxonomyKind, params: Params) -> Result<Json<Value>> {
    let (query, page, populate) = term_query(kind, &params, &state.config.content)?;
    let result = state.store.list_terms(&query).await?;

    let items = result
        .items
        .iter()
        .map(|term| state.envelope.term(term, &populate))
        .collect();
    Ok(Json(collection(items, &page, result.total)))
}

async fn resolve_therapy_area(state: &AppState, reference: &str) -> Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(reference) {
        return Ok(id);
    }
    state
        .store
        .find_term_by_slug(TaxonomyKind::TherapyArea, reference)
        .await?
        .map(|t| t.id)
        .ok_or_else(|| AppError::TermNotFound {
            kind: TaxonomyKind::TherapyArea.label().to_string(),
            slug: reference.to_string(),
        })
}

async fn create(
    state: AppState,
    kind: TaxonomyKind,
    input: TermInput,
) -> Result<(StatusCode, Json<Value>)> {
    input.validate()?;

    let name = input.name.trim().to_string();
    let slug = match input.slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => slugify(s),
        _ => slugify(&name),
    };
    if slug.is_empty() {
        return Err(AppError::Validation {
            message: "name must contain at least one letter or digit".to_string(),
            field: Some("name".to_string()),
        });
    }

    let mut term = NewTerm {
        name,
        slug,
        parent_id: None,
    };

    match (kind, input.therapy_area.as_deref()) {
        (TaxonomyKind::DiseaseArea, Some(parent)) => {
            term.parent_id = Some(resolve_therapy_area(&state, parent.trim()).await?);
        }
        (TaxonomyKind::DiseaseArea, None) => {
            return Err(AppError::MissingField {
                field: "therapy_area".to_string(),
            });
        }
        (_, Some(_)) => {
            return Err(AppError::Validation {
                message: format!("{} has no therapy area", kind.label()),
                field: Some("therapy_area".to_string()),
            });
        }
        (_, None) => {}
    }

    let created = state.store.create_term(kind, term).await?;
    info!(kind = %kind, slug = %created.slug, "Term created");

    Ok((
        StatusCode::CREATED,
        Json(single(state.envelope.term(&created, &Populate::All))),
    ))
}

/// GET /api/therapy-areas
pub async fn list_therapy_areas(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>> {
    list(state, TaxonomyKind::TherapyArea, params).await
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>> {
    list(state, TaxonomyKind::Category, params).await
}

/// GET /api/disease-areas
pub async fn list_disease_areas(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>> {
    list(state, TaxonomyKind::DiseaseArea, params).await
}

pub async fn create_therapy_area(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(body): Json<DataBody<TermInput>>,
) -> Result<(StatusCode, Json<Value>)> {
    create(state, TaxonomyKind::TherapyArea, body.data).await
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(body): Json<DataBody<TermInput>>,
) -> Result<(StatusCode, Json<Value>)> {
    create(state, TaxonomyKind::Category, body.data).await
}

pub async fn create_disease_area(
    State(state): State<AppState>,
    _admin: AdminAuth,
    Json(body): Json<DataBody<TermInput>>,
) -> Result<(StatusCode, Json<Value>)> {
    create(state, TaxonomyKind::DiseaseArea, body.data).await
}
