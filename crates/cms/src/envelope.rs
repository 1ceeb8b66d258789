//! Response envelopes
//!
//! Every response is `{"data": ..., "meta": {...}}`. Entries are rendered
//! either flat (`{"id", "title", ...}`) or wrapped
//! (`{"id", "attributes": {"title", ...}}`) per `content.response_shape`;
//! relations follow the same shape (`{"data": ...}` when wrapped).

use crate::query::{PageRequest, Populate};
use chrono::{DateTime, FixedOffset};
use lsfeed_common::config::ResponseShape;
use lsfeed_common::db::models::Localization;
use lsfeed_common::store::{ArticleView, Term, TermRef};
use serde_json::{json, Map, Value};
use uuid::Uuid;

fn timestamp(ts: &DateTime<FixedOffset>) -> Value {
    Value::String(ts.to_rfc3339())
}

#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    shape: ResponseShape,
}

impl Envelope {
    pub fn new(shape: ResponseShape) -> Self {
        Self { shape }
    }

    fn entry(&self, id: Uuid, fields: Map<String, Value>) -> Value {
        match self.shape {
            ResponseShape::Flat => {
                let mut map = Map::with_capacity(fields.len() + 1);
                map.insert("id".to_string(), json!(id));
                map.extend(fields);
                Value::Object(map)
            }
            ResponseShape::Attributes => json!({ "id": id, "attributes": fields }),
        }
    }

    fn term_fields(term: &TermRef) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(term.name));
        fields.insert("slug".to_string(), json!(term.slug));
        fields
    }

    /// To-one relation
    pub fn relation_one(&self, term: Option<&TermRef>) -> Value {
        let entry = term.map(|t| self.entry(t.id, Self::term_fields(t)));
        match self.shape {
            ResponseShape::Flat => entry.unwrap_or(Value::Null),
            ResponseShape::Attributes => json!({ "data": entry }),
        }
    }

    /// To-many relation
    pub fn relation_many(&self, terms: &[TermRef]) -> Value {
        let entries: Vec<Value> = terms
            .iter()
            .map(|t| self.entry(t.id, Self::term_fields(t)))
            .collect();
        match self.shape {
            ResponseShape::Flat => Value::Array(entries),
            ResponseShape::Attributes => json!({ "data": entries }),
        }
    }

    fn media(&self, url: Option<&str>) -> Value {
        match (self.shape, url) {
            (ResponseShape::Flat, Some(url)) => json!({ "url": url }),
            (ResponseShape::Flat, None) => Value::Null,
            (ResponseShape::Attributes, Some(url)) => {
                json!({ "data": { "attributes": { "url": url } } })
            }
            (ResponseShape::Attributes, None) => json!({ "data": null }),
        }
    }

    fn localizations(&self, entries: &[Localization]) -> Value {
        let entries: Vec<Value> = entries
            .iter()
            .map(|l| {
                let mut fields = Map::new();
                fields.insert("locale".to_string(), json!(l.locale));
                fields.insert("summary".to_string(), json!(l.summary));
                fields.insert("content".to_string(), l.content.clone());
                fields.insert("updatedAt".to_string(), timestamp(&l.updated_at));
                self.entry(l.id, fields)
            })
            .collect();
        match self.shape {
            ResponseShape::Flat => Value::Array(entries),
            ResponseShape::Attributes => json!({ "data": entries }),
        }
    }

    pub fn article(&self, view: &ArticleView, populate: &Populate) -> Value {
        let a = &view.article;
        let r = &view.relations;

        let mut fields = Map::new();
        fields.insert("title".to_string(), json!(a.title));
        fields.insert("slug".to_string(), json!(a.slug));
        fields.insert("summary".to_string(), json!(a.summary));
        fields.insert("content".to_string(), a.content.clone());
        fields.insert("locale".to_string(), json!(a.locale));
        fields.insert(
            "publishedAt".to_string(),
            a.published_at.as_ref().map(timestamp).unwrap_or(Value::Null),
        );
        fields.insert("createdAt".to_string(), timestamp(&a.created_at));
        fields.insert("updatedAt".to_string(), timestamp(&a.updated_at));

        if populate.includes("heroImage") {
            fields.insert("heroImage".to_string(), self.media(a.hero_image_url.as_deref()));
        }
        if populate.includes("category") {
            fields.insert("category".to_string(), self.relation_one(r.category.as_ref()));
        }
        if populate.includes("therapy_areas") {
            fields.insert("therapy_areas".to_string(), self.relation_many(&r.therapy_areas));
        }
        if populate.includes("disease_areas") {
            fields.insert("disease_areas".to_string(), self.relation_many(&r.disease_areas));
        }
        if populate.includes("localizations") {
            fields.insert("localizations".to_string(), self.localizations(&r.localizations));
        }

        self.entry(a.id, fields)
    }

    pub fn term(&self, term: &Term, populate: &Populate) -> Value {
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(term.name));
        fields.insert("slug".to_string(), json!(term.slug));
        fields.insert("createdAt".to_string(), json!(term.created_at.to_rfc3339()));

        if term.parent.is_some() && populate.includes("therapy_area") {
            fields.insert("therapy_area".to_string(), self.relation_one(term.parent.as_ref()));
        }

        self.entry(term.id, fields)
    }
}

/// `{"data": [...], "meta": {"pagination": ...}}`
pub fn collection(items: Vec<Value>, page: &PageRequest, total: u64) -> Value {
    json!({
        "data": items,
        "meta": { "pagination": page.meta(total) },
    })
}

/// `{"data": {...}, "meta": {}}`
pub fn single(item: Value) -> Value {
    json!({ "data": item, "meta": {} })
}
