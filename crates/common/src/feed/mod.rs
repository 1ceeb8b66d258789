//! Content API normalization
//!
//! Content API entries come either wrapped (`{id, attributes: {...}}`) or
//! flat (`{id, ...}`), relations either as `{data: ...}` envelopes or as
//! plain objects and arrays, and some fields with capitalized names. All of
//! it is mapped here onto one set of records so callers never branch on
//! shape. Lookups never fail: a missing field becomes an empty value.

mod client;

pub use client::ContentClient;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry as returned by the content API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Wrapped {
        #[serde(default)]
        id: Option<Value>,
        attributes: Map<String, Value>,
    },
    Flat(Map<String, Value>),
}

fn capitalized(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn non_null<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl RawEntry {
    fn attributes(&self) -> Option<&Map<String, Value>> {
        match self {
            RawEntry::Wrapped { attributes, .. } => Some(attributes),
            RawEntry::Flat(_) => None,
        }
    }

    fn top(&self) -> Option<&Map<String, Value>> {
        match self {
            RawEntry::Wrapped { .. } => None,
            RawEntry::Flat(map) => Some(map),
        }
    }

    /// Field value: nested shape, flat shape, then the capitalized variants
    pub fn field(&self, name: &str) -> Option<&Value> {
        let cap = capitalized(name);
        let lookups = [
            (self.attributes(), name),
            (self.top(), name),
            (self.attributes(), cap.as_str()),
            (self.top(), cap.as_str()),
        ];
        let found = lookups
            .into_iter()
            .find_map(|(map, key)| map.and_then(|m| non_null(m, key)));
        found
    }

    /// First of `names` holding a scalar, as text; empty when none does
    pub fn text(&self, names: &[&str]) -> String {
        names
            .iter()
            .find_map(|n| self.field(n).and_then(scalar_text))
            .unwrap_or_default()
    }

    pub fn id(&self) -> String {
        match self {
            RawEntry::Wrapped { id, .. } => id.as_ref().and_then(scalar_text).unwrap_or_default(),
            RawEntry::Flat(map) => non_null(map, "id").and_then(scalar_text).unwrap_or_default(),
        }
    }

    fn relation(&self, names: &[&str]) -> Vec<&Map<String, Value>> {
        names
            .iter()
            .find_map(|n| self.field(n))
            .map(relation_entries)
            .unwrap_or_default()
    }
}

/// Objects behind a relation value, unwrapping `data` and `attributes`
fn relation_entries(value: &Value) -> Vec<&Map<String, Value>> {
    match value {
        Value::Array(items) => items.iter().flat_map(relation_entries).collect(),
        Value::Object(map) => match map.get("data") {
            Some(data) => relation_entries(data),
            None => match map.get("attributes") {
                Some(Value::Object(attrs)) => vec![attrs],
                _ => vec![map],
            },
        },
        _ => Vec::new(),
    }
}

fn map_text(map: &Map<String, Value>, key: &str) -> String {
    non_null(map, key).and_then(scalar_text).unwrap_or_default()
}

/// Make a media URL absolute against the content store origin
pub fn absolute_url(url: &str, origin: &str) -> String {
    if url.is_empty() || reqwest::Url::parse(url).is_ok() {
        return url.to_string();
    }
    let origin = origin.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", origin, url)
    } else {
        format!("{}/{}", origin, url)
    }
}

/// Name and slug of a taxonomy term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionMeta {
    pub name: String,
    pub slug: String,
}

impl SectionMeta {
    pub fn from_entry(entry: &RawEntry) -> Self {
        Self {
            name: entry.text(&["name"]),
            slug: entry.text(&["slug"]),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            name: map_text(map, "name"),
            slug: map_text(map, "slug"),
        }
    }
}

/// Article card data used by every listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    /// Absolute hero image URL, empty when the article has none
    pub image_url: String,
    pub published_at: String,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
    pub therapy_area_slug: Option<String>,
    pub disease_area_name: Option<String>,
    pub disease_area_slug: Option<String>,
}

impl ArticleSummary {
    pub fn from_entry(entry: &RawEntry, origin: &str) -> Self {
        let category = entry.relation(&["category"]).into_iter().next().map(SectionMeta::from_map);
        let disease_area = entry
            .relation(&["disease_areas", "diseaseAreas"])
            .into_iter()
            .next()
            .map(SectionMeta::from_map);
        let therapy_area = entry
            .relation(&["therapy_areas", "therapyAreas"])
            .into_iter()
            .next()
            .map(SectionMeta::from_map);

        Self {
            slug: entry.text(&["slug"]),
            title: entry.text(&["title"]),
            excerpt: entry.text(&["excerpt", "summary"]),
            image_url: hero_image(entry, origin),
            published_at: entry.text(&["publishedAt", "published_at"]),
            category_name: category.as_ref().map(|c| c.name.clone()),
            category_slug: category.map(|c| c.slug),
            therapy_area_slug: therapy_area.map(|t| t.slug),
            disease_area_name: disease_area.as_ref().map(|d| d.name.clone()),
            disease_area_slug: disease_area.map(|d| d.slug),
        }
    }

    /// Image to show for this card
    pub fn display_image<'a>(&'a self, placeholder: &'a str) -> &'a str {
        if self.image_url.is_empty() {
            placeholder
        } else {
            &self.image_url
        }
    }
}

fn hero_image(entry: &RawEntry, origin: &str) -> String {
    let url = match entry.field("heroImage") {
        Some(Value::String(url)) => url.clone(),
        Some(value) => relation_entries(value)
            .into_iter()
            .next()
            .map(|m| map_text(m, "url"))
            .unwrap_or_default(),
        None => entry.text(&["heroImageUrl", "hero_image_url"]),
    };
    absolute_url(&url, origin)
}

/// Full article for the detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub summary: String,
    /// Rich-text blocks; an empty list when the entry has none
    pub content: Value,
    pub image_url: String,
    pub published_at: String,
    pub category: Option<SectionMeta>,
    pub therapy_areas: Vec<SectionMeta>,
    pub disease_areas: Vec<SectionMeta>,
}

impl ArticleDetail {
    pub fn from_entry(entry: &RawEntry, origin: &str) -> Self {
        let terms = |names: &[&str]| -> Vec<SectionMeta> {
            entry
                .relation(names)
                .into_iter()
                .map(SectionMeta::from_map)
                .filter(|t| !t.slug.is_empty())
                .collect()
        };

        let title = entry.text(&["title"]);
        let content = match entry.field("content") {
            Some(v @ Value::Array(_)) => v.clone(),
            _ => Value::Array(Vec::new()),
        };

        Self {
            id: entry.id(),
            title: if title.is_empty() {
                "Untitled Article".to_string()
            } else {
                title
            },
            slug: entry.text(&["slug"]),
            summary: entry.text(&["summary", "excerpt"]),
            content,
            image_url: hero_image(entry, origin),
            published_at: entry.text(&["publishedAt", "published_at"]),
            category: entry
                .relation(&["category"])
                .into_iter()
                .next()
                .map(SectionMeta::from_map),
            therapy_areas: terms(&["therapy_areas", "therapyAreas"]),
            disease_areas: terms(&["disease_areas", "diseaseAreas"]),
        }
    }

    pub fn has_therapy_area(&self, slug: &str) -> bool {
        self.therapy_areas.iter().any(|t| t.slug == slug)
    }
}

/// Parent therapy area of a disease-area entry
pub fn parent_therapy_area(entry: &RawEntry) -> Option<SectionMeta> {
    entry
        .relation(&["therapy_area", "therapyArea", "therapy_areas"])
        .into_iter()
        .next()
        .map(SectionMeta::from_map)
        .filter(|t| !t.slug.is_empty())
}

/// Entries of a response's `data` member; malformed entries are skipped
pub fn parse_collection(body: &Value) -> Vec<RawEntry> {
    let items = match body.get("data") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(single @ Value::Object(_)) => std::slice::from_ref(single),
        _ => &[],
    };

    items
        .iter()
        .filter(|v| v.is_object())
        .filter_map(|v| match serde_json::from_value::<RawEntry>(v.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed content entry");
                None
            }
        })
        .collect()
}

/// Total reported in `meta.pagination.total`, if any
pub fn pagination_total(body: &Value) -> Option<u64> {
    body.pointer("/meta/pagination/total").and_then(Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGIN: &str = "https://cms.example.com";

    fn entry(v: Value) -> RawEntry {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_wrapped_and_flat_normalize_identically() {
        let wrapped = entry(json!({
            "id": 7,
            "attributes": {
                "slug": "new-statin",
                "title": "New statin",
                "summary": "Lower LDL",
                "publishedAt": "2025-03-01T00:00:00.000Z",
                "heroImage": {"data": {"id": 1, "attributes": {"url": "/uploads/statin.png"}}},
                "category": {"data": {"id": 2, "attributes": {"name": "News", "slug": "news"}}},
                "therapy_areas": {"data": [{"id": 3, "attributes": {"name": "Cardiology", "slug": "cardiology"}}]},
                "disease_areas": {"data": [
                    {"id": 4, "attributes": {"name": "Hypertension", "slug": "hypertension"}},
                    {"id": 5, "attributes": {"name": "Heart failure", "slug": "heart-failure"}}
                ]}
            }
        }));
        let flat = entry(json!({
            "id": 7,
            "slug": "new-statin",
            "Title": "New statin",
            "Summary": "Lower LDL",
            "publishedAt": "2025-03-01T00:00:00.000Z",
            "heroImage": {"url": "/uploads/statin.png"},
            "category": {"id": 2, "name": "News", "slug": "news"},
            "therapy_areas": [{"id": 3, "name": "Cardiology", "slug": "cardiology"}],
            "disease_areas": [
                {"id": 4, "name": "Hypertension", "slug": "hypertension"},
                {"id": 5, "name": "Heart failure", "slug": "heart-failure"}
            ]
        }));

        assert!(matches!(wrapped, RawEntry::Wrapped { .. }));
        assert!(matches!(flat, RawEntry::Flat(_)));

        let a = ArticleSummary::from_entry(&wrapped, ORIGIN);
        let b = ArticleSummary::from_entry(&flat, ORIGIN);
        assert_eq!(a, b);
        assert_eq!(a.image_url, "https://cms.example.com/uploads/statin.png");
        assert_eq!(a.excerpt, "Lower LDL");
        assert_eq!(a.category_slug.as_deref(), Some("news"));
        assert_eq!(a.therapy_area_slug.as_deref(), Some("cardiology"));
        assert_eq!(a.disease_area_slug.as_deref(), Some("hypertension"));
    }

    #[test]
    fn test_missing_fields_default() {
        let bare = entry(json!({"id": 1}));
        let summary = ArticleSummary::from_entry(&bare, ORIGIN);
        assert_eq!(summary.slug, "");
        assert_eq!(summary.title, "");
        assert_eq!(summary.image_url, "");
        assert_eq!(summary.category_name, None);
        assert_eq!(summary.display_image("/placeholder.png"), "/placeholder.png");

        let detail = ArticleDetail::from_entry(&bare, ORIGIN);
        assert_eq!(detail.title, "Untitled Article");
        assert_eq!(detail.content, json!([]));
    }

    #[test]
    fn test_field_lookup_order() {
        let wrapped = entry(json!({
            "id": 1,
            "attributes": {"Title": "Capitalized", "summary": null, "Summary": "Fallback"}
        }));
        assert_eq!(wrapped.field("title"), Some(&json!("Capitalized")));
        assert_eq!(wrapped.field("summary"), Some(&json!("Fallback")));
        assert_eq!(wrapped.field("slug"), None);

        let flat = entry(json!({"title": "lower", "Title": "Upper"}));
        assert_eq!(flat.text(&["title"]), "lower");
    }

    #[test]
    fn test_excerpt_preferred_over_summary() {
        let e = entry(json!({"excerpt": "short", "summary": "long"}));
        assert_eq!(ArticleSummary::from_entry(&e, ORIGIN).excerpt, "short");
    }

    #[test]
    fn test_absolute_image_untouched() {
        let e = entry(json!({"heroImage": {"data": null}}));
        assert_eq!(ArticleSummary::from_entry(&e, ORIGIN).image_url, "");

        let e = entry(json!({"heroImage": {"url": "https://cdn.example.com/a.jpg"}}));
        let s = ArticleSummary::from_entry(&e, ORIGIN);
        assert_eq!(s.image_url, "https://cdn.example.com/a.jpg");
        assert_eq!(s.display_image("/placeholder.png"), "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_absolute_url_joins() {
        assert_eq!(absolute_url("uploads/x.png", "http://cms/"), "http://cms/uploads/x.png");
        assert_eq!(absolute_url("/uploads/x.png", "http://cms"), "http://cms/uploads/x.png");
        assert_eq!(absolute_url("", "http://cms"), "");
    }

    #[test]
    fn test_parse_collection_skips_malformed() {
        let body = json!({"data": [
            {"id": 1, "name": "Oncology", "slug": "oncology"},
            "garbage",
            null,
            {"id": 2, "attributes": {"name": "Urology", "slug": "urology"}}
        ]});
        let sections: Vec<_> = parse_collection(&body).iter().map(SectionMeta::from_entry).collect();
        assert_eq!(
            sections,
            vec![
                SectionMeta { name: "Oncology".into(), slug: "oncology".into() },
                SectionMeta { name: "Urology".into(), slug: "urology".into() },
            ]
        );

        assert!(parse_collection(&json!({"data": null})).is_empty());
        assert!(parse_collection(&json!({"error": {}})).is_empty());
    }

    #[test]
    fn test_detail_therapy_areas_and_parent() {
        let e = entry(json!({
            "id": "abc",
            "attributes": {
                "title": "Gene editing",
                "content": [{"type": "paragraph"}],
                "therapyAreas": {"data": [
                    {"attributes": {"name": "Oncology", "slug": "oncology"}},
                    {"attributes": {"name": "Broken", "slug": ""}}
                ]}
            }
        }));
        let d = ArticleDetail::from_entry(&e, ORIGIN);
        assert_eq!(d.id, "abc");
        assert_eq!(d.therapy_areas.len(), 1);
        assert!(d.has_therapy_area("oncology"));
        assert!(!d.has_therapy_area("urology"));

        let disease = entry(json!({
            "name": "Melanoma",
            "slug": "melanoma",
            "therapy_area": {"name": "Dermatology", "slug": "dermatology"}
        }));
        assert_eq!(
            parent_therapy_area(&disease).map(|p| p.slug),
            Some("dermatology".to_string())
        );
    }

    #[test]
    fn test_pagination_total() {
        assert_eq!(pagination_total(&json!({"meta": {"pagination": {"total": 4}}})), Some(4));
        assert_eq!(pagination_total(&json!({"data": []})), None);
    }
}
