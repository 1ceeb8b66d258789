//! Machine translation abstraction
//!
//! Providers:
//! - `prefix`: reference provider, returns `"[<target>] " + text`
//! - `deepl`: DeepL REST API over HTTP

use crate::config::TranslationConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use serde_json::Value;
#[cfg(test)]
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Translate text between two locales
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;

    fn provider_name(&self) -> &str;
}

/// What to do when some target locales fail to translate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed locale aborts the whole write
    #[default]
    AllOrNothing,
    /// Failed locales are logged and skipped
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "message")]
pub enum LocaleStatus {
    Translated,
    Failed(String),
}

/// Result of translating one article into one locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocaleOutcome {
    pub locale: String,
    #[serde(flatten)]
    pub status: LocaleStatus,
}

impl LocaleOutcome {
    pub fn translated(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            status: LocaleStatus::Translated,
        }
    }

    pub fn failed(locale: &str, err: &AppError) -> Self {
        Self {
            locale: locale.to_string(),
            status: LocaleStatus::Failed(err.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, LocaleStatus::Failed(_))
    }
}

impl FailurePolicy {
    /// Reject the outcome set if the policy does not tolerate its failures
    pub fn enforce(&self, outcomes: &[LocaleOutcome]) -> Result<()> {
        let failed = outcomes.iter().find(|o| o.is_failed());
        match (self, failed) {
            (FailurePolicy::AllOrNothing, Some(outcome)) => {
                let message = match &outcome.status {
                    LocaleStatus::Failed(m) => m.clone(),
                    LocaleStatus::Translated => String::new(),
                };
                Err(AppError::Translation {
                    locale: outcome.locale.clone(),
                    message,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Reference provider
#[derive(Default)]
pub struct PrefixTranslator {
    calls: AtomicU64,
}

impl PrefixTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of texts sent to this provider
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for PrefixTranslator {
    async fn translate(&self, text: &str, _source: &str, target: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("[{}] {}", target, text))
    }

    fn provider_name(&self) -> &str {
        "prefix"
    }
}

/// Prefix provider that fails for a fixed set of target locales
#[cfg(test)]
pub(crate) struct FailingTranslator {
    inner: PrefixTranslator,
    failing: HashSet<String>,
}

#[cfg(test)]
impl FailingTranslator {
    pub(crate) fn for_locales<I, S>(locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: PrefixTranslator::new(),
            failing: locales.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        if self.failing.contains(target) {
            return Err(AppError::Translation {
                locale: target.to_string(),
                message: "provider rejected locale".to_string(),
            });
        }
        self.inner.translate(text, source, target).await
    }

    fn provider_name(&self) -> &str {
        "failing"
    }
}

const DEEPL_DEFAULT_BASE: &str = "https://api-free.deepl.com/v2";

/// DeepL HTTP client
pub struct DeepLTranslator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct DeepLRequest<'a> {
    text: [&'a str; 1],
    source_lang: String,
    target_lang: String,
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// Map a locale tag to a DeepL language code
///
/// Target codes keep the region only where DeepL distinguishes variants.
pub fn deepl_lang(locale: &str, target: bool) -> String {
    let upper = locale.replace('_', "-").to_uppercase();
    let primary = upper.split('-').next().unwrap_or_default().to_string();
    if !target {
        return primary;
    }
    match upper.as_str() {
        "PT-BR" | "PT-PT" | "EN-GB" | "EN-US" => upper,
        _ if primary == "ZH" => upper,
        _ => primary,
    }
}

impl DeepLTranslator {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEEPL_DEFAULT_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
            max_retries,
        })
    }

    async fn request(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> std::result::Result<String, backoff::Error<AppError>> {
        let body = DeepLRequest {
            text: [text],
            source_lang: deepl_lang(source, false),
            target_lang: deepl_lang(target, true),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.base_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(AppError::Translation {
                    locale: target.to_string(),
                    message: format!("Request failed: {}", e),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = AppError::Translation {
                locale: target.to_string(),
                message: format!("API error {}: {}", status, body),
            };
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        let parsed: DeepLResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::Translation {
                locale: target.to_string(),
                message: format!("Failed to parse response: {}", e),
            })
        })?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| {
                backoff::Error::permanent(AppError::Translation {
                    locale: target.to_string(),
                    message: "Empty response".to_string(),
                })
            })
    }
}

#[async_trait]
impl Translator for DeepLTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.timeout * (self.max_retries + 1)),
            ..Default::default()
        };

        let attempts = &AtomicU64::new(0);
        retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            match self.request(text, source, target).await {
                Err(backoff::Error::Transient { err, .. }) if attempt >= self.max_retries as u64 => {
                    Err(backoff::Error::permanent(err))
                }
                Err(e) => {
                    if let backoff::Error::Transient { err, .. } = &e {
                        tracing::warn!(
                            locale = target,
                            attempt = attempt + 1,
                            error = %err,
                            "Translation request failed, retrying"
                        );
                    }
                    Err(e)
                }
                ok => ok,
            }
        })
        .await
    }

    fn provider_name(&self) -> &str {
        "deepl"
    }
}

/// Build the translator selected by configuration
pub fn create_translator(config: &TranslationConfig) -> Result<Arc<dyn Translator>> {
    match config.provider.as_str() {
        "prefix" => Ok(Arc::new(PrefixTranslator::new())),
        "deepl" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "translation.api_key is required for the deepl provider".to_string(),
            })?;
            Ok(Arc::new(DeepLTranslator::new(
                key,
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown translation provider: {}", other),
        }),
    }
}

/// Translate the text leaves of a rich-text value, keeping its structure
///
/// Text leaves are string values under a `"text"` key, plain strings inside
/// arrays, and a bare string root. Empty leaves are left alone.
pub async fn translate_blocks(
    translator: &dyn Translator,
    value: &Value,
    source: &str,
    target: &str,
) -> Result<Value> {
    let mut texts = Vec::new();
    collect_leaves(value, &mut texts);

    let mut translated = Vec::with_capacity(texts.len());
    for text in texts {
        translated.push(translator.translate(text, source, target).await?);
    }

    let mut out = value.clone();
    let mut replacements = translated.into_iter();
    replace_leaves(&mut out, &mut replacements);
    Ok(out)
}

/// Translate a plain text field, skipping the provider for empty input
pub async fn translate_text(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
) -> Result<String> {
    if text.is_empty() {
        return Ok(String::new());
    }
    translator.translate(text, source, target).await
}

fn collect_leaves<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| collect_leaves(v, out)),
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::String(s) if key == "text" && !s.is_empty() => out.push(s),
                    Value::Array(_) | Value::Object(_) => collect_leaves(v, out),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn replace_leaves(value: &mut Value, replacements: &mut impl Iterator<Item = String>) {
    match value {
        Value::String(s) if !s.is_empty() => {
            if let Some(next) = replacements.next() {
                *s = next;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| replace_leaves(v, replacements)),
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                match v {
                    Value::String(s) if key == "text" && !s.is_empty() => {
                        if let Some(next) = replacements.next() {
                            *s = next;
                        }
                    }
                    Value::Array(_) | Value::Object(_) => replace_leaves(v, replacements),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_prefix_translator() {
        let t = PrefixTranslator::new();
        let out = assert_ok!(t.translate("Hello", "en", "fr-FR").await);
        assert_eq!(out, "[fr-FR] Hello");
        assert_eq!(t.calls(), 1);
    }

    #[tokio::test]
    async fn test_blocks_keep_structure() {
        let t = PrefixTranslator::new();
        let content = json!([
            {"type": "paragraph", "children": [
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": "", "bold": true}
            ]},
            {"type": "image", "image": {"url": "/uploads/a.png"}}
        ]);

        let out = translate_blocks(&t, &content, "en", "es-ES").await.unwrap();
        assert_eq!(
            out,
            json!([
                {"type": "paragraph", "children": [
                    {"type": "text", "text": "[es-ES] Hello"},
                    {"type": "text", "text": "", "bold": true}
                ]},
                {"type": "image", "image": {"url": "/uploads/a.png"}}
            ])
        );
        // the empty leaf never reached the provider
        assert_eq!(t.calls(), 1);
    }

    #[tokio::test]
    async fn test_bare_string_content() {
        let t = PrefixTranslator::new();
        let out = translate_blocks(&t, &json!("Plain body"), "en", "pt-BR").await.unwrap();
        assert_eq!(out, json!("[pt-BR] Plain body"));
    }

    #[tokio::test]
    async fn test_empty_text_skips_provider() {
        let t = PrefixTranslator::new();
        assert_eq!(translate_text(&t, "", "en", "fr-FR").await.unwrap(), "");
        assert_eq!(t.calls(), 0);
    }

    #[tokio::test]
    async fn test_failing_translator() {
        let t = FailingTranslator::for_locales(["fr-FR"]);
        assert_err!(t.translate("x", "en", "fr-FR").await);
        assert_eq!(t.translate("x", "en", "es-ES").await.unwrap(), "[es-ES] x");
    }

    #[test]
    fn test_policy_enforce() {
        let err = AppError::Translation {
            locale: "fr-FR".into(),
            message: "down".into(),
        };
        let outcomes = vec![
            LocaleOutcome::translated("pt-BR"),
            LocaleOutcome::failed("fr-FR", &err),
        ];
        assert!(FailurePolicy::BestEffort.enforce(&outcomes).is_ok());
        match FailurePolicy::AllOrNothing.enforce(&outcomes) {
            Err(AppError::Translation { locale, .. }) => assert_eq!(locale, "fr-FR"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(FailurePolicy::AllOrNothing
            .enforce(&[LocaleOutcome::translated("es-ES")])
            .is_ok());
    }

    async fn spawn_deepl_stub(failures: u64, status: u16) -> (String, Arc<AtomicU64>) {
        use axum::{http::StatusCode, routing::post, Json, Router};

        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/translate",
            post(move |Json(body): Json<Value>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        return Err(StatusCode::from_u16(status).unwrap());
                    }
                    let text = body["text"][0].as_str().unwrap_or_default().to_string();
                    let lang = body["target_lang"].as_str().unwrap_or_default().to_string();
                    Ok(Json(json!({"translations": [{"text": format!("{}:{}", lang, text)}]})))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    #[tokio::test]
    async fn test_deepl_retries_server_errors() {
        let (base, hits) = spawn_deepl_stub(2, 503).await;
        let t = DeepLTranslator::new("k".into(), Some(base), Duration::from_secs(5), 3).unwrap();
        let out = t.translate("Hello", "en", "pt-BR").await.unwrap();
        assert_eq!(out, "PT-BR:Hello");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deepl_client_error_is_permanent() {
        let (base, hits) = spawn_deepl_stub(10, 403).await;
        let t = DeepLTranslator::new("k".into(), Some(base), Duration::from_secs(5), 3).unwrap();
        let err = t.translate("Hello", "en", "fr-FR").await.unwrap_err();
        assert!(matches!(err, AppError::Translation { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deepl_lang() {
        assert_eq!(deepl_lang("en", false), "EN");
        assert_eq!(deepl_lang("pt-BR", true), "PT-BR");
        assert_eq!(deepl_lang("es-ES", true), "ES");
        assert_eq!(deepl_lang("fr_FR", true), "FR");
        assert_eq!(deepl_lang("zh-hans", true), "ZH-HANS");
    }

    #[test]
    fn test_create_translator() {
        let mut config = TranslationConfig::default();
        assert_eq!(create_translator(&config).unwrap().provider_name(), "prefix");

        config.provider = "deepl".into();
        assert!(create_translator(&config).is_err());
        config.api_key = Some("key".into());
        assert_eq!(create_translator(&config).unwrap().provider_name(), "deepl");

        config.provider = "nope".into();
        assert!(create_translator(&config).is_err());
    }
}
