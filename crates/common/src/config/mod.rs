//! Configuration management for Life Science Feed services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::translation::FailurePolicy;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Write-route authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Translation provider and locale set
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Content API response options
    #[serde(default)]
    pub content: ContentConfig,

    /// Bootstrap seeding
    #[serde(default)]
    pub seed: SeedConfig,

    /// Presentation layer
    #[serde(default)]
    pub web: WebConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Postgres `sslmode` appended to the URL when set (disable, require, verify-full, ...)
    #[serde(default)]
    pub ssl_mode: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Run pending migrations at startup
    #[serde(default = "default_enabled")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Bearer token required on write routes; writes are open when unset
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    /// Provider: prefix, deepl
    #[serde(default = "default_translation_provider")]
    pub provider: String,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// API key for the translation service
    pub api_key: Option<String>,

    /// Locale of the articles that drive propagation
    #[serde(default = "default_source_locale")]
    pub source_locale: String,

    /// Locales that receive a localization entry
    #[serde(default = "default_target_locales")]
    pub target_locales: Vec<String>,

    /// What to do when some locales fail
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Request timeout in seconds
    #[serde(default = "default_translation_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_translation_retries")]
    pub max_retries: u32,
}

/// Entry shape emitted by the content API
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    /// Fields at the top level of each entry
    #[default]
    Flat,
    /// Fields nested under an `attributes` envelope
    Attributes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub response_shape: ResponseShape,

    /// Page size when the request names none
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Upper bound for any requested page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedConfig {
    /// Reconcile therapy areas at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Therapy area names to guarantee
    #[serde(default = "default_therapy_areas")]
    pub therapy_areas: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    /// Port the presentation server listens on
    #[serde(default = "default_web_port")]
    pub port: u16,

    /// Base URL of the content API the presentation layer reads from
    #[serde(default = "default_content_api_url")]
    pub content_api_url: String,

    /// Origin prefixed to relative media URLs (falls back to content_api_url)
    pub public_base_url: Option<String>,

    /// Page data revalidation period in seconds
    #[serde(default = "default_revalidate")]
    pub revalidate_secs: u64,

    /// Maximum cached pages
    #[serde(default = "default_cache_entries")]
    pub cache_max_entries: usize,

    /// Image shown when an article has none
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,

    /// Articles shown on a section landing page
    #[serde(default = "default_section_articles")]
    pub section_articles: usize,

    /// Latest news items shown on a section landing page
    #[serde(default = "default_latest_news")]
    pub latest_news: usize,

    /// Headlines shown on the home page
    #[serde(default = "default_headlines")]
    pub headlines: usize,

    /// Timeout for content API calls in seconds
    #[serde(default = "default_request_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Therapy areas guaranteed to exist after bootstrap
pub const DEFAULT_THERAPY_AREAS: &[&str] = &[
    "cardiology",
    "dermatology",
    "haematology",
    "oncology",
    "immunology",
    "respiratory",
    "neurology",
    "inflammation",
    "rheumatology",
    "endocrinology",
    "general practitioner",
    "psychiatry",
    "gastroenterology",
    "gene therapy",
    "nephrology",
    "ophthalmology",
    "orthopaedics",
    "pathology and labs medicine",
    "urology",
];

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 1337 }
fn default_request_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/lsfeed".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_translation_provider() -> String { "prefix".to_string() }
fn default_source_locale() -> String { crate::SOURCE_LOCALE.to_string() }
fn default_target_locales() -> Vec<String> {
    vec!["pt-BR".to_string(), "es-ES".to_string(), "fr-FR".to_string()]
}
fn default_translation_timeout() -> u64 { 20 }
fn default_translation_retries() -> u32 { 3 }
fn default_page_size() -> u64 { 25 }
fn default_max_page_size() -> u64 { 100 }
fn default_therapy_areas() -> Vec<String> {
    DEFAULT_THERAPY_AREAS.iter().map(|s| s.to_string()).collect()
}
fn default_web_port() -> u16 { 3000 }
fn default_content_api_url() -> String { "http://localhost:1337".to_string() }
fn default_revalidate() -> u64 { 300 }
fn default_cache_entries() -> usize { 512 }
fn default_placeholder_image() -> String { "/placeholder.png".to_string() }
fn default_section_articles() -> usize { 10 }
fn default_latest_news() -> usize { 20 }
fn default_headlines() -> usize { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "lsfeed".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("translation.target_locales")
                    .with_list_parse_key("seed.therapy_areas")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl DatabaseConfig {
    /// Connection URL with the configured sslmode applied
    pub fn connection_url(&self) -> String {
        match self.ssl_mode.as_deref() {
            Some(mode) if !self.url.contains("sslmode=") => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}sslmode={}", self.url, sep, mode)
            }
            _ => self.url.clone(),
        }
    }
}

impl WebConfig {
    /// Origin used to absolutize relative media URLs
    pub fn media_origin(&self) -> &str {
        self.public_base_url.as_deref().unwrap_or(&self.content_api_url)
    }

    pub fn revalidate(&self) -> Duration {
        Duration::from_secs(self.revalidate_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            ssl_mode: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            run_migrations: default_enabled(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: default_translation_provider(),
            api_base: None,
            api_key: None,
            source_locale: default_source_locale(),
            target_locales: default_target_locales(),
            failure_policy: FailurePolicy::default(),
            timeout_secs: default_translation_timeout(),
            max_retries: default_translation_retries(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            response_shape: ResponseShape::default(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            therapy_areas: default_therapy_areas(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            content_api_url: default_content_api_url(),
            public_base_url: None,
            revalidate_secs: default_revalidate(),
            cache_max_entries: default_cache_entries(),
            placeholder_image: default_placeholder_image(),
            section_articles: default_section_articles(),
            latest_news: default_latest_news(),
            headlines: default_headlines(),
            fetch_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}
