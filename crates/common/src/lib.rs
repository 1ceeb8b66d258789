//! Life Science Feed Common Library
//!
//! Shared code for the content store and the presentation layer:
//! - Configuration, errors, metrics and admin auth
//! - Content store trait with PostgreSQL and in-memory backends
//! - Article translation lifecycle and the therapy-area seeder
//! - Content API client and response normalization

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod feed;
pub mod lifecycle;
pub mod metrics;
pub mod seed;
pub mod slug;
pub mod store;
pub mod translation;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use lifecycle::{ArticleLifecycle, ArticleService};
pub use store::{ContentStore, MemoryStore, TaxonomyKind};
pub use translation::Translator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Locale articles are written in and translated from
pub const SOURCE_LOCALE: &str = "en";
