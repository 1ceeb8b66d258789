//! Metrics and observability utilities
//!
//! Prometheus metrics behind the `metrics` facade. Every name carries the
//! `lsfeed` prefix.

use crate::errors::{AppError, Result};
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Instant;

/// Metrics prefix for all Life Science Feed metrics
pub const METRICS_PREFIX: &str = "lsfeed";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for translation and upstream fetches (slower, network bound)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.000, 5.000, 10.00, 30.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );
    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_translations_total", METRICS_PREFIX),
        Unit::Count,
        "Locale translations attempted, by outcome"
    );
    describe_histogram!(
        format!("{}_translation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Time to translate one article into one locale"
    );

    describe_counter!(
        format!("{}_article_writes_total", METRICS_PREFIX),
        Unit::Count,
        "Article creates, updates and deletes"
    );

    describe_counter!(
        format!("{}_seeded_terms_total", METRICS_PREFIX),
        Unit::Count,
        "Therapy areas handled by the startup seeder"
    );

    describe_counter!(
        format!("{}_content_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "Requests made to the content API"
    );
    describe_histogram!(
        format!("{}_content_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Content API request latency in seconds"
    );

    describe_counter!(
        format!("{}_page_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Page data served from cache"
    );
    describe_counter!(
        format!("{}_page_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Page data rebuilt"
    );

    tracing::info!("Metrics registered");
}

/// Serve `/metrics` on the given port; 0 leaves the exporter off
pub fn install_exporter(port: u16) -> Result<()> {
    if port == 0 {
        return Ok(());
    }

    let exporter_error = |e: metrics_exporter_prometheus::BuildError| AppError::Configuration {
        message: format!("Prometheus exporter: {}", e),
    };

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )
        .map_err(exporter_error)?
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".to_string()),
            UPSTREAM_BUCKETS,
        )
        .map_err(exporter_error)?
        .install()
        .map_err(exporter_error)?;

    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Middleware recording count and latency per route template
pub async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestMetrics::start(request.method().as_str(), &endpoint);

    let response = next.run(request).await;
    timer.finish(response.status().as_u16());
    response
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// One article translated into one locale
pub fn record_translation(duration_secs: f64, provider: &str, locale: &str, success: bool) {
    counter!(
        format!("{}_translations_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "locale" => locale.to_string(),
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_translation_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

pub fn record_article_write(operation: &'static str) {
    counter!(
        format!("{}_article_writes_total", METRICS_PREFIX),
        "operation" => operation
    )
    .increment(1);
}

pub fn record_seed(created: usize, existing: usize) {
    counter!(
        format!("{}_seeded_terms_total", METRICS_PREFIX),
        "result" => "created"
    )
    .increment(created as u64);
    counter!(
        format!("{}_seeded_terms_total", METRICS_PREFIX),
        "result" => "existing"
    )
    .increment(existing as u64);
}

pub fn record_content_fetch(duration_secs: f64, resource: &str, success: bool) {
    counter!(
        format!("{}_content_fetches_total", METRICS_PREFIX),
        "resource" => resource.to_string(),
        "status" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_content_fetch_duration_seconds", METRICS_PREFIX),
        "resource" => resource.to_string()
    )
    .record(duration_secs);
}

/// Helper to record page cache lookups
pub fn record_page_cache(hit: bool, page: &str) {
    let name = if hit {
        format!("{}_page_cache_hits_total", METRICS_PREFIX)
    } else {
        format!("{}_page_cache_misses_total", METRICS_PREFIX)
    };
    counter!(name, "page" => page.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, UPSTREAM_BUCKETS] {
            assert!(buckets.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // no recorder installed; calls must be no-ops
        let metrics = RequestMetrics::start("GET", "/api/articles");
        metrics.finish(200);
        record_translation(0.01, "prefix", "fr-FR", true);
        record_seed(2, 17);
        record_page_cache(false, "home");
    }
}
