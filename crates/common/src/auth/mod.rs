//! Admin authentication for write routes
//!
//! Writes require `Authorization: Bearer <token>` when an admin token is
//! configured. Only the SHA-256 digest of the token is kept in memory and
//! presented tokens are compared digest to digest.

use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hex SHA-256 digest of a token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Token from a `Bearer` Authorization header
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Checks presented tokens against the configured admin token
#[derive(Debug, Clone, Default)]
pub struct AdminGuard {
    token_hash: Option<String>,
}

impl AdminGuard {
    /// `None` leaves write routes open
    pub fn new(admin_token: Option<&str>) -> Self {
        Self {
            token_hash: admin_token.filter(|t| !t.is_empty()).map(hash_token),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token_hash.is_some()
    }

    /// Verify the raw Authorization header value
    pub fn verify(&self, auth_header: Option<&str>) -> Result<()> {
        let Some(expected) = &self.token_hash else {
            return Ok(());
        };

        let header = auth_header.ok_or_else(|| AppError::Unauthorized {
            message: "Missing Authorization header".to_string(),
        })?;
        let token = extract_bearer(header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a Bearer token".to_string(),
        })?;

        if hash_token(token) == *expected {
            Ok(())
        } else {
            Err(AppError::InvalidApiKey)
        }
    }
}

/// Marker extractor for handlers that mutate content
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl<S> FromRequestParts<S> for AdminAuth
where
    Arc<AdminGuard>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let guard = Arc::<AdminGuard>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        guard.verify(header)?;
        Ok(AdminAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token() {
        let hash = hash_token("secret");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret"));
        assert_ne!(hash, hash_token("Secret"));
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("abc"), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_guard() {
        let open = AdminGuard::new(None);
        assert!(!open.is_enabled());
        assert!(open.verify(None).is_ok());

        let guard = AdminGuard::new(Some("s3cret"));
        assert!(guard.verify(Some("Bearer s3cret")).is_ok());
        assert!(matches!(guard.verify(None), Err(AppError::Unauthorized { .. })));
        assert!(matches!(
            guard.verify(Some("Bearer nope")),
            Err(AppError::InvalidApiKey)
        ));

        // empty configured token means no auth
        assert!(!AdminGuard::new(Some("")).is_enabled());
    }
}
