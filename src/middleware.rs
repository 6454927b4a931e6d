// ABOUTME: Bearer token guard for protected resource endpoints (RFC 6750)
// ABOUTME: Resolves the Authorization header to a live access token
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;
use tracing::warn;

use crate::models::AccessToken;
use crate::storage::Storage;

/// Rejection from the bearer token guard.
///
/// Every variant is reported as 401 with a `WWW-Authenticate: Bearer`
/// challenge so that relying parties exercise a single failure path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BearerError {
    #[error("Missing 'Authorization' header")]
    MissingAuthorization,
    #[error("Authorization scheme must be Bearer")]
    UnsupportedTokenType,
    #[error("Access token is unknown, expired, or revoked")]
    AccessDenied,
}

impl BearerError {
    /// Error code reported in the response body; each failure mode is
    /// distinguishable on the wire.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingAuthorization => "missing_authorization",
            Self::UnsupportedTokenType => "unsupported_token_type",
            Self::AccessDenied => "access_denied",
        }
    }
}

impl IntoResponse for BearerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code(),
            "error_description": self.to_string(),
        });
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Bearer")],
            Json(body),
        )
            .into_response()
    }
}

/// Guards resource endpoints behind a bearer access token.
pub struct ResourceGuard<'a> {
    storage: &'a Storage,
}

impl<'a> ResourceGuard<'a> {
    #[must_use]
    pub const fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Resolve the request's bearer token to a stored, unexpired access
    /// token.
    ///
    /// # Errors
    /// Returns a [`BearerError`] when the header is missing, uses a
    /// non-Bearer scheme, or names a token the server does not accept.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AccessToken, BearerError> {
        let header = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(BearerError::MissingAuthorization)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(BearerError::UnsupportedTokenType)?;

        self.storage.get_access_token(token).ok_or_else(|| {
            warn!("bearer token rejected");
            BearerError::AccessDenied
        })
    }
}
