// ABOUTME: Authorization endpoint flow (RFC 6749 section 4.1, OIDC Core section 3.1.2)
// ABOUTME: Request validation, consent handling, and code issuance
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::models::{AuthorizationCode, User};
use crate::oauth2::client_registration::ClientRegistry;
use crate::oauth2::models::{AuthorizeParams, ValidatedRequest};
use crate::oauth2::random_urlsafe;
use crate::storage::Storage;

/// Authorization codes expire quickly; a relying party under test redeems
/// them immediately.
const CODE_TTL_MINUTES: i64 = 10;

/// Scope assumed when the authorization request omits `scope`.
const DEFAULT_SCOPE: &str = "openid";

/// A failed authorization request.
///
/// Errors discovered before the redirect URI is validated must not be
/// relayed to an unverified target and render as a local error page.
/// Later errors are delivered to the client with a 302 redirect, as
/// RFC 6749 section 4.1.2.1 requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeError {
    /// Rendered locally; the redirect target is missing or untrusted.
    Page { error: String, message: String },
    /// Relayed to the validated redirect URI.
    Redirect {
        redirect_uri: String,
        error: String,
        description: Option<String>,
        state: Option<String>,
    },
}

impl AuthorizeError {
    fn page(error: &str, message: impl Into<String>) -> Self {
        Self::Page {
            error: error.to_owned(),
            message: message.into(),
        }
    }
}

/// Append query parameters to a URL, keeping any existing query intact.
#[must_use]
pub fn append_query(url: &str, params: &[(&str, &str)]) -> String {
    let mut result = url.to_owned();
    let mut separator = if url.contains('?') { '&' } else { '?' };
    for (name, value) in params {
        result.push(separator);
        result.push_str(name);
        result.push('=');
        result.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    result
}

/// Drives the authorization endpoint: validates incoming requests and
/// turns consent decisions into redirects.
pub struct AuthorizationFlow {
    storage: Arc<Storage>,
    registry: ClientRegistry,
    config: ServerConfig,
}

impl AuthorizationFlow {
    #[must_use]
    pub fn new(storage: Arc<Storage>, config: ServerConfig) -> Self {
        let registry = ClientRegistry::new(
            Arc::clone(&storage),
            config.require_client_registration,
        );
        Self {
            storage,
            registry,
            config,
        }
    }

    /// Validate an authorization request.
    ///
    /// Checks are ordered so that the redirect URI is trusted before any
    /// error is relayed through it.
    ///
    /// # Errors
    /// Returns an [`AuthorizeError`] describing where the request failed
    /// and how the error must be delivered.
    pub fn validate(&self, params: &AuthorizeParams) -> Result<ValidatedRequest, AuthorizeError> {
        let Some(client_id) = params.client_id.as_deref().filter(|id| !id.is_empty()) else {
            warn!("authorization request without client_id");
            return Err(AuthorizeError::page(
                "invalid_client",
                "Missing 'client_id' parameter",
            ));
        };

        let Some(client) = self.registry.resolve(client_id) else {
            warn!(client_id = %client_id, "authorization request for unknown client");
            return Err(AuthorizeError::page(
                "invalid_client",
                "The client does not exist on this server",
            ));
        };

        let Some(redirect_uri) = params.redirect_uri.as_deref().filter(|uri| !uri.is_empty())
        else {
            return Err(AuthorizeError::page(
                "invalid_request",
                "Missing 'redirect_uri' in request.",
            ));
        };

        if !client.check_redirect_uri(redirect_uri) {
            warn!(client_id = %client_id, redirect_uri = %redirect_uri, "redirect URI not registered");
            return Err(AuthorizeError::page(
                "invalid_request",
                format!("Redirect URI {redirect_uri} is not supported by client."),
            ));
        }

        let redirect_error = |error: &str, description: &str| AuthorizeError::Redirect {
            redirect_uri: redirect_uri.to_owned(),
            error: error.to_owned(),
            description: Some(description.to_owned()),
            state: params.state.clone(),
        };

        if params.response_type.as_deref() != Some("code") {
            warn!(
                response_type = params.response_type.as_deref().unwrap_or(""),
                "unsupported response_type"
            );
            return Err(redirect_error(
                "unsupported_response_type",
                "Only the 'code' response type is supported",
            ));
        }

        let requested = params.scope.as_deref().unwrap_or(DEFAULT_SCOPE);
        let openid = requested.split_whitespace().any(|s| s == "openid");

        // Nonces belong to OIDC; plain OAuth2 requests are exempt.
        if openid {
            match params.nonce.as_deref() {
                None | Some("") if self.config.require_nonce => {
                    return Err(redirect_error(
                        "invalid_request",
                        "Missing \"nonce\" in request",
                    ));
                }
                // A presented nonce must be fresh even when none is
                // required.
                Some(nonce) if !nonce.is_empty() && self.storage.nonce_seen(nonce) => {
                    warn!("nonce replayed in authorization request");
                    return Err(redirect_error(
                        "invalid_request",
                        "Nonce has already been used",
                    ));
                }
                _ => {}
            }
        }

        let scope = client.allowed_scope(requested);

        Ok(ValidatedRequest {
            client,
            redirect_uri: redirect_uri.to_owned(),
            scope,
            state: params.state.clone(),
            nonce: params.nonce.clone().filter(|n| !n.is_empty()),
        })
    }

    /// Record consent for `sub` and build the success redirect.
    ///
    /// Unknown subjects are created on the fly. The nonce, if any, is
    /// marked as used so a later request cannot replay it.
    #[must_use]
    pub fn approve(&self, request: &ValidatedRequest, sub: &str) -> String {
        if self.storage.get_user(sub).is_none() {
            self.storage.store_user(User::implicit(sub));
        }

        if let Some(nonce) = &request.nonce {
            self.storage.record_nonce(nonce);
        }

        let code = random_urlsafe(32);
        self.storage.store_authorization_code(AuthorizationCode {
            code: code.clone(),
            client_id: request.client.id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            sub: sub.to_owned(),
            scope: request.scope.clone(),
            nonce: request.nonce.clone(),
            expires_at: Utc::now() + Duration::minutes(CODE_TTL_MINUTES),
        });

        info!(client_id = %request.client.id, sub = %sub, "authorization granted");

        let mut params = vec![("code", code.as_str())];
        if let Some(state) = &request.state {
            params.push(("state", state.as_str()));
        }
        append_query(&request.redirect_uri, &params)
    }

    /// Build the redirect for a denied consent form.
    #[must_use]
    pub fn deny(&self, request: &ValidatedRequest) -> String {
        info!(client_id = %request.client.id, "authorization denied by user");

        let mut params = vec![("error", "access_denied")];
        if let Some(state) = &request.state {
            params.push(("state", state.as_str()));
        }
        append_query(&request.redirect_uri, &params)
    }
}
