// ABOUTME: Wire types for the OAuth2 endpoints
// ABOUTME: Request/response payloads and the RFC 6749 error envelope
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::models::{Client, ClientAuthMethod};

/// Query parameters of the authorization endpoint.
///
/// Everything is optional at the deserialization layer; presence checks
/// happen in the flow so that each omission produces its own error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeParams {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
}

/// An authorization request that passed validation.
///
/// Holds everything the consent form needs to render and the approval
/// handler needs to mint a code.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub client: Client,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
    pub nonce: Option<String>,
}

/// Form body of the token endpoint (RFC 6749 sections 4.1.3 and 6)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Successful token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Client registration request (RFC 7591 subset)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<ClientAuthMethod>,
}

/// Client registration response (RFC 7591 section 3.2.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
    pub token_endpoint_auth_method: ClientAuthMethod,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
}

/// RFC 6749 error envelope returned by the token and registration endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    #[must_use]
    pub fn new(error: &str, description: &str) -> Self {
        Self {
            error: error.to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", description)
    }

    #[must_use]
    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", description)
    }

    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", description)
    }

    #[must_use]
    pub fn unsupported_grant_type(description: &str) -> Self {
        Self::new("unsupported_grant_type", description)
    }

    #[must_use]
    pub fn access_denied(description: &str) -> Self {
        Self::new("access_denied", description)
    }

    #[must_use]
    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", description)
    }

    fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}
