// ABOUTME: Core data model for the mock identity provider
// ABOUTME: Clients, users, authorization codes, and bearer credentials held in Storage
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Verification policy for a client attribute.
///
/// Registered clients carry exact values that are checked on every use.
/// Clients synthesized in registration-optional mode skip verification
/// entirely so that arbitrary credentials work out of the box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification<T> {
    /// The attribute must match this value exactly.
    Exact(T),
    /// Any presented value is accepted.
    SkipVerification,
}

impl<T> Verification<T> {
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::SkipVerification)
    }
}

/// Token endpoint client authentication methods (RFC 6749 section 2.3.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// Secret sent in the `Authorization: Basic` header
    ClientSecretBasic,
    /// Secret sent in the form-encoded request body
    ClientSecretPost,
}

impl ClientAuthMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

/// A relying party known to the server.
///
/// Immutable once stored; never deleted.
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier
    pub id: String,
    /// Client secret, or skipped for synthesized clients
    pub secret: Verification<String>,
    /// Redirect URIs accepted at the authorization endpoint
    pub redirect_uris: Verification<Vec<String>>,
    /// Scopes the client may be granted
    pub allowed_scopes: Verification<Vec<String>>,
    /// Required token endpoint authentication method
    pub auth_method: Verification<ClientAuthMethod>,
}

impl Client {
    /// Synthesize a client that passes every verification check. Used in
    /// registration-optional mode and never persisted.
    #[must_use]
    pub fn permissive(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            secret: Verification::SkipVerification,
            redirect_uris: Verification::SkipVerification,
            allowed_scopes: Verification::SkipVerification,
            auth_method: Verification::SkipVerification,
        }
    }

    #[must_use]
    pub fn check_redirect_uri(&self, redirect_uri: &str) -> bool {
        match &self.redirect_uris {
            Verification::SkipVerification => true,
            Verification::Exact(uris) => uris.iter().any(|uri| uri == redirect_uri),
        }
    }

    #[must_use]
    pub fn check_secret(&self, secret: Option<&str>) -> bool {
        match &self.secret {
            Verification::SkipVerification => true,
            Verification::Exact(expected) => secret == Some(expected.as_str()),
        }
    }

    #[must_use]
    pub fn check_auth_method(&self, method: ClientAuthMethod) -> bool {
        match &self.auth_method {
            Verification::SkipVerification => true,
            Verification::Exact(expected) => *expected == method,
        }
    }

    /// Reduce a requested scope to the subset this client may be granted.
    #[must_use]
    pub fn allowed_scope(&self, requested: &str) -> String {
        match &self.allowed_scopes {
            Verification::SkipVerification => requested.to_owned(),
            Verification::Exact(allowed) => requested
                .split_whitespace()
                .filter(|scope| allowed.iter().any(|a| a == scope))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// An authenticated subject.
///
/// Created implicitly the first time a subject appears at the consent form,
/// or explicitly via `PUT /users/{sub}`. Repeat writes overwrite the whole
/// record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    /// Stable subject identifier, primary key
    pub sub: String,
    /// Claims disclosed through the scope filter
    pub claims: HashMap<String, Value>,
    /// Free-form additional userinfo data, returned unfiltered
    pub userinfo: HashMap<String, Value>,
}

impl User {
    /// User created on the fly during consent. Subjects are usually email
    /// addresses in test setups, so an `email` claim defaults to the subject.
    #[must_use]
    pub fn implicit(sub: &str) -> Self {
        let mut claims = HashMap::new();
        claims.insert("email".to_owned(), Value::String(sub.to_owned()));
        Self {
            sub: sub.to_owned(),
            claims,
            userinfo: HashMap::new(),
        }
    }
}

/// Single-use proof of user consent, exchanged for tokens.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    /// Unguessable code value
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI used at issuance; redemption must match byte-for-byte
    pub redirect_uri: String,
    /// Subject that granted consent
    pub sub: String,
    /// Granted scope, space-delimited
    pub scope: String,
    /// OIDC nonce supplied at authorization time
    pub nonce: Option<String>,
    /// Defensive expiry; tests assume short-lived use
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCode {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Bearer credential for resource access.
///
/// Never deleted on expiry; lookups must check `expires_at` instead of
/// assuming absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Unguessable token value
    pub token: String,
    /// Subject the token acts for
    pub sub: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scope, space-delimited
    pub scope: String,
    /// Absolute expiry, UTC
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Long-lived credential that mints a fresh token set.
///
/// Carries the access token issued with the same grant so that a refresh
/// invalidates it.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    /// Unguessable token value
    pub token: String,
    /// Subject of the original grant
    pub sub: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scope, space-delimited
    pub scope: String,
    /// Access token currently tied to this grant
    pub access_token: String,
    /// Absolute expiry, UTC
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
