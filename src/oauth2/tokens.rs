// ABOUTME: Token endpoint implementation (RFC 6749 sections 4.1.3 and 6)
// ABOUTME: Client authentication, code redemption, refresh rotation, ID token signing
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::jwks::SigningKey;
use crate::models::{AccessToken, Client, ClientAuthMethod, RefreshToken};
use crate::oauth2::client_registration::ClientRegistry;
use crate::oauth2::models::{OAuth2Error, TokenRequest, TokenResponse};
use crate::oauth2::random_urlsafe;
use crate::storage::Storage;

/// Refresh tokens outlive access tokens by a wide margin.
const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Claims of a signed ID token (OIDC Core section 2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// User claims disclosed for the granted scope
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Client credentials extracted from a token endpoint request.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub auth_method: ClientAuthMethod,
}

impl ClientCredentials {
    /// Extract credentials from the `Authorization` header or, failing
    /// that, from the form body.
    ///
    /// # Errors
    /// Returns `invalid_client` when no client ID is presented and
    /// `invalid_request` for a malformed Basic header.
    pub fn from_request(
        authorization: Option<&str>,
        body: &TokenRequest,
    ) -> Result<Self, OAuth2Error> {
        if let Some(header) = authorization {
            let Some(encoded) = header.strip_prefix("Basic ") else {
                return Err(OAuth2Error::invalid_request(
                    "Unsupported authorization scheme",
                ));
            };
            let decoded = STANDARD
                .decode(encoded.trim())
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| {
                    OAuth2Error::invalid_request("Malformed Basic authorization header")
                })?;
            let (client_id, client_secret) = decoded.split_once(':').ok_or_else(|| {
                OAuth2Error::invalid_request("Malformed Basic authorization header")
            })?;
            return Ok(Self {
                client_id: client_id.to_owned(),
                client_secret: Some(client_secret.to_owned()),
                auth_method: ClientAuthMethod::ClientSecretBasic,
            });
        }

        let Some(client_id) = body.client_id.as_deref().filter(|id| !id.is_empty()) else {
            return Err(OAuth2Error::invalid_client("Missing client credentials"));
        };
        Ok(Self {
            client_id: client_id.to_owned(),
            client_secret: body.client_secret.clone(),
            auth_method: ClientAuthMethod::ClientSecretPost,
        })
    }
}

/// Handles the token endpoint: authenticates clients, redeems codes and
/// refresh tokens, and signs ID tokens.
pub struct TokenIssuer {
    storage: Arc<Storage>,
    registry: ClientRegistry,
    config: ServerConfig,
    key: Arc<SigningKey>,
    issuer: String,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        storage: Arc<Storage>,
        config: ServerConfig,
        key: Arc<SigningKey>,
        issuer: String,
    ) -> Self {
        let registry = ClientRegistry::new(
            Arc::clone(&storage),
            config.require_client_registration,
        );
        Self {
            storage,
            registry,
            config,
            key,
            issuer,
        }
    }

    /// Process a token endpoint request end to end.
    ///
    /// # Errors
    /// Returns an RFC 6749 error envelope for authentication failures,
    /// invalid grants, and unsupported grant types.
    pub fn token(
        &self,
        authorization: Option<&str>,
        body: &TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let credentials = ClientCredentials::from_request(authorization, body)?;
        let client = self.authenticate_client(&credentials)?;

        match body.grant_type.as_deref() {
            Some("authorization_code") => self.redeem_code(&client, body),
            Some("refresh_token") => self.redeem_refresh_token(&client, body),
            None => Err(OAuth2Error::invalid_request("Missing 'grant_type' parameter")),
            Some(other) => {
                warn!(grant_type = %other, "unsupported grant type");
                Err(OAuth2Error::unsupported_grant_type(
                    "Only 'authorization_code' and 'refresh_token' are supported",
                ))
            }
        }
    }

    fn authenticate_client(&self, credentials: &ClientCredentials) -> Result<Client, OAuth2Error> {
        let Some(client) = self.registry.resolve(&credentials.client_id) else {
            warn!(client_id = %credentials.client_id, "token request for unknown client");
            return Err(OAuth2Error::invalid_client(
                "The client does not exist on this server",
            ));
        };

        if !client.check_auth_method(credentials.auth_method) {
            warn!(
                client_id = %credentials.client_id,
                presented = credentials.auth_method.as_str(),
                "client used wrong authentication method"
            );
            return Err(OAuth2Error::invalid_client(
                "Client used an unsupported authentication method",
            ));
        }

        if !client.check_secret(credentials.client_secret.as_deref()) {
            warn!(client_id = %credentials.client_id, "client presented invalid secret");
            return Err(OAuth2Error::invalid_client("Invalid client secret"));
        }

        Ok(client)
    }

    fn redeem_code(
        &self,
        client: &Client,
        body: &TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let Some(code_value) = body.code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(OAuth2Error::invalid_request("Missing 'code' parameter"));
        };

        // The code is consumed even if validation fails below; a stolen
        // code must not be redeemable on a second, corrected attempt.
        let Some(code) = self.storage.take_authorization_code(code_value) else {
            warn!(client_id = %client.id, "unknown or already used authorization code");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code is invalid or expired",
            ));
        };

        if code.client_id != client.id {
            warn!(client_id = %client.id, "authorization code issued to a different client");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code is invalid or expired",
            ));
        }

        if body.redirect_uri.as_deref() != Some(code.redirect_uri.as_str()) {
            warn!(client_id = %client.id, "redirect_uri does not match authorization request");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code is invalid or expired",
            ));
        }

        if code.is_expired() {
            warn!(client_id = %client.id, "authorization code expired");
            return Err(OAuth2Error::invalid_grant(
                "Authorization code is invalid or expired",
            ));
        }

        info!(client_id = %client.id, sub = %code.sub, "authorization code redeemed");
        self.issue_tokens(&code.sub, &client.id, &code.scope, code.nonce.as_deref())
    }

    fn redeem_refresh_token(
        &self,
        client: &Client,
        body: &TokenRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let Some(token_value) = body.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(OAuth2Error::invalid_request(
                "Missing 'refresh_token' parameter",
            ));
        };

        // Rotation: the token is consumed atomically, and the access token
        // issued with the same grant is revoked.
        let Some(refresh) = self.storage.take_refresh_token(token_value) else {
            warn!(client_id = %client.id, "unknown or already used refresh token");
            return Err(OAuth2Error::invalid_grant(
                "Refresh token is invalid or expired",
            ));
        };

        if refresh.client_id != client.id || refresh.is_expired() {
            warn!(client_id = %client.id, "refresh token rejected");
            return Err(OAuth2Error::invalid_grant(
                "Refresh token is invalid or expired",
            ));
        }

        self.storage.remove_access_token(&refresh.access_token);

        info!(client_id = %client.id, sub = %refresh.sub, "refresh token rotated");
        self.issue_tokens(&refresh.sub, &client.id, &refresh.scope, None)
    }

    fn issue_tokens(
        &self,
        sub: &str,
        client_id: &str,
        scope: &str,
        nonce: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let now = Utc::now();
        let expires_at = now + self.config.access_token_max_age;

        let access_token = random_urlsafe(32);
        self.storage.store_access_token(AccessToken {
            token: access_token.clone(),
            sub: sub.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            expires_at,
        });

        let refresh_token = if self.config.issue_refresh_token {
            let token = random_urlsafe(32);
            self.storage.store_refresh_token(RefreshToken {
                token: token.clone(),
                sub: sub.to_owned(),
                client_id: client_id.to_owned(),
                scope: scope.to_owned(),
                access_token: access_token.clone(),
                expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            });
            Some(token)
        } else {
            None
        };

        let id_token = if scope.split_whitespace().any(|s| s == "openid") {
            Some(self.sign_id_token(
                sub,
                client_id,
                scope,
                now.timestamp(),
                expires_at.timestamp(),
                nonce,
            )?)
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.config.access_token_max_age.num_seconds(),
            scope: scope.to_owned(),
            refresh_token,
            id_token,
        })
    }

    fn sign_id_token(
        &self,
        sub: &str,
        client_id: &str,
        scope: &str,
        iat: i64,
        exp: i64,
        nonce: Option<&str>,
    ) -> Result<String, OAuth2Error> {
        // Scope-disclosed user claims ride along in the ID token, minus
        // anything that would collide with a registered claim name.
        let mut extra = self
            .storage
            .get_user(sub)
            .map(|user| crate::claims::disclose(sub, &user.claims, scope))
            .unwrap_or_default();
        for registered in ["iss", "sub", "aud", "iat", "exp", "nonce"] {
            extra.remove(registered);
        }

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: sub.to_owned(),
            aud: client_id.to_owned(),
            iat,
            exp,
            nonce: nonce.map(ToOwned::to_owned),
            extra,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.kid().to_owned());

        encode(&header, &claims, self.key.encoding_key()).map_err(|e| {
            error!(error = %e, "failed to sign ID token");
            OAuth2Error::server_error("Failed to sign ID token")
        })
    }
}
