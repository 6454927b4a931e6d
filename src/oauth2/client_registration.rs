// ABOUTME: Dynamic client registration (RFC 7591 subset)
// ABOUTME: Issues client credentials and resolves client IDs for the flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::claims::SUPPORTED_SCOPES;
use crate::models::{Client, ClientAuthMethod, Verification};
use crate::oauth2::models::{ClientRegistrationRequest, ClientRegistrationResponse, OAuth2Error};
use crate::oauth2::random_urlsafe;
use crate::storage::Storage;

/// Manages registered clients and resolves client IDs presented by
/// relying parties.
pub struct ClientRegistry {
    storage: Arc<Storage>,
    require_registration: bool,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(storage: Arc<Storage>, require_registration: bool) -> Self {
        Self {
            storage,
            require_registration,
        }
    }

    /// Register a new client and issue credentials for it.
    ///
    /// # Errors
    /// Returns `invalid_request` when no redirect URI is supplied.
    pub fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> Result<ClientRegistrationResponse, OAuth2Error> {
        if request.redirect_uris.is_empty() {
            return Err(OAuth2Error::invalid_request(
                "At least one redirect URI is required",
            ));
        }

        let auth_method = request
            .token_endpoint_auth_method
            .unwrap_or(ClientAuthMethod::ClientSecretBasic);
        let client_id = Uuid::new_v4().to_string();
        let client_secret = random_urlsafe(32);

        self.storage.store_client(Client {
            id: client_id.clone(),
            secret: Verification::Exact(client_secret.clone()),
            redirect_uris: Verification::Exact(request.redirect_uris.clone()),
            allowed_scopes: Verification::Exact(
                SUPPORTED_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            ),
            auth_method: Verification::Exact(auth_method),
        });

        info!(client_id = %client_id, "registered OAuth2 client");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret,
            redirect_uris: request.redirect_uris,
            token_endpoint_auth_method: auth_method,
            grant_types: vec!["authorization_code".to_owned(), "refresh_token".to_owned()],
            response_types: vec!["code".to_owned()],
        })
    }

    /// Resolve a presented client ID.
    ///
    /// In registration-optional mode an unknown ID yields a synthesized
    /// client that passes every check. With registration required,
    /// unknown IDs resolve to `None`.
    #[must_use]
    pub fn resolve(&self, client_id: &str) -> Option<Client> {
        match self.storage.get_client(client_id) {
            Some(client) => Some(client),
            None if self.require_registration => None,
            None => Some(Client::permissive(client_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(require_registration: bool) -> ClientRegistry {
        ClientRegistry::new(Arc::new(Storage::new()), require_registration)
    }

    #[test]
    fn registration_issues_unique_credentials() {
        let registry = registry(true);
        let request = ClientRegistrationRequest {
            redirect_uris: vec!["https://rp.example/cb".to_owned()],
            token_endpoint_auth_method: None,
        };

        let first = registry.register(request.clone()).expect("register");
        let second = registry.register(request).expect("register");

        assert_ne!(first.client_id, second.client_id);
        assert_ne!(first.client_secret, second.client_secret);
        assert_eq!(
            first.token_endpoint_auth_method,
            ClientAuthMethod::ClientSecretBasic
        );
    }

    #[test]
    fn registration_without_redirect_uris_is_rejected() {
        let registry = registry(true);
        let error = registry
            .register(ClientRegistrationRequest {
                redirect_uris: vec![],
                token_endpoint_auth_method: None,
            })
            .expect_err("must fail");
        assert_eq!(error.error, "invalid_request");
    }

    #[test]
    fn registered_client_verifies_its_secret() {
        let registry = registry(true);
        let response = registry
            .register(ClientRegistrationRequest {
                redirect_uris: vec!["https://rp.example/cb".to_owned()],
                token_endpoint_auth_method: Some(ClientAuthMethod::ClientSecretPost),
            })
            .expect("register");

        let client = registry.resolve(&response.client_id).expect("resolved");
        assert!(client.check_secret(Some(&response.client_secret)));
        assert!(!client.check_secret(Some("wrong")));
        assert!(client.check_auth_method(ClientAuthMethod::ClientSecretPost));
        assert!(!client.check_auth_method(ClientAuthMethod::ClientSecretBasic));
    }

    #[test]
    fn unknown_client_is_synthesized_when_registration_is_optional() {
        let registry = registry(false);
        let client = registry.resolve("anything").expect("synthesized");
        assert!(client.secret.is_skipped());
    }

    #[test]
    fn unknown_client_is_rejected_when_registration_is_required() {
        let registry = registry(true);
        assert!(registry.resolve("anything").is_none());
    }
}
