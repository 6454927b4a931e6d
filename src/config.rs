// ABOUTME: Server configuration for the mock identity provider
// ABOUTME: Behavior toggles consumed by the authorization flow and token issuer
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::Duration;

/// Behavior configuration, fixed for the lifetime of a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Issuer URL placed in ID tokens and the discovery document. When
    /// `None` the issuer is derived from the bound socket address.
    pub issuer: Option<String>,
    /// Reject unregistered client IDs at the authorization and token
    /// endpoints instead of accepting arbitrary credentials.
    pub require_client_registration: bool,
    /// Reject authorization requests that omit the `nonce` parameter or
    /// reuse a previously seen one.
    pub require_nonce: bool,
    /// Include a refresh token in token responses.
    pub issue_refresh_token: bool,
    /// Lifetime of issued access tokens; also reported as `expires_in`.
    pub access_token_max_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            require_client_registration: false,
            require_nonce: false,
            issue_refresh_token: true,
            access_token_max_age: Duration::hours(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let config = ServerConfig::default();
        assert!(config.issuer.is_none());
        assert!(!config.require_client_registration);
        assert!(!config.require_nonce);
        assert!(config.issue_refresh_token);
        assert_eq!(config.access_token_max_age, Duration::hours(1));
    }
}
