// ABOUTME: Mock OpenID Connect / OAuth2 identity provider for testing relying parties
// ABOUTME: In-memory, single-instance, intentionally permissive by default
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A mock OpenID Connect provider for exercising relying-party
//! applications in tests and local development.
//!
//! The server implements the authorization code grant with signed RS256
//! ID tokens, a bearer-protected userinfo endpoint, discovery, JWKS, and
//! dynamic client registration. All state lives in process memory.
//!
//! By default any client ID, secret, and redirect URI are accepted so a
//! relying party works against the server with zero setup. Strictness is
//! opt-in through [`config::ServerConfig`].
//!
//! ```no_run
//! use oidc_provider_mock::config::ServerConfig;
//! use oidc_provider_mock::server::MockServer;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = MockServer::spawn(ServerConfig::default()).await?;
//! let discovery_url = format!("{}/.well-known/openid-configuration", server.issuer());
//! # Ok(())
//! # }
//! ```

pub mod claims;
pub mod config;
pub mod jwks;
pub mod middleware;
pub mod models;
pub mod oauth2;
pub mod routes;
pub mod server;
pub mod storage;

pub use config::ServerConfig;
pub use server::MockServer;
