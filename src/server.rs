// ABOUTME: Server construction and lifecycle
// ABOUTME: Builds the router, binds a listener, and runs the accept loop
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::jwks::SigningKey;
use crate::routes::{router, AppState};
use crate::storage::Storage;

/// Build the application state and router for a known issuer URL.
///
/// # Errors
/// Fails when RSA key generation fails.
pub fn build_app(config: ServerConfig, issuer: String) -> Result<(axum::Router, AppState)> {
    let state = AppState {
        config,
        issuer,
        storage: Arc::new(Storage::new()),
        key: Arc::new(SigningKey::generate().context("failed to generate signing key")?),
    };
    Ok((router(state.clone()), state))
}

/// A provider instance running on an ephemeral local port.
///
/// Intended for embedding in test suites: spawn one per test, point the
/// relying party under test at `issuer()`, and seed `storage()` directly.
pub struct MockServer {
    addr: SocketAddr,
    state: AppState,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind an ephemeral localhost port and start serving.
    ///
    /// # Errors
    /// Fails when the listener cannot be bound or key generation fails.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind localhost listener")?;
        let addr = listener.local_addr().context("failed to read bound address")?;
        let issuer = config
            .issuer
            .clone()
            .unwrap_or_else(|| format!("http://{addr}"));

        let (app, state) = build_app(config, issuer)?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "server task exited");
            }
        });

        info!(%addr, "mock provider listening");
        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Issuer URL the instance reports in ID tokens and discovery.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.state.issuer
    }

    /// Direct handle on the instance's storage, for seeding users and
    /// inspecting issued credentials.
    #[must_use]
    pub fn storage(&self) -> &Arc<Storage> {
        &self.state.storage
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Run the provider on a fixed address until interrupted. Used by the
/// command line binary.
///
/// # Errors
/// Fails when the listener cannot be bound or key generation fails.
pub async fn serve(addr: SocketAddr, config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    let addr = listener.local_addr().context("failed to read bound address")?;
    let issuer = config
        .issuer
        .clone()
        .unwrap_or_else(|| format!("http://{addr}"));

    let (app, _state) = build_app(config, issuer.clone())?;

    info!(%addr, %issuer, "mock provider listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown handler");
    }
}
