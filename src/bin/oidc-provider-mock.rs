// ABOUTME: Command line entry point for the mock identity provider
// ABOUTME: Parses flags, initializes logging, and runs the server
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::net::SocketAddr;

use anyhow::Result;
use chrono::Duration;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oidc_provider_mock::config::ServerConfig;
use oidc_provider_mock::server::serve;

#[derive(Debug, Parser)]
#[command(name = "oidc-provider-mock")]
#[command(about = "Mock OpenID Connect provider for testing relying parties")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:9400")]
    listen: SocketAddr,

    /// Issuer URL advertised in discovery and ID tokens.
    /// Defaults to http://<listen address>.
    #[arg(long)]
    issuer: Option<String>,

    /// Reject client IDs that were not registered beforehand
    #[arg(long)]
    require_client_registration: bool,

    /// Reject authorization requests without a fresh nonce
    #[arg(long)]
    require_nonce: bool,

    /// Do not include refresh tokens in token responses
    #[arg(long)]
    no_refresh_token: bool,

    /// Access token lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    access_token_max_age: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        issuer: args.issuer,
        require_client_registration: args.require_client_registration,
        require_nonce: args.require_nonce,
        issue_refresh_token: !args.no_refresh_token,
        access_token_max_age: Duration::seconds(args.access_token_max_age),
    };

    serve(args.listen, config).await
}
