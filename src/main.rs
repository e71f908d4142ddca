//! # DEX Gateway
//!
//! Backend for the Solana portfolio dashboard: thin HTTP routes over the
//! OKX Web3 DEX API, built with Rust, Axum, and Tokio.
//!
//! ## Features
//! - Signed OKX API access (HMAC-SHA256 request signatures)
//! - Single-flight upstream request queue with exponential back-off
//! - Token catalog, swap quote/execute, bridge tokens, portfolio endpoints
//! - Structured logging with tracing
//!
//! ## Architecture
//! - `server`: router, shared state, startup
//! - `config`: environment variable configuration
//! - `okx`: signer, transport, request queue, client facade
//! - `routes`: HTTP handlers organized by functionality
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and set the OKX credentials:
//! ```bash
//! OKX_DEX_API_KEY=... OKX_DEX_SECRET_KEY=... OKX_DEX_PASSPHRASE=...
//! ```
//!
//! ## Running the Server
//! ```bash
//! cargo run
//! curl http://localhost:3000/ping
//! ```

mod config;
mod okx;
mod routes;
mod server;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Application entry point.
///
/// Loads `.env`, initializes tracing (filter from `RUST_LOG`, default
/// `info`), reads the configuration and runs the server until terminated.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; variables may come from the environment
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting DEX gateway...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("🏗️  Build profile: {}", if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });

    let config = Config::from_env()?;
    tracing::debug!("Configuration: {:?}", config);
    tracing::info!(
        "⏱️  Caller-side min delay {}ms (not applied by the queue)",
        config.request.min_delay_ms
    );

    server::start(config).await
}
