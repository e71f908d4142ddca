//! # Server Module
//!
//! HTTP server setup and route configuration for the DEX gateway.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::{Config, ServerConfig};
use crate::okx::{Credentials, HttpTransport, OkxClient, RequestQueue, RetryPolicy, Signer};
use crate::routes::{bridge, health::ping, market_data, portfolio, swap, tokens};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub okx: OkxClient,
}

impl AppState {
    /// Build the process-wide queue and the signed client on top of it.
    pub fn from_config(config: &Config) -> Result<Self> {
        let signer = Signer::new(Credentials {
            api_key: config.okx.api_key.clone(),
            secret_key: config.okx.secret_key.clone(),
            passphrase: config.okx.passphrase.clone(),
        });
        let transport = HttpTransport::new(
            config.okx.base_url.clone(),
            signer,
            config.request.timeout_ms.map(Duration::from_millis),
        )
        .context("Failed to create HTTP client")?;

        let queue = RequestQueue::new(RetryPolicy::from_config(&config.request));
        let okx = OkxClient::new(queue, Arc::new(transport), config.okx.project_id.clone());

        Ok(Self { okx })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
}

/// Assemble the router with all endpoints and middleware.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/token-catalog", get(tokens::token_catalog))
        .route("/api/bridge-tokens", get(tokens::bridge_tokens))
        .route("/api/bridge-info", get(bridge::bridge_info))
        .route("/api/bridge-pairs", get(bridge::bridge_pairs))
        .route("/api/swap", post(swap::swap))
        .route("/api/bridge-swap", post(bridge::bridge_swap))
        .route("/api/market-data", post(market_data::market_data))
        .route("/api/portfolio/token-balances", post(portfolio::token_balances))
        .route("/api/portfolio/token-balance", post(portfolio::token_balance))
        .route("/api/portfolio/token-value", post(portfolio::token_value))
        .route("/api/portfolio/history", post(portfolio::history))
        .route("/api/portfolio/transaction-detail", post(portfolio::transaction_detail))
        .layer(ServiceBuilder::new().layer(cors_layer(&config.cors_origins)))
        .with_state(state)
}

/// Starts the DEX gateway HTTP server.
///
/// Builds the single upstream request queue, binds the listener and serves
/// until the process is terminated.
pub async fn start(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let policy = state.okx.queue().policy();
    let app = router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} - port may already be in use", addr))?;

    tracing::info!("🚀 DEX gateway starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("🔗 Upstream: {}", config.okx.base_url);
    tracing::info!(
        "🔁 Retry policy: {} retries, {:?} initial delay, {:?} cap",
        policy.max_retries,
        policy.initial_delay,
        policy.max_delay()
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
